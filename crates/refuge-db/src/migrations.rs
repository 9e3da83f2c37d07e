use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                organization_name   TEXT,
                email               TEXT NOT NULL UNIQUE,
                password            TEXT NOT NULL,
                role                TEXT NOT NULL DEFAULT 'user'
                    CHECK (role IN ('user', 'admin', 'ngo', 'volunteer', 'refugee')),
                language            TEXT NOT NULL DEFAULT 'en',
                verified            INTEGER NOT NULL DEFAULT 0,
                avatar              TEXT,
                contact             TEXT,
                location            TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE needs (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                category    TEXT NOT NULL
                    CHECK (category IN ('food', 'shelter', 'housing', 'medical', 'clothing',
                        'education', 'transportation', 'legal', 'employment', 'translation', 'other')),
                urgent      INTEGER NOT NULL DEFAULT 0,
                status      TEXT NOT NULL DEFAULT 'open'
                    CHECK (status IN ('open', 'matched', 'fulfilled', 'closed')),
                location    TEXT,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_needs_user ON needs(user_id);
            CREATE INDEX idx_needs_status ON needs(status, created_at);

            CREATE TABLE offers (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                category        TEXT NOT NULL
                    CHECK (category IN ('food', 'shelter', 'housing', 'medical', 'clothing',
                        'education', 'transportation', 'legal', 'employment', 'translation', 'other')),
                status          TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'inactive', 'fulfilled')),
                location        TEXT,
                contact         TEXT,
                availability    TEXT,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                helped_count    INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_offers_user ON offers(user_id);
            CREATE INDEX idx_offers_status ON offers(status, created_at);

            -- Actor references restrict deletion to keep attribution history.
            CREATE TABLE matches (
                id              TEXT PRIMARY KEY,
                need_id         TEXT REFERENCES needs(id) ON DELETE CASCADE,
                offer_id        TEXT REFERENCES offers(id) ON DELETE CASCADE,
                initiated_by    TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                responded_by    TEXT REFERENCES users(id) ON DELETE RESTRICT,
                message         TEXT,
                status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'accepted', 'rejected', 'completed', 'cancelled')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                CHECK (need_id IS NOT NULL OR offer_id IS NOT NULL)
            );

            CREATE INDEX idx_matches_need ON matches(need_id);
            CREATE INDEX idx_matches_offer ON matches(offer_id);
            CREATE INDEX idx_matches_initiator ON matches(initiated_by);

            CREATE TABLE conversations (
                id              TEXT PRIMARY KEY,
                last_message    TEXT,
                last_message_at TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE conversation_participants (
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_participants_user ON conversation_participants(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                content         TEXT NOT NULL,
                sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                is_read         INTEGER NOT NULL DEFAULT 0,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation ON messages(conversation_id, created_at);

            CREATE TABLE notifications (
                id                  TEXT PRIMARY KEY,
                title               TEXT NOT NULL,
                description         TEXT NOT NULL,
                notification_type   TEXT NOT NULL
                    CHECK (notification_type IN ('match', 'message', 'offer', 'need', 'announcement', 'system')),
                recipient_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                entity_id           TEXT,
                is_read             INTEGER NOT NULL DEFAULT 0,
                action_taken        INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, created_at);

            CREATE TABLE announcements (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                content         TEXT NOT NULL,
                category        TEXT NOT NULL,
                region          TEXT NOT NULL,
                important       INTEGER NOT NULL DEFAULT 0,
                event_date      TEXT,
                posted_by_id    TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE announcement_subscriptions (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                categories  TEXT,
                regions     TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE locations (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                location_type   TEXT NOT NULL,
                address         TEXT NOT NULL,
                lat             REAL NOT NULL,
                lng             REAL NOT NULL,
                description     TEXT,
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_by      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE location_contacts (
                location_id TEXT PRIMARY KEY REFERENCES locations(id) ON DELETE CASCADE,
                phone       TEXT,
                email       TEXT,
                website     TEXT
            );

            CREATE TABLE location_services (
                id          TEXT PRIMARY KEY,
                location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
                name        TEXT NOT NULL
            );

            CREATE INDEX idx_location_services ON location_services(location_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_enum_columns_are_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let err = conn.execute(
            "INSERT INTO users (id, name, email, password, role, created_at, updated_at)
             VALUES ('u1', 'n', 'e', 'p', 'wizard', 'now', 'now')",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_match_requires_one_side() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        run(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (id, name, email, password, created_at, updated_at)
             VALUES ('u1', 'n', 'e', 'p', 'now', 'now')",
            [],
        )
        .unwrap();

        let err = conn.execute(
            "INSERT INTO matches (id, initiated_by, created_at, updated_at)
             VALUES ('m1', 'u1', 'now', 'now')",
            [],
        );
        assert!(err.is_err());
    }
}
