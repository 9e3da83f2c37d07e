use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use refuge_types::models::{Match, MatchStatus, NeedStatus};

use super::OptionalExt;
use super::needs::set_need_status;
use super::offers::increment_helped_count;
use crate::Database;
use crate::models::{RowExt, now_ts};

const MATCH_COLUMNS: &str =
    "id, need_id, offer_id, initiated_by, responded_by, message, status, created_at, updated_at";

/// Owners of the need and offer a match references.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchOwners {
    pub need_owner: Option<Uuid>,
    pub offer_owner: Option<Uuid>,
}

impl Database {
    // -- Matches --

    pub fn create_match(
        &self,
        initiated_by: Uuid,
        need_id: Option<Uuid>,
        offer_id: Option<Uuid>,
        message: Option<&str>,
    ) -> Result<Match> {
        let id = Uuid::new_v4();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO matches (id, need_id, offer_id, initiated_by, message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
                params![
                    id.to_string(),
                    need_id.map(|n| n.to_string()),
                    offer_id.map(|o| o.to_string()),
                    initiated_by.to_string(),
                    message,
                    now,
                ],
            )?;
            query_match(conn, id)?.ok_or_else(|| anyhow!("Match vanished after insert: {}", id))
        })
    }

    pub fn get_match(&self, id: Uuid) -> Result<Option<Match>> {
        self.with_conn(|conn| query_match(conn, id))
    }

    /// Matches the user started, answered, or that reference their needs
    /// or offers. Newest first.
    pub fn list_matches_for_user(&self, user_id: Uuid) -> Result<Vec<Match>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM matches
                 WHERE initiated_by = ?1
                    OR responded_by = ?1
                    OR need_id IN (SELECT id FROM needs WHERE user_id = ?1)
                    OR offer_id IN (SELECT id FROM offers WHERE user_id = ?1)
                 ORDER BY created_at DESC",
                MATCH_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], map_match)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn match_owners(&self, m: &Match) -> Result<MatchOwners> {
        self.with_conn(|conn| {
            let owner_of = |table: &str, id: Option<Uuid>| -> Result<Option<Uuid>> {
                let Some(id) = id else { return Ok(None) };
                let sql = format!("SELECT user_id FROM {} WHERE id = ?1", table);
                let raw: Option<String> = conn
                    .query_row(&sql, [id.to_string()], |row| row.get(0))
                    .optional()?;
                raw.map(|s| s.parse::<Uuid>().map_err(anyhow::Error::from))
                    .transpose()
            };

            Ok(MatchOwners {
                need_owner: owner_of("needs", m.need_id)?,
                offer_owner: owner_of("offers", m.offer_id)?,
            })
        })
    }

    /// Moves a match from `from` to `to` and applies the side effects on the
    /// referenced need/offer, all in one transaction.
    ///
    /// Returns `None` when the match is no longer in `from` (someone else
    /// answered first). Transition rules are checked by the caller.
    pub fn transition_match(
        &self,
        id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        actor: Uuid,
        message: Option<&str>,
    ) -> Result<Option<Match>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let responder = matches!(to, MatchStatus::Accepted | MatchStatus::Rejected)
                .then(|| actor.to_string());

            let changed = tx.execute(
                "UPDATE matches
                 SET status = ?3,
                     responded_by = COALESCE(?4, responded_by),
                     message = COALESCE(?5, message),
                     updated_at = ?6
                 WHERE id = ?1 AND status = ?2",
                params![
                    id.to_string(),
                    from.as_str(),
                    to.as_str(),
                    responder,
                    message,
                    now_ts(),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let updated =
                query_match(&tx, id)?.ok_or_else(|| anyhow!("Match vanished mid-update: {}", id))?;

            match to {
                MatchStatus::Accepted => {
                    if let Some(need_id) = updated.need_id {
                        set_need_status(&tx, need_id, NeedStatus::Matched)?;
                    }
                }
                MatchStatus::Completed => {
                    if let Some(need_id) = updated.need_id {
                        set_need_status(&tx, need_id, NeedStatus::Fulfilled)?;
                    }
                    if let Some(offer_id) = updated.offer_id {
                        increment_helped_count(&tx, offer_id)?;
                    }
                }
                _ => {}
            }

            tx.commit()?;
            Ok(Some(updated))
        })
    }
}

fn query_match(conn: &Connection, id: Uuid) -> Result<Option<Match>> {
    let sql = format!("SELECT {} FROM matches WHERE id = ?1", MATCH_COLUMNS);
    conn.query_row(&sql, [id.to_string()], map_match).optional()
}

fn map_match(row: &Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.uuid(0)?,
        need_id: row.opt_uuid(1)?,
        offer_id: row.opt_uuid(2)?,
        initiated_by: row.uuid(3)?,
        responded_by: row.opt_uuid(4)?,
        message: row.get(5)?,
        status: row.label(6)?,
        created_at: row.ts(7)?,
        updated_at: row.ts(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_db, user};
    use refuge_types::api::{CreateNeedRequest, CreateOfferRequest};
    use refuge_types::models::{Category, Role};

    struct Fixture {
        db: crate::test_support::TempDb,
        refugee: Uuid,
        volunteer: Uuid,
        need_id: Uuid,
        offer_id: Uuid,
    }

    fn fixture() -> Fixture {
        let db = temp_db();
        let refugee = user(&db, "Amira", Role::Refugee).id;
        let volunteer = user(&db, "Vera", Role::Volunteer).id;
        let need_id = db
            .create_need(
                refugee,
                &CreateNeedRequest {
                    title: "Room".into(),
                    description: "for two".into(),
                    category: Category::Shelter,
                    urgent: true,
                    location: None,
                },
            )
            .unwrap()
            .id;
        let offer_id = db
            .create_offer(
                volunteer,
                &CreateOfferRequest {
                    title: "Spare room".into(),
                    description: "near station".into(),
                    category: Category::Housing,
                    location: None,
                    contact: None,
                    availability: None,
                },
            )
            .unwrap()
            .id;
        Fixture {
            db,
            refugee,
            volunteer,
            need_id,
            offer_id,
        }
    }

    #[test]
    fn test_accept_then_complete_updates_need_and_offer() {
        let f = fixture();
        let m = f
            .db
            .create_match(f.refugee, Some(f.need_id), Some(f.offer_id), Some("hello"))
            .unwrap();
        assert_eq!(m.status, MatchStatus::Pending);

        let owners = f.db.match_owners(&m).unwrap();
        assert_eq!(owners.need_owner, Some(f.refugee));
        assert_eq!(owners.offer_owner, Some(f.volunteer));

        let accepted = f
            .db
            .transition_match(m.id, MatchStatus::Pending, MatchStatus::Accepted, f.volunteer, None)
            .unwrap()
            .unwrap();
        assert_eq!(accepted.responded_by, Some(f.volunteer));
        assert_eq!(accepted.message.as_deref(), Some("hello"));
        assert_eq!(
            f.db.get_need(f.need_id).unwrap().unwrap().status,
            NeedStatus::Matched
        );

        f.db.transition_match(
            m.id,
            MatchStatus::Accepted,
            MatchStatus::Completed,
            f.refugee,
            Some("thank you"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            f.db.get_need(f.need_id).unwrap().unwrap().status,
            NeedStatus::Fulfilled
        );
        assert_eq!(f.db.get_offer(f.offer_id).unwrap().unwrap().helped_count, 1);
    }

    #[test]
    fn test_stale_transition_is_refused() {
        let f = fixture();
        let m = f.db.create_match(f.volunteer, Some(f.need_id), None, None).unwrap();
        assert!(m.is_direct_request());

        f.db.transition_match(m.id, MatchStatus::Pending, MatchStatus::Rejected, f.refugee, None)
            .unwrap()
            .unwrap();
        let second = f
            .db
            .transition_match(m.id, MatchStatus::Pending, MatchStatus::Accepted, f.refugee, None)
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_listing_includes_owned_sides() {
        let f = fixture();
        let m = f.db.create_match(f.refugee, None, Some(f.offer_id), None).unwrap();

        let for_volunteer = f.db.list_matches_for_user(f.volunteer).unwrap();
        assert_eq!(for_volunteer.len(), 1);
        assert_eq!(for_volunteer[0].id, m.id);
    }

    #[test]
    fn test_initiator_cannot_be_deleted_while_match_exists() {
        let f = fixture();
        f.db.create_match(f.volunteer, Some(f.need_id), None, None).unwrap();
        assert!(f.db.delete_user(f.volunteer).is_err());
    }
}
