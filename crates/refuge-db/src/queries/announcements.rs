use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use refuge_types::api::{CreateAnnouncementRequest, SubscribeRequest, UpdateAnnouncementRequest};
use refuge_types::models::{Announcement, AnnouncementSubscription};

use super::OptionalExt;
use crate::Database;
use crate::models::{RowExt, format_ts, now_ts, to_json};

const ANNOUNCEMENT_COLUMNS: &str =
    "id, title, content, category, region, important, event_date, posted_by_id, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct AnnouncementFilter {
    pub category: Option<String>,
    pub region: Option<String>,
}

impl Database {
    // -- Announcements --

    pub fn create_announcement(
        &self,
        posted_by: Uuid,
        req: &CreateAnnouncementRequest,
    ) -> Result<Announcement> {
        let id = Uuid::new_v4();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO announcements (id, title, content, category, region, important, event_date, posted_by_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id.to_string(),
                    req.title,
                    req.content,
                    req.category,
                    req.region,
                    req.important,
                    req.event_date.map(format_ts),
                    posted_by.to_string(),
                    now,
                ],
            )?;
            query_announcement(conn, id)?
                .ok_or_else(|| anyhow!("Announcement vanished after insert: {}", id))
        })
    }

    pub fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>> {
        self.with_conn(|conn| query_announcement(conn, id))
    }

    /// Important ones first, then newest first.
    pub fn list_announcements(&self, filter: &AnnouncementFilter) -> Result<Vec<Announcement>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM announcements
                 WHERE (?1 IS NULL OR category = ?1)
                   AND (?2 IS NULL OR region = ?2)
                 ORDER BY important DESC, created_at DESC",
                ANNOUNCEMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![filter.category.as_deref(), filter.region.as_deref()],
                    map_announcement,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_announcement(
        &self,
        id: Uuid,
        req: &UpdateAnnouncementRequest,
    ) -> Result<Option<Announcement>> {
        self.with_conn_mut(|conn| {
            let Some(mut a) = query_announcement(conn, id)? else {
                return Ok(None);
            };

            if let Some(title) = &req.title {
                a.title = title.clone();
            }
            if let Some(content) = &req.content {
                a.content = content.clone();
            }
            if let Some(category) = &req.category {
                a.category = category.clone();
            }
            if let Some(region) = &req.region {
                a.region = region.clone();
            }
            if let Some(important) = req.important {
                a.important = important;
            }
            if req.event_date.is_some() {
                a.event_date = req.event_date;
            }

            conn.execute(
                "UPDATE announcements SET title = ?2, content = ?3, category = ?4, region = ?5, important = ?6, event_date = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    a.title,
                    a.content,
                    a.category,
                    a.region,
                    a.important,
                    a.event_date.map(format_ts),
                    now_ts(),
                ],
            )?;
            query_announcement(conn, id)
        })
    }

    pub fn delete_announcement(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM announcements WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    // -- Subscriptions --

    /// Creates or replaces the subscription for `req.email`.
    pub fn subscribe(&self, req: &SubscribeRequest) -> Result<AnnouncementSubscription> {
        let email = req.email.trim().to_lowercase();
        let categories = to_json(req.categories.as_ref())?;
        let regions = to_json(req.regions.as_ref())?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO announcement_subscriptions (id, email, categories, regions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO UPDATE SET categories = excluded.categories, regions = excluded.regions",
                params![Uuid::new_v4().to_string(), email, categories, regions, now_ts()],
            )?;
            conn.query_row(
                "SELECT id, email, categories, regions, created_at FROM announcement_subscriptions WHERE email = ?1",
                [&email],
                map_subscription,
            )
            .map_err(anyhow::Error::from)
        })
    }

    pub fn unsubscribe(&self, email: &str) -> Result<bool> {
        let email = email.trim().to_lowercase();
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM announcement_subscriptions WHERE email = ?1",
                [email],
            )?;
            Ok(n > 0)
        })
    }

    /// Subscriptions whose category and region lists admit the announcement.
    /// An absent or empty list admits everything.
    pub fn subscriptions_matching(
        &self,
        a: &Announcement,
    ) -> Result<Vec<AnnouncementSubscription>> {
        let all = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, categories, regions, created_at FROM announcement_subscriptions ORDER BY email",
            )?;
            let rows = stmt
                .query_map([], map_subscription)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let admits = |list: &Option<Vec<String>>, value: &str| match list {
            Some(values) if !values.is_empty() => {
                values.iter().any(|v| v.eq_ignore_ascii_case(value))
            }
            _ => true,
        };

        Ok(all
            .into_iter()
            .filter(|s| admits(&s.categories, &a.category) && admits(&s.regions, &a.region))
            .collect())
    }
}

fn query_announcement(conn: &Connection, id: Uuid) -> Result<Option<Announcement>> {
    let sql = format!("SELECT {} FROM announcements WHERE id = ?1", ANNOUNCEMENT_COLUMNS);
    conn.query_row(&sql, [id.to_string()], map_announcement).optional()
}

fn map_announcement(row: &Row<'_>) -> rusqlite::Result<Announcement> {
    Ok(Announcement {
        id: row.uuid(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        region: row.get(4)?,
        important: row.get(5)?,
        event_date: row.opt_ts(6)?,
        posted_by_id: row.uuid(7)?,
        created_at: row.ts(8)?,
        updated_at: row.ts(9)?,
    })
}

fn map_subscription(row: &Row<'_>) -> rusqlite::Result<AnnouncementSubscription> {
    Ok(AnnouncementSubscription {
        id: row.uuid(0)?,
        email: row.get(1)?,
        categories: row.json(2)?,
        regions: row.json(3)?,
        created_at: row.ts(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_db, user};
    use refuge_types::models::Role;

    fn announcement(title: &str, region: &str, important: bool) -> CreateAnnouncementRequest {
        CreateAnnouncementRequest {
            title: title.to_string(),
            content: "content".to_string(),
            category: "health".to_string(),
            region: region.to_string(),
            important,
            event_date: None,
        }
    }

    #[test]
    fn test_important_announcements_come_first() {
        let db = temp_db();
        let ngo = user(&db, "Nora", Role::Ngo).id;

        let urgent = db.create_announcement(ngo, &announcement("Clinic", "lviv", true)).unwrap();
        let newer = db.create_announcement(ngo, &announcement("Market", "kyiv", false)).unwrap();

        let all = db.list_announcements(&AnnouncementFilter::default()).unwrap();
        let ids: Vec<Uuid> = all.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![urgent.id, newer.id]);

        let kyiv = db
            .list_announcements(&AnnouncementFilter {
                region: Some("kyiv".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(kyiv.len(), 1);
        assert_eq!(kyiv[0].id, newer.id);
    }

    #[test]
    fn test_update_and_delete() {
        let db = temp_db();
        let ngo = user(&db, "Nora", Role::Ngo).id;
        let a = db.create_announcement(ngo, &announcement("Clinic", "lviv", false)).unwrap();

        let updated = db
            .update_announcement(
                a.id,
                &UpdateAnnouncementRequest {
                    important: Some(true),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(updated.important);
        assert_eq!(updated.title, "Clinic");

        assert!(db.delete_announcement(a.id).unwrap());
        assert!(!db.delete_announcement(a.id).unwrap());
    }

    #[test]
    fn test_subscribe_is_an_upsert() {
        let db = temp_db();
        let first = db
            .subscribe(&SubscribeRequest {
                email: "Reader@Example.org".into(),
                categories: Some(vec!["health".into()]),
                regions: None,
            })
            .unwrap();
        let second = db
            .subscribe(&SubscribeRequest {
                email: "reader@example.org".into(),
                categories: None,
                regions: Some(vec!["kyiv".into()]),
            })
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "reader@example.org");
        assert!(second.categories.is_none());

        assert!(db.unsubscribe("READER@example.org").unwrap());
        assert!(!db.unsubscribe("reader@example.org").unwrap());
    }

    #[test]
    fn test_subscriptions_matching_filters_by_lists() {
        let db = temp_db();
        let ngo = user(&db, "Nora", Role::Ngo).id;

        for (email, regions) in [
            ("everything@example.org", None),
            ("lviv@example.org", Some(vec!["Lviv".to_string()])),
            ("kyiv@example.org", Some(vec!["kyiv".to_string()])),
        ] {
            db.subscribe(&SubscribeRequest {
                email: email.into(),
                categories: None,
                regions,
            })
            .unwrap();
        }

        let a = db.create_announcement(ngo, &announcement("Clinic", "lviv", false)).unwrap();
        let emails: Vec<String> = db
            .subscriptions_matching(&a)
            .unwrap()
            .into_iter()
            .map(|s| s.email)
            .collect();
        assert_eq!(emails, vec!["everything@example.org", "lviv@example.org"]);
    }

    #[test]
    fn test_poster_cannot_be_deleted() {
        let db = temp_db();
        let ngo = user(&db, "Nora", Role::Ngo).id;
        db.create_announcement(ngo, &announcement("Clinic", "lviv", false)).unwrap();
        assert!(db.delete_user(ngo).is_err());
    }
}
