use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use refuge_types::api::{CreateNeedRequest, UpdateNeedRequest};
use refuge_types::models::{Category, Need, NeedStatus};

use super::OptionalExt;
use crate::Database;
use crate::models::{RowExt, now_ts, to_json};

const NEED_COLUMNS: &str =
    "id, title, description, category, urgent, status, location, user_id, created_at, updated_at";

#[derive(Debug, Default, Clone, Copy)]
pub struct NeedFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<NeedStatus>,
    pub category: Option<Category>,
}

impl Database {
    // -- Needs --

    pub fn create_need(&self, user_id: Uuid, req: &CreateNeedRequest) -> Result<Need> {
        let id = Uuid::new_v4();
        let now = now_ts();
        let location = to_json(req.location.as_ref())?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO needs (id, title, description, category, urgent, status, location, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'open', ?6, ?7, ?8, ?8)",
                params![
                    id.to_string(),
                    req.title,
                    req.description,
                    req.category.as_str(),
                    req.urgent,
                    location,
                    user_id.to_string(),
                    now,
                ],
            )?;
            query_need(conn, id)?.ok_or_else(|| anyhow!("Need vanished after insert: {}", id))
        })
    }

    pub fn get_need(&self, id: Uuid) -> Result<Option<Need>> {
        self.with_conn(|conn| query_need(conn, id))
    }

    /// Newest first.
    pub fn list_needs(&self, filter: &NeedFilter) -> Result<Vec<Need>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM needs
                 WHERE (?1 IS NULL OR user_id = ?1)
                   AND (?2 IS NULL OR status = ?2)
                   AND (?3 IS NULL OR category = ?3)
                 ORDER BY created_at DESC",
                NEED_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        filter.user_id.map(|id| id.to_string()),
                        filter.status.map(|s| s.as_str()),
                        filter.category.map(|c| c.as_str()),
                    ],
                    map_need,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Applies the fields present in `req` if the need is still in the
    /// `expected` status. Returns `None` for an unknown id or a status that
    /// moved on since the caller read it.
    pub fn update_need(
        &self,
        id: Uuid,
        expected: NeedStatus,
        req: &UpdateNeedRequest,
    ) -> Result<Option<Need>> {
        self.with_conn_mut(|conn| {
            let Some(mut need) = query_need(conn, id)? else {
                return Ok(None);
            };
            if need.status != expected {
                return Ok(None);
            }

            if let Some(title) = &req.title {
                need.title = title.clone();
            }
            if let Some(description) = &req.description {
                need.description = description.clone();
            }
            if let Some(category) = req.category {
                need.category = category;
            }
            if let Some(urgent) = req.urgent {
                need.urgent = urgent;
            }
            if let Some(status) = req.status {
                need.status = status;
            }
            if req.location.is_some() {
                need.location = req.location.clone();
            }

            conn.execute(
                "UPDATE needs SET title = ?2, description = ?3, category = ?4, urgent = ?5, status = ?6, location = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    need.title,
                    need.description,
                    need.category.as_str(),
                    need.urgent,
                    need.status.as_str(),
                    to_json(need.location.as_ref())?,
                    now_ts(),
                ],
            )?;
            query_need(conn, id)
        })
    }

    pub fn delete_need(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM needs WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }
}

pub(crate) fn query_need(conn: &Connection, id: Uuid) -> Result<Option<Need>> {
    let sql = format!("SELECT {} FROM needs WHERE id = ?1", NEED_COLUMNS);
    conn.query_row(&sql, [id.to_string()], map_need).optional()
}

pub(crate) fn set_need_status(conn: &Connection, id: Uuid, status: NeedStatus) -> Result<()> {
    conn.execute(
        "UPDATE needs SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), now_ts()],
    )?;
    Ok(())
}

fn map_need(row: &Row<'_>) -> rusqlite::Result<Need> {
    Ok(Need {
        id: row.uuid(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.label(3)?,
        urgent: row.get(4)?,
        status: row.label(5)?,
        location: row.json(6)?,
        user_id: row.uuid(7)?,
        created_at: row.ts(8)?,
        updated_at: row.ts(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_db, user};
    use refuge_types::models::{GeoLocation, Role};

    fn need_req(title: &str, category: Category) -> CreateNeedRequest {
        CreateNeedRequest {
            title: title.to_string(),
            description: "details".to_string(),
            category,
            urgent: false,
            location: Some(GeoLocation {
                city: Some("Lviv".into()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_need_lifecycle() {
        let db = temp_db();
        let owner = user(&db, "Amira", Role::Refugee);

        let need = db.create_need(owner.id, &need_req("Winter coat", Category::Clothing)).unwrap();
        assert_eq!(need.status, NeedStatus::Open);
        assert_eq!(need.location.as_ref().and_then(|l| l.city.as_deref()), Some("Lviv"));

        let updated = db
            .update_need(
                need.id,
                NeedStatus::Open,
                &UpdateNeedRequest {
                    urgent: Some(true),
                    status: Some(NeedStatus::Closed),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(updated.urgent);
        assert_eq!(updated.status, NeedStatus::Closed);
        assert_eq!(updated.title, "Winter coat");

        assert!(db.delete_need(need.id).unwrap());
        assert!(db.get_need(need.id).unwrap().is_none());
        let gone = db.update_need(need.id, NeedStatus::Closed, &UpdateNeedRequest::default());
        assert!(gone.unwrap().is_none());
    }

    #[test]
    fn test_update_need_requires_expected_status() {
        let db = temp_db();
        let owner = user(&db, "Amira", Role::Refugee);
        let need = db.create_need(owner.id, &need_req("Blanket", Category::Shelter)).unwrap();

        let req = UpdateNeedRequest {
            title: Some("Two blankets".into()),
            ..Default::default()
        };
        assert!(db.update_need(need.id, NeedStatus::Matched, &req).unwrap().is_none());
        assert_eq!(db.get_need(need.id).unwrap().unwrap().title, "Blanket");

        let updated = db.update_need(need.id, NeedStatus::Open, &req).unwrap().unwrap();
        assert_eq!(updated.title, "Two blankets");
    }

    #[test]
    fn test_list_needs_newest_first_with_filters() {
        let db = temp_db();
        let owner = user(&db, "Amira", Role::Refugee);
        let other = user(&db, "Bilal", Role::Refugee);

        let first = db.create_need(owner.id, &need_req("Bread", Category::Food)).unwrap();
        let second = db.create_need(owner.id, &need_req("Room", Category::Shelter)).unwrap();
        db.create_need(other.id, &need_req("Rice", Category::Food)).unwrap();

        let mine = db
            .list_needs(&NeedFilter {
                user_id: Some(owner.id),
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<Uuid> = mine.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let food = db
            .list_needs(&NeedFilter {
                category: Some(Category::Food),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(food.len(), 2);
    }

    #[test]
    fn test_deleting_owner_cascades_to_needs() {
        let db = temp_db();
        let owner = user(&db, "Amira", Role::Refugee);
        let need = db.create_need(owner.id, &need_req("Bread", Category::Food)).unwrap();

        assert!(db.delete_user(owner.id).unwrap());
        assert!(db.get_need(need.id).unwrap().is_none());
    }
}
