use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use refuge_types::api::{CreateOfferRequest, UpdateOfferRequest};
use refuge_types::models::{Category, Offer, OfferStatus};

use super::OptionalExt;
use crate::Database;
use crate::models::{RowExt, now_ts, to_json};

const OFFER_COLUMNS: &str =
    "id, title, description, category, status, location, contact, availability, user_id, helped_count, created_at, updated_at";

#[derive(Debug, Default, Clone, Copy)]
pub struct OfferFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OfferStatus>,
    pub category: Option<Category>,
}

impl Database {
    // -- Offers --

    pub fn create_offer(&self, user_id: Uuid, req: &CreateOfferRequest) -> Result<Offer> {
        let id = Uuid::new_v4();
        let now = now_ts();
        let location = to_json(req.location.as_ref())?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO offers (id, title, description, category, status, location, contact, availability, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id.to_string(),
                    req.title,
                    req.description,
                    req.category.as_str(),
                    location,
                    req.contact,
                    req.availability,
                    user_id.to_string(),
                    now,
                ],
            )?;
            query_offer(conn, id)?.ok_or_else(|| anyhow!("Offer vanished after insert: {}", id))
        })
    }

    pub fn get_offer(&self, id: Uuid) -> Result<Option<Offer>> {
        self.with_conn(|conn| query_offer(conn, id))
    }

    /// Newest first.
    pub fn list_offers(&self, filter: &OfferFilter) -> Result<Vec<Offer>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM offers
                 WHERE (?1 IS NULL OR user_id = ?1)
                   AND (?2 IS NULL OR status = ?2)
                   AND (?3 IS NULL OR category = ?3)
                 ORDER BY created_at DESC",
                OFFER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        filter.user_id.map(|id| id.to_string()),
                        filter.status.map(|s| s.as_str()),
                        filter.category.map(|c| c.as_str()),
                    ],
                    map_offer,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Applies the fields present in `req` if the offer is still in the
    /// `expected` status.
    pub fn update_offer(
        &self,
        id: Uuid,
        expected: OfferStatus,
        req: &UpdateOfferRequest,
    ) -> Result<Option<Offer>> {
        self.with_conn_mut(|conn| {
            let Some(mut offer) = query_offer(conn, id)? else {
                return Ok(None);
            };
            if offer.status != expected {
                return Ok(None);
            }

            if let Some(title) = &req.title {
                offer.title = title.clone();
            }
            if let Some(description) = &req.description {
                offer.description = description.clone();
            }
            if let Some(category) = req.category {
                offer.category = category;
            }
            if let Some(status) = req.status {
                offer.status = status;
            }
            if req.location.is_some() {
                offer.location = req.location.clone();
            }
            if req.contact.is_some() {
                offer.contact = req.contact.clone();
            }
            if req.availability.is_some() {
                offer.availability = req.availability.clone();
            }

            conn.execute(
                "UPDATE offers SET title = ?2, description = ?3, category = ?4, status = ?5, location = ?6, contact = ?7, availability = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    offer.title,
                    offer.description,
                    offer.category.as_str(),
                    offer.status.as_str(),
                    to_json(offer.location.as_ref())?,
                    offer.contact,
                    offer.availability,
                    now_ts(),
                ],
            )?;
            query_offer(conn, id)
        })
    }

    pub fn delete_offer(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM offers WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }
}

pub(crate) fn query_offer(conn: &Connection, id: Uuid) -> Result<Option<Offer>> {
    let sql = format!("SELECT {} FROM offers WHERE id = ?1", OFFER_COLUMNS);
    conn.query_row(&sql, [id.to_string()], map_offer).optional()
}

pub(crate) fn increment_helped_count(conn: &Connection, id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE offers SET helped_count = helped_count + 1, updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), now_ts()],
    )?;
    Ok(())
}

fn map_offer(row: &Row<'_>) -> rusqlite::Result<Offer> {
    Ok(Offer {
        id: row.uuid(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.label(3)?,
        status: row.label(4)?,
        location: row.json(5)?,
        contact: row.get(6)?,
        availability: row.get(7)?,
        user_id: row.uuid(8)?,
        helped_count: row.get(9)?,
        created_at: row.ts(10)?,
        updated_at: row.ts(11)?,
    })
}
