use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use refuge_types::api::{CreateLocationRequest, UpdateLocationRequest};
use refuge_types::models::{ContactInfo, Location, Service};

use super::OptionalExt;
use crate::Database;
use crate::models::{RowExt, now_ts};

const LOCATION_COLUMNS: &str =
    "l.id, l.name, l.location_type, l.address, l.lat, l.lng, l.description, l.is_active, l.created_by, l.created_at, l.updated_at, c.location_id, c.phone, c.email, c.website";

#[derive(Debug, Default, Clone)]
pub struct LocationFilter {
    pub location_type: Option<String>,
    pub include_inactive: bool,
}

impl Database {
    // -- Resource directory --

    pub fn create_location(
        &self,
        created_by: Uuid,
        req: &CreateLocationRequest,
    ) -> Result<Location> {
        let id = Uuid::new_v4();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO locations (id, name, location_type, address, lat, lng, description, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id.to_string(),
                    req.name,
                    req.location_type,
                    req.address,
                    req.lat,
                    req.lng,
                    req.description,
                    created_by.to_string(),
                    now,
                ],
            )?;
            if let Some(contact) = &req.contact {
                write_contact(&tx, id, contact)?;
            }
            write_services(&tx, id, &req.services)?;

            let location = query_location(&tx, id)?
                .ok_or_else(|| anyhow!("Location vanished after insert: {}", id))?;
            tx.commit()?;
            Ok(location)
        })
    }

    pub fn get_location(&self, id: Uuid) -> Result<Option<Location>> {
        self.with_conn(|conn| query_location(conn, id))
    }

    /// Active entries by default, ordered by name.
    pub fn list_locations(&self, filter: &LocationFilter) -> Result<Vec<Location>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM locations l
                 LEFT JOIN location_contacts c ON c.location_id = l.id
                 WHERE (?1 IS NULL OR l.location_type = ?1)
                   AND (?2 OR l.is_active = 1)
                 ORDER BY l.name COLLATE NOCASE",
                LOCATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(
                    params![filter.location_type.as_deref(), filter.include_inactive],
                    map_location,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for location in &mut rows {
                location.services = query_services(conn, location.id)?;
            }
            Ok(rows)
        })
    }

    /// Applies the fields present in `req`. A provided service list replaces
    /// the existing one.
    pub fn update_location(
        &self,
        id: Uuid,
        req: &UpdateLocationRequest,
    ) -> Result<Option<Location>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut l) = query_location(&tx, id)? else {
                return Ok(None);
            };

            if let Some(name) = &req.name {
                l.name = name.clone();
            }
            if let Some(location_type) = &req.location_type {
                l.location_type = location_type.clone();
            }
            if let Some(address) = &req.address {
                l.address = address.clone();
            }
            if let Some(lat) = req.lat {
                l.lat = lat;
            }
            if let Some(lng) = req.lng {
                l.lng = lng;
            }
            if req.description.is_some() {
                l.description = req.description.clone();
            }
            if let Some(is_active) = req.is_active {
                l.is_active = is_active;
            }

            tx.execute(
                "UPDATE locations SET name = ?2, location_type = ?3, address = ?4, lat = ?5, lng = ?6, description = ?7, is_active = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    l.name,
                    l.location_type,
                    l.address,
                    l.lat,
                    l.lng,
                    l.description,
                    l.is_active,
                    now_ts(),
                ],
            )?;
            if let Some(contact) = &req.contact {
                write_contact(&tx, id, contact)?;
            }
            if let Some(services) = &req.services {
                tx.execute(
                    "DELETE FROM location_services WHERE location_id = ?1",
                    [id.to_string()],
                )?;
                write_services(&tx, id, services)?;
            }

            let updated = query_location(&tx, id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    pub fn delete_location(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM locations WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }
}

fn write_contact(conn: &Connection, location_id: Uuid, contact: &ContactInfo) -> Result<()> {
    conn.execute(
        "INSERT INTO location_contacts (location_id, phone, email, website) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(location_id) DO UPDATE SET phone = excluded.phone, email = excluded.email, website = excluded.website",
        params![location_id.to_string(), contact.phone, contact.email, contact.website],
    )?;
    Ok(())
}

fn write_services(conn: &Connection, location_id: Uuid, names: &[String]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT INTO location_services (id, location_id, name) VALUES (?1, ?2, ?3)")?;
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        stmt.execute(params![Uuid::new_v4().to_string(), location_id.to_string(), name])?;
    }
    Ok(())
}

fn query_services(conn: &Connection, location_id: Uuid) -> Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name FROM location_services WHERE location_id = ?1 ORDER BY rowid",
    )?;
    let services = stmt
        .query_map([location_id.to_string()], |row| {
            Ok(Service {
                id: row.uuid(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(services)
}

fn query_location(conn: &Connection, id: Uuid) -> Result<Option<Location>> {
    let sql = format!(
        "SELECT {} FROM locations l
         LEFT JOIN location_contacts c ON c.location_id = l.id
         WHERE l.id = ?1",
        LOCATION_COLUMNS
    );
    let Some(mut location) = conn.query_row(&sql, [id.to_string()], map_location).optional()? else {
        return Ok(None);
    };
    location.services = query_services(conn, id)?;
    Ok(Some(location))
}

/// Services are filled in separately.
fn map_location(row: &Row<'_>) -> rusqlite::Result<Location> {
    let has_contact: Option<String> = row.get(11)?;
    let contact = match has_contact {
        Some(_) => Some(ContactInfo {
            phone: row.get(12)?,
            email: row.get(13)?,
            website: row.get(14)?,
        }),
        None => None,
    };

    Ok(Location {
        id: row.uuid(0)?,
        name: row.get(1)?,
        location_type: row.get(2)?,
        address: row.get(3)?,
        lat: row.get(4)?,
        lng: row.get(5)?,
        description: row.get(6)?,
        contact,
        services: Vec::new(),
        is_active: row.get(7)?,
        created_by: row.uuid(8)?,
        created_at: row.ts(9)?,
        updated_at: row.ts(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_db, user};
    use refuge_types::models::Role;

    fn clinic(name: &str) -> CreateLocationRequest {
        CreateLocationRequest {
            name: name.to_string(),
            location_type: "medical".to_string(),
            address: "1 Main St".to_string(),
            lat: 49.84,
            lng: 24.03,
            description: None,
            contact: Some(ContactInfo {
                phone: Some("+380 1".into()),
                email: None,
                website: None,
            }),
            services: vec!["vaccines".into(), " ".into(), "first aid".into()],
        }
    }

    #[test]
    fn test_create_with_contact_and_services() {
        let db = temp_db();
        let ngo = user(&db, "Nora", Role::Ngo).id;

        let l = db.create_location(ngo, &clinic("Clinic")).unwrap();
        assert!(l.is_active);
        assert_eq!(l.contact.as_ref().and_then(|c| c.phone.as_deref()), Some("+380 1"));
        let names: Vec<&str> = l.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["vaccines", "first aid"]);
    }

    #[test]
    fn test_update_replaces_services_and_hides_inactive() {
        let db = temp_db();
        let ngo = user(&db, "Nora", Role::Ngo).id;
        let l = db.create_location(ngo, &clinic("Clinic")).unwrap();
        db.create_location(ngo, &clinic("Annex")).unwrap();

        let updated = db
            .update_location(
                l.id,
                &UpdateLocationRequest {
                    services: Some(vec!["dental".into()]),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.services.len(), 1);
        assert_eq!(updated.services[0].name, "dental");
        assert!(!updated.is_active);
        assert!(updated.contact.is_some());

        let visible = db.list_locations(&LocationFilter::default()).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Annex");
        assert_eq!(visible[0].services.len(), 2);

        let everything = db
            .list_locations(&LocationFilter {
                include_inactive: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(everything.len(), 2);
    }

    #[test]
    fn test_delete_cascades_to_services() {
        let db = temp_db();
        let ngo = user(&db, "Nora", Role::Ngo).id;
        let l = db.create_location(ngo, &clinic("Clinic")).unwrap();

        assert!(db.delete_location(l.id).unwrap());
        assert!(db.get_location(l.id).unwrap().is_none());
        let orphans: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM location_services", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
