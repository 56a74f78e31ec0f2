use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::{parse_db_time, to_db_time, Database};
use crate::error::{Result, StoreError};
use crate::models::OwnerTracker;

const SELECT_COLUMNS: &str =
    "SELECT id, owner_id, advertisement_key, encrypted_private_data, created_at FROM owner_trackers";

impl Database {
    /// Link an owner to an existing tracker.
    pub fn create_owner_tracker(
        &self,
        owner_id: Uuid,
        advertisement_key: &str,
        encrypted_private_data: &str,
    ) -> Result<OwnerTracker> {
        if self.find_tracker(advertisement_key)?.is_none() {
            return Err(StoreError::NotFound);
        }
        let link = new_link(owner_id, advertisement_key, encrypted_private_data);
        insert_link(self.conn(), &link)?;
        Ok(link)
    }

    /// Create the tracker if it is unknown and link it to `owner_id`, in one
    /// transaction. A second registration by the same owner is rejected with
    /// [`StoreError::AlreadyExists`]; other owners may share the tracker.
    pub fn register_tracker(
        &self,
        owner_id: Uuid,
        advertisement_key: &str,
        encrypted_private_data: &str,
    ) -> Result<OwnerTracker> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO trackers (advertisement_key, last_fetch_time, created_at)
             VALUES (?1, NULL, ?2)
             ON CONFLICT(advertisement_key) DO NOTHING",
            params![advertisement_key, to_db_time(&Utc::now())],
        )?;
        let link = new_link(owner_id, advertisement_key, encrypted_private_data);
        insert_link(&tx, &link)?;
        tx.commit()?;

        tracing::debug!(owner = %owner_id, tracker = %advertisement_key, "tracker registered");
        Ok(link)
    }

    pub fn get_owner_tracker(&self, id: Uuid) -> Result<OwnerTracker> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                row_to_owner_tracker,
            )
            .map_err(StoreError::from_query)
    }

    pub fn list_owner_trackers(&self, owner_id: Uuid) -> Result<Vec<OwnerTracker>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS} WHERE owner_id = ?1 ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map(params![owner_id.to_string()], row_to_owner_tracker)?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// Replace the owner-encrypted blob of a link.
    pub fn update_owner_tracker_data(&self, id: Uuid, encrypted_private_data: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE owner_trackers SET encrypted_private_data = ?1 WHERE id = ?2",
            params![encrypted_private_data, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Remove a link. When it was the tracker's last owner the tracker and
    /// its reports are deleted as well.
    pub fn delete_owner_tracker(&self, id: Uuid) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;

        let key: Option<String> = tx
            .query_row(
                "SELECT advertisement_key FROM owner_trackers WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(key) = key else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM owner_trackers WHERE id = ?1",
            params![id.to_string()],
        )?;
        let orphaned = tx.execute(
            "DELETE FROM trackers
             WHERE advertisement_key = ?1
               AND NOT EXISTS (SELECT 1 FROM owner_trackers WHERE advertisement_key = ?1)",
            params![key],
        )?;
        tx.commit()?;

        if orphaned > 0 {
            tracing::debug!(tracker = %key, "last owner removed, tracker deleted");
        }
        Ok(true)
    }
}

fn new_link(owner_id: Uuid, advertisement_key: &str, encrypted_private_data: &str) -> OwnerTracker {
    OwnerTracker {
        id: Uuid::new_v4(),
        owner_id,
        advertisement_key: advertisement_key.to_string(),
        encrypted_private_data: encrypted_private_data.to_string(),
        created_at: Utc::now(),
    }
}

fn insert_link(conn: &rusqlite::Connection, link: &OwnerTracker) -> Result<()> {
    conn.execute(
        "INSERT INTO owner_trackers (id, owner_id, advertisement_key, encrypted_private_data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            link.id.to_string(),
            link.owner_id.to_string(),
            link.advertisement_key,
            link.encrypted_private_data,
            to_db_time(&link.created_at),
        ],
    )
    .map_err(StoreError::from_query)?;
    Ok(())
}

fn row_to_owner_tracker(row: &rusqlite::Row<'_>) -> rusqlite::Result<OwnerTracker> {
    let id_str: String = row.get(0)?;
    let owner_str: String = row.get(1)?;
    let advertisement_key: String = row.get(2)?;
    let encrypted_private_data: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let owner_id = Uuid::parse_str(&owner_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at = parse_db_time(4, &created_str)?;

    Ok(OwnerTracker {
        id,
        owner_id,
        advertisement_key,
        encrypted_private_data,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_tracker_once() {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        db.register_tracker(alice, "key-a", "blob-a").unwrap();
        db.register_tracker(bob, "key-a", "blob-b").unwrap();

        assert_eq!(db.count_trackers().unwrap(), 1);
        assert_eq!(db.list_owner_trackers(alice).unwrap().len(), 1);
        assert_eq!(db.list_owner_trackers(bob).unwrap().len(), 1);
    }

    #[test]
    fn same_owner_twice_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        db.register_tracker(alice, "key-a", "blob").unwrap();
        assert!(matches!(
            db.register_tracker(alice, "key-a", "blob"),
            Err(StoreError::AlreadyExists)
        ));
        assert_eq!(db.list_owner_trackers(alice).unwrap().len(), 1);
    }

    #[test]
    fn link_requires_tracker() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.create_owner_tracker(Uuid::new_v4(), "ghost", "blob"),
            Err(StoreError::NotFound)
        ));

        db.create_tracker("key-a").unwrap();
        let link = db.create_owner_tracker(Uuid::new_v4(), "key-a", "blob").unwrap();
        assert_eq!(db.get_owner_tracker(link.id).unwrap().encrypted_private_data, "blob");
    }

    #[test]
    fn update_data() {
        let db = Database::open_in_memory().unwrap();
        let link = db.register_tracker(Uuid::new_v4(), "key-a", "old").unwrap();
        db.update_owner_tracker_data(link.id, "new").unwrap();
        assert_eq!(db.get_owner_tracker(link.id).unwrap().encrypted_private_data, "new");
        assert!(matches!(
            db.update_owner_tracker_data(Uuid::new_v4(), "x"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_last_owner_removes_tracker() {
        let db = Database::open_in_memory().unwrap();
        let a = db.register_tracker(Uuid::new_v4(), "key-a", "a").unwrap();
        let b = db.register_tracker(Uuid::new_v4(), "key-a", "b").unwrap();

        assert!(db.delete_owner_tracker(a.id).unwrap());
        assert!(db.find_tracker("key-a").unwrap().is_some());

        assert!(db.delete_owner_tracker(b.id).unwrap());
        assert!(db.find_tracker("key-a").unwrap().is_none());

        assert!(!db.delete_owner_tracker(b.id).unwrap());
    }

    #[test]
    fn deleting_tracker_cascades_to_links() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let link = db.register_tracker(owner, "key-a", "a").unwrap();
        db.delete_tracker("key-a").unwrap();
        assert!(db.list_owner_trackers(owner).unwrap().is_empty());
        assert!(matches!(db.get_owner_tracker(link.id), Err(StoreError::NotFound)));
    }
}
