use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{parse_db_time, to_db_time, Database};
use crate::error::{Result, StoreError};
use crate::models::Tracker;

impl Database {
    /// Insert a tracker that has never been fetched.
    pub fn create_tracker(&self, advertisement_key: &str) -> Result<Tracker> {
        let tracker = Tracker {
            advertisement_key: advertisement_key.to_string(),
            last_fetch_time: None,
            created_at: Utc::now(),
        };
        self.conn()
            .execute(
                "INSERT INTO trackers (advertisement_key, last_fetch_time, created_at)
                 VALUES (?1, NULL, ?2)",
                params![tracker.advertisement_key, to_db_time(&tracker.created_at)],
            )
            .map_err(StoreError::from_query)?;
        Ok(tracker)
    }

    pub fn get_tracker(&self, advertisement_key: &str) -> Result<Tracker> {
        self.conn()
            .query_row(
                "SELECT advertisement_key, last_fetch_time, created_at
                 FROM trackers WHERE advertisement_key = ?1",
                params![advertisement_key],
                row_to_tracker,
            )
            .map_err(StoreError::from_query)
    }

    pub fn find_tracker(&self, advertisement_key: &str) -> Result<Option<Tracker>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT advertisement_key, last_fetch_time, created_at
                 FROM trackers WHERE advertisement_key = ?1",
                params![advertisement_key],
                row_to_tracker,
            )
            .optional()?)
    }

    /// Trackers due for a fetch: never fetched, or last fetched before
    /// `cutoff`. Never-fetched trackers come first, then oldest first.
    pub fn find_trackers_fetched_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tracker>> {
        let mut stmt = self.conn().prepare(
            "SELECT advertisement_key, last_fetch_time, created_at
             FROM trackers
             WHERE last_fetch_time IS NULL OR last_fetch_time < ?1
             ORDER BY last_fetch_time IS NOT NULL, last_fetch_time ASC, advertisement_key ASC",
        )?;

        let rows = stmt.query_map(params![to_db_time(&cutoff)], row_to_tracker)?;

        let mut trackers = Vec::new();
        for row in rows {
            trackers.push(row?);
        }
        Ok(trackers)
    }

    /// Set `last_fetch_time` for the given trackers. A value is never moved
    /// backwards. Returns the number of rows changed.
    pub fn update_last_fetch_time(
        &self,
        advertisement_keys: &[String],
        time: DateTime<Utc>,
    ) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        let time = to_db_time(&time);
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE trackers SET last_fetch_time = ?1
                 WHERE advertisement_key = ?2
                   AND (last_fetch_time IS NULL OR last_fetch_time < ?1)",
            )?;
            for key in advertisement_keys {
                changed += stmt.execute(params![time, key])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Delete a tracker together with its owner links and reports.
    pub fn delete_tracker(&self, advertisement_key: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM trackers WHERE advertisement_key = ?1",
            params![advertisement_key],
        )?;
        Ok(affected > 0)
    }

    pub fn count_trackers(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM trackers", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

pub(crate) fn row_to_tracker(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tracker> {
    let advertisement_key: String = row.get(0)?;
    let last_fetch: Option<String> = row.get(1)?;
    let created_str: String = row.get(2)?;

    let last_fetch_time = last_fetch
        .as_deref()
        .map(|s| parse_db_time(1, s))
        .transpose()?;
    let created_at = parse_db_time(2, &created_str)?;

    Ok(Tracker {
        advertisement_key,
        last_fetch_time,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SubsecRound, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn create_and_get() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_tracker("key-a").unwrap();
        let fetched = db.get_tracker("key-a").unwrap();
        assert_eq!(fetched.advertisement_key, "key-a");
        assert_eq!(fetched.last_fetch_time, None);
        assert_eq!(fetched.created_at, created.created_at.trunc_subsecs(6));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_tracker("key-a").unwrap();
        assert!(matches!(db.create_tracker("key-a"), Err(StoreError::AlreadyExists)));
    }

    #[test]
    fn missing_tracker() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_tracker("nope"), Err(StoreError::NotFound)));
        assert!(db.find_tracker("nope").unwrap().is_none());
    }

    #[test]
    fn stale_selection_includes_never_fetched() {
        let db = Database::open_in_memory().unwrap();
        for key in ["fresh", "stale", "never"] {
            db.create_tracker(key).unwrap();
        }
        db.update_last_fetch_time(&["fresh".into()], t(100)).unwrap();
        db.update_last_fetch_time(&["stale".into()], t(-100)).unwrap();

        let due: Vec<String> = db
            .find_trackers_fetched_before(t(0))
            .unwrap()
            .into_iter()
            .map(|t| t.advertisement_key)
            .collect();
        assert_eq!(due, vec!["never".to_string(), "stale".to_string()]);
    }

    #[test]
    fn last_fetch_time_never_moves_backwards() {
        let db = Database::open_in_memory().unwrap();
        db.create_tracker("key-a").unwrap();

        assert_eq!(db.update_last_fetch_time(&["key-a".into()], t(50)).unwrap(), 1);
        assert_eq!(db.update_last_fetch_time(&["key-a".into()], t(10)).unwrap(), 0);
        assert_eq!(db.get_tracker("key-a").unwrap().last_fetch_time, Some(t(50)));
    }

    #[test]
    fn update_ignores_unknown_keys() {
        let db = Database::open_in_memory().unwrap();
        db.create_tracker("key-a").unwrap();
        let changed = db
            .update_last_fetch_time(&["key-a".into(), "ghost".into()], t(0))
            .unwrap();
        assert_eq!(changed, 1);
    }

    #[test]
    fn delete() {
        let db = Database::open_in_memory().unwrap();
        db.create_tracker("key-a").unwrap();
        assert!(db.delete_tracker("key-a").unwrap());
        assert!(!db.delete_tracker("key-a").unwrap());
        assert_eq!(db.count_trackers().unwrap(), 0);
    }
}
