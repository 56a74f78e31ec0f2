use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{parse_db_time, to_db_time, Database};
use crate::error::{Result, StoreError};
use crate::models::Report;

const SELECT_COLUMNS: &str = "SELECT id, advertisement_key, time, payload FROM reports";

impl Database {
    /// Insert a report unless one with the same id is already stored.
    ///
    /// Returns `true` when a new row was written. Re-delivered reports are a
    /// no-op, so this is safe to call for every report of every fetch.
    pub fn upsert_report(&self, report: &Report) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT INTO reports (id, advertisement_key, time, payload)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO NOTHING",
            params![
                report.id.to_string(),
                report.advertisement_key,
                to_db_time(&report.time),
                report.payload,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_report(&self, id: Uuid) -> Result<Report> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                row_to_report,
            )
            .map_err(StoreError::from_query)
    }

    /// Reports for a tracker published in `[from, to]`, newest first.
    pub fn find_reports_for_tracker(
        &self,
        advertisement_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Report>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE advertisement_key = ?1 AND time >= ?2 AND time <= ?3
             ORDER BY time DESC, id ASC"
        ))?;

        let rows = stmt.query_map(
            params![advertisement_key, to_db_time(&from), to_db_time(&to)],
            row_to_report,
        )?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }

    /// Most recently published report for a tracker.
    pub fn last_report_for_tracker(&self, advertisement_key: &str) -> Result<Report> {
        self.conn()
            .query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE advertisement_key = ?1 ORDER BY time DESC, id ASC LIMIT 1"
                ),
                params![advertisement_key],
                row_to_report,
            )
            .map_err(StoreError::from_query)
    }

    pub fn count_reports_for_tracker(&self, advertisement_key: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM reports WHERE advertisement_key = ?1",
            params![advertisement_key],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let id_str: String = row.get(0)?;
    let advertisement_key: String = row.get(1)?;
    let time_str: String = row.get(2)?;
    let payload: String = row.get(3)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let time = parse_db_time(2, &time_str)?;

    Ok(Report {
        id,
        advertisement_key,
        time,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn report(key: &str, secs: i64, payload: &str) -> Report {
        Report {
            id: Uuid::new_v4(),
            advertisement_key: key.to_string(),
            time: t(secs),
            payload: payload.to_string(),
        }
    }

    fn db_with(keys: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for key in keys {
            db.create_tracker(key).unwrap();
        }
        db
    }

    #[test]
    fn upsert_is_idempotent() {
        let db = db_with(&["key-a"]);
        let r = report("key-a", 0, "payload");

        assert!(db.upsert_report(&r).unwrap());
        assert!(!db.upsert_report(&r).unwrap());
        assert_eq!(db.count_reports_for_tracker("key-a").unwrap(), 1);
        assert_eq!(db.get_report(r.id).unwrap(), r);
    }

    #[test]
    fn upsert_keeps_first_version() {
        let db = db_with(&["key-a"]);
        let first = report("key-a", 0, "first");
        let mut again = first.clone();
        again.payload = "second".into();

        db.upsert_report(&first).unwrap();
        db.upsert_report(&again).unwrap();
        assert_eq!(db.get_report(first.id).unwrap().payload, "first");
    }

    #[test]
    fn upsert_requires_tracker() {
        let db = db_with(&[]);
        assert!(db.upsert_report(&report("ghost", 0, "p")).is_err());
    }

    #[test]
    fn range_query_and_last_report() {
        let db = db_with(&["key-a", "key-b"]);
        for secs in [0, 60, 120, 180] {
            db.upsert_report(&report("key-a", secs, "p")).unwrap();
        }
        db.upsert_report(&report("key-b", 500, "p")).unwrap();

        let found = db.find_reports_for_tracker("key-a", t(60), t(120)).unwrap();
        let times: Vec<_> = found.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![t(120), t(60)]);

        assert_eq!(db.last_report_for_tracker("key-a").unwrap().time, t(180));
        assert!(matches!(
            db.last_report_for_tracker("key-c"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn deleting_tracker_removes_reports() {
        let db = db_with(&["key-a"]);
        let r = report("key-a", 0, "p");
        db.upsert_report(&r).unwrap();
        db.delete_tracker("key-a").unwrap();
        assert!(matches!(db.get_report(r.id), Err(StoreError::NotFound)));
    }
}
