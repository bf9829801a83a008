use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::accuracy::LoggedAccuracy;
use crate::error::ForecastResult;
use crate::model::accuracy::AccuracyRecord;
use crate::model::fuel::FuelType;
use crate::weights::WeightSet;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn ensure_parent(path: &Path) -> ForecastResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn open_accuracy_db(path: &Path) -> ForecastResult<Connection> {
    ensure_parent(path)?;
    let conn = Connection::open(path)?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS accuracy_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            region TEXT NOT NULL,
            fuel TEXT NOT NULL,
            date TEXT NOT NULL,
            run_id TEXT NOT NULL,
            day_offset INTEGER NOT NULL,
            predicted_price REAL NOT NULL,
            realized_price REAL NOT NULL,
            reference_price REAL NOT NULL,
            abs_error REAL NOT NULL,
            pct_error REAL NOT NULL,
            recorded_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS accuracy_records_series
            ON accuracy_records(region, fuel, date);
        CREATE TABLE IF NOT EXISTS accuracy_attributions (
            record_id INTEGER NOT NULL REFERENCES accuracy_records(id),
            factor_id TEXT NOT NULL,
            contribution REAL NOT NULL,
            PRIMARY KEY (record_id, factor_id)
        );
        "#,
    )?;
    Ok(conn)
}

/// Append entries to the log, each with its per-factor contributions.
/// Rows are never updated or deleted here.
pub fn append_accuracy_log(path: &Path, entries: &[LoggedAccuracy]) -> ForecastResult<usize> {
    let mut conn = open_accuracy_db(path)?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let tx = conn.transaction()?;
    for entry in entries {
        let r = &entry.record;
        tx.execute(
            r#"
            INSERT INTO accuracy_records (
                region, fuel, date, run_id, day_offset, predicted_price,
                realized_price, reference_price, abs_error, pct_error, recorded_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                r.region,
                r.fuel.as_str(),
                r.date.format(DATE_FORMAT).to_string(),
                r.run_id,
                r.day_offset as i64,
                r.predicted_price,
                r.realized_price,
                entry.reference_price,
                r.abs_error,
                r.pct_error,
                now_ms,
            ],
        )?;
        let record_id = tx.last_insert_rowid();
        for (factor_id, contribution) in &entry.contributions {
            tx.execute(
                "INSERT INTO accuracy_attributions (record_id, factor_id, contribution) \
                 VALUES (?1, ?2, ?3)",
                params![record_id, factor_id, contribution],
            )?;
        }
    }
    tx.commit()?;
    Ok(entries.len())
}

/// Load the log in insertion order, optionally restricted to one fuel.
pub fn load_accuracy_log(
    path: &Path,
    fuel: Option<FuelType>,
) -> ForecastResult<Vec<LoggedAccuracy>> {
    let conn = open_accuracy_db(path)?;
    let mut stmt = conn.prepare(
        r#"
        SELECT id, region, fuel, date, run_id, day_offset, predicted_price,
               realized_price, reference_price, abs_error, pct_error
        FROM accuracy_records
        WHERE ?1 IS NULL OR fuel = ?1
        ORDER BY id ASC
        "#,
    )?;

    let rows = stmt.query_map([fuel.map(|f| f.as_str())], |row| {
        let id: i64 = row.get(0)?;
        let fuel_label: String = row.get(2)?;
        let fuel = FuelType::parse(&fuel_label).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown fuel '{fuel_label}'").into(),
            )
        })?;
        let date_label: String = row.get(3)?;
        let date = NaiveDate::parse_from_str(&date_label, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        let record = AccuracyRecord {
            region: row.get(1)?,
            fuel,
            date,
            run_id: row.get(4)?,
            day_offset: row.get::<_, i64>(5)?.max(0) as usize,
            predicted_price: row.get(6)?,
            realized_price: row.get(7)?,
            abs_error: row.get(9)?,
            pct_error: row.get(10)?,
        };
        let reference_price: f64 = row.get(8)?;
        Ok((id, record, reference_price))
    })?;

    let mut headers = Vec::new();
    for row in rows {
        headers.push(row?);
    }

    let mut contributions_of = conn.prepare(
        "SELECT factor_id, contribution FROM accuracy_attributions WHERE record_id = ?1",
    )?;
    let mut entries = Vec::with_capacity(headers.len());
    for (id, record, reference_price) in headers {
        let mut contributions = BTreeMap::new();
        let rows = contributions_of.query_map([id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        for row in rows {
            let (factor_id, contribution) = row?;
            contributions.insert(factor_id, contribution);
        }
        entries.push(LoggedAccuracy {
            record,
            reference_price,
            contributions,
        });
    }
    Ok(entries)
}

pub fn persist_weight_snapshot_to_path(path: &Path, set: &WeightSet) -> ForecastResult<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(set)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_weight_snapshot_from_path(path: &Path) -> ForecastResult<Option<WeightSet>> {
    if !path.exists() {
        return Ok(None);
    }
    let payload = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&payload)?))
}
