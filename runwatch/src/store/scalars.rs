//! SQLite scalar store.
//!
//! Each run records scalar indicator values in its `sqlite.db`:
//!
//! ```sql
//! CREATE TABLE scalars (indicator TEXT, step INTEGER, value REAL);
//! ```
//!
//! Only reads happen here. The database is opened read-only so a training
//! process holding the write lock is never disturbed.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::run::{IndicatorValue, ValueMap, STEP_INDICATOR};
use crate::store::SourceError;

/// Table holding recorded scalar values.
pub const SCALARS_TABLE: &str = "scalars";

/// Latest value and step of each requested indicator, plus `step`.
///
/// The synthetic [`STEP_INDICATOR`] entry carries the highest step recorded
/// for any indicator. A missing database or table yields only `step = 0`;
/// requested indicators with no non-NULL rows are omitted.
pub fn latest_values(db_path: &Path, indicators: &[String]) -> Result<ValueMap, SourceError> {
    let mut values = ValueMap::new();

    if !db_path.is_file() {
        values.insert(STEP_INDICATOR.to_string(), IndicatorValue::new(0.0, 0));
        return Ok(values);
    }

    let sqlite_err = |source| SourceError::Sqlite {
        path: db_path.to_path_buf(),
        source,
    };

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(sqlite_err)?;

    if !has_scalars_table(&conn).map_err(sqlite_err)? {
        values.insert(STEP_INDICATOR.to_string(), IndicatorValue::new(0.0, 0));
        return Ok(values);
    }

    let mut stmt = conn
        .prepare(
            "SELECT value, step FROM scalars \
             WHERE indicator = ?1 AND value IS NOT NULL \
             ORDER BY step DESC LIMIT 1",
        )
        .map_err(sqlite_err)?;

    for name in indicators {
        let row = stmt
            .query_row(params![name], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()
            .map_err(sqlite_err)?;

        if let Some((value, step)) = row {
            values.insert(
                name.clone(),
                IndicatorValue::new(value, clamp_step(step)),
            );
        }
    }

    let max_step: Option<i64> = conn
        .query_row("SELECT MAX(step) FROM scalars", [], |row| row.get(0))
        .map_err(sqlite_err)?;
    let max_step = max_step.map(clamp_step).unwrap_or(0);
    values.insert(
        STEP_INDICATOR.to_string(),
        IndicatorValue::new(max_step as f64, max_step),
    );

    Ok(values)
}

fn has_scalars_table(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![SCALARS_TABLE],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}

fn clamp_step(step: i64) -> u64 {
    step.max(0) as u64
}
