//! Hand-off of resolved uploads to the loader.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use log::info;
use serde::Serialize;

use crate::{columns::ColumnSet, error::UploadError, naming::Identifier, rows::RowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[value(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Replace,
    #[default]
    Append,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Replace => f.write_str("replace"),
            WriteMode::Append => f.write_str("append"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub namespace: Identifier,
    pub table: Identifier,
    pub mode: WriteMode,
    pub rows_loaded: u64,
    pub rows_cleared: u64,
    pub completed_at: DateTime<Utc>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mode: loaded {} row(s) into {}.{}",
            self.mode, self.rows_loaded, self.namespace, self.table
        )?;
        if self.rows_cleared > 0 {
            write!(f, " after clearing {} row(s)", self.rows_cleared)?;
        }
        write!(
            f,
            " in {} ms, completed {}",
            self.elapsed.as_millis(),
            self.completed_at.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        )
    }
}

pub trait Loader {
    /// Writes `rows` into exactly `namespace.table`. Each row is aligned with
    /// `columns`, which may list the table's columns in any order.
    fn load<I>(
        &self,
        namespace: &Identifier,
        table: &Identifier,
        mode: WriteMode,
        columns: &ColumnSet,
        rows: I,
    ) -> Result<LoadSummary, UploadError>
    where
        I: Iterator<Item = RowResult>;
}

/// Passes the resolver's table name through verbatim and returns the loader's
/// summary unchanged.
pub fn dispatch<L, I>(
    loader: &L,
    namespace: &Identifier,
    table: &Identifier,
    mode: WriteMode,
    columns: &ColumnSet,
    rows: I,
) -> Result<LoadSummary, UploadError>
where
    L: Loader,
    I: Iterator<Item = RowResult>,
{
    info!("Loading into {namespace}.{table} ({mode})");
    let summary = loader.load(namespace, table, mode, columns, rows)?;
    info!("{summary}");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::naming::normalize_table;

    #[test]
    fn summary_display_mentions_cleared_rows_only_when_present() {
        let mut summary = LoadSummary {
            namespace: normalize_table("csv_demo"),
            table: normalize_table("sales"),
            mode: WriteMode::Replace,
            rows_loaded: 3,
            rows_cleared: 0,
            completed_at: Utc.with_ymd_and_hms(2024, 5, 6, 14, 30, 0).unwrap(),
            elapsed: Duration::from_millis(12),
        };
        assert_eq!(
            summary.to_string(),
            "replace mode: loaded 3 row(s) into csv_demo.sales in 12 ms, completed 2024-05-06T14:30:00.000Z"
        );
        summary.rows_cleared = 7;
        assert!(summary.to_string().contains("after clearing 7 row(s)"));
    }

    #[test]
    fn append_is_the_default_mode() {
        assert_eq!(WriteMode::default(), WriteMode::Append);
        assert_eq!(WriteMode::from_str("replace", true).unwrap(), WriteMode::Replace);
    }
}
