//! Identifier normalization for namespaces, tables, and columns.
//!
//! Everything the store sees as a name passes through [`normalize_identifier`]:
//! the result only contains `[a-z0-9_]`, is never empty, and never starts with
//! a digit. Digit-led names get a context-specific prefix (`t_` for tables and
//! namespaces, `c_` for columns) and empty names get a fallback token
//! (`uploaded_csv` and `col` respectively). Normalizing an already-normalized
//! name returns it unchanged.

use std::{fmt, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

pub const COLUMN_FALLBACK: &str = "col";
pub const TABLE_FALLBACK: &str = "uploaded_csv";
pub const COLUMN_DIGIT_PREFIX: &str = "c_";
pub const TABLE_DIGIT_PREFIX: &str = "t_";

/// Which kind of name is being normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameContext {
    Column,
    Table,
}

impl NameContext {
    fn fallback(self) -> &'static str {
        match self {
            NameContext::Column => COLUMN_FALLBACK,
            NameContext::Table => TABLE_FALLBACK,
        }
    }

    fn digit_prefix(self) -> &'static str {
        match self {
            NameContext::Column => COLUMN_DIGIT_PREFIX,
            NameContext::Table => TABLE_DIGIT_PREFIX,
        }
    }
}

/// A canonical, store-safe name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends `__<suffix>` to a base name. `suffix` must already be made of
    /// `[a-z0-9_]` characters.
    pub(crate) fn with_suffix(&self, suffix: &str) -> Identifier {
        debug_assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        );
        Identifier(format!("{}__{suffix}", self.0))
    }

    pub(crate) fn is_canonical(value: &str) -> bool {
        !value.is_empty()
            && !value.starts_with(|c: char| c.is_ascii_digit())
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    /// Wraps a name read back from the store, provided it is already canonical.
    /// Non-canonical names are handed back untouched.
    pub(crate) fn from_store(value: String) -> Result<Identifier, String> {
        if Self::is_canonical(&value) {
            Ok(Identifier(value))
        } else {
            Err(value)
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn separator_runs() -> &'static Regex {
    static RUNS: OnceLock<Regex> = OnceLock::new();
    RUNS.get_or_init(|| Regex::new("[^a-z0-9]+").expect("static pattern compiles"))
}

pub fn normalize_identifier(raw: &str, context: NameContext) -> Identifier {
    let lowered = raw.trim().to_lowercase();
    let without_marker = lowered.strip_prefix('#').unwrap_or(&lowered);
    let replaced = separator_runs().replace_all(without_marker, "_");
    let trimmed = replaced.trim_matches('_');

    let name = if trimmed.is_empty() {
        context.fallback().to_string()
    } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{}{trimmed}", context.digit_prefix())
    } else {
        trimmed.to_string()
    };
    Identifier(name)
}

pub fn normalize_column(raw: &str) -> Identifier {
    normalize_identifier(raw, NameContext::Column)
}

pub fn normalize_table(raw: &str) -> Identifier {
    normalize_identifier(raw, NameContext::Table)
}

/// Derives the base table name for an upload from its filename.
pub fn table_base_name_from_filename(filename: &str) -> Identifier {
    let file_part = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    let stem = strip_csv_suffix(file_part);
    normalize_table(stem)
}

pub fn has_csv_suffix(filename: &str) -> bool {
    let trimmed = filename.trim_end();
    trimmed.len() >= 4
        && trimmed.is_char_boundary(trimmed.len() - 4)
        && trimmed[trimmed.len() - 4..].eq_ignore_ascii_case(".csv")
}

fn strip_csv_suffix(name: &str) -> &str {
    if has_csv_suffix(name) {
        let trimmed = name.trim_end();
        &trimmed[..trimmed.len() - 4]
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_column_strips_spreadsheet_marker() {
        assert_eq!(normalize_column("#Passengers").as_str(), "passengers");
        assert_eq!(normalize_column("  Month ").as_str(), "month");
        assert_eq!(normalize_column("##Twice").as_str(), "twice");
    }

    #[test]
    fn normalize_collapses_separator_runs() {
        assert_eq!(normalize_column("Order  ID").as_str(), "order_id");
        assert_eq!(normalize_column("$Percent%").as_str(), "percent");
        assert_eq!(normalize_column("a__-__b").as_str(), "a_b");
        assert_eq!(normalize_column("Annual Income (k$)").as_str(), "annual_income_k");
    }

    #[test]
    fn normalize_uses_context_fallbacks() {
        assert_eq!(normalize_column("").as_str(), "col");
        assert_eq!(normalize_column(" %%% ").as_str(), "col");
        assert_eq!(normalize_table("***").as_str(), "uploaded_csv");
    }

    #[test]
    fn normalize_prefixes_leading_digits() {
        assert_eq!(normalize_column("2024 sales").as_str(), "c_2024_sales");
        assert_eq!(normalize_table("123data").as_str(), "t_123data");
    }

    #[test]
    fn non_ascii_letters_become_separators() {
        assert_eq!(normalize_column("Café Name").as_str(), "caf_name");
    }

    #[test]
    fn table_base_name_drops_path_and_extension() {
        assert_eq!(
            table_base_name_from_filename("Mall_Customers.csv").as_str(),
            "mall_customers"
        );
        assert_eq!(
            table_base_name_from_filename("C:\\exports\\Q1 Report.CSV").as_str(),
            "q1_report"
        );
        assert_eq!(
            table_base_name_from_filename("uploads/nested/123data.csv").as_str(),
            "t_123data"
        );
        assert_eq!(table_base_name_from_filename(".csv").as_str(), "uploaded_csv");
    }

    #[test]
    fn csv_suffix_check_is_case_insensitive() {
        assert!(has_csv_suffix("data.CsV"));
        assert!(!has_csv_suffix("data.tsv"));
        assert!(!has_csv_suffix("csv"));
    }

    #[test]
    fn fork_names_keep_double_underscore() {
        let base = normalize_table("sales");
        assert_eq!(base.with_suffix("0a1b2c3d").as_str(), "sales__0a1b2c3d");
    }

    #[test]
    fn canonical_check_rejects_digit_led_names() {
        assert!(Identifier::is_canonical("t_123"));
        assert!(!Identifier::is_canonical("123"));
        assert!(!Identifier::is_canonical("Upper"));
        assert!(!Identifier::is_canonical(""));
    }
}
