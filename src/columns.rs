//! The set of normalized columns carried by one upload.

use std::collections::BTreeSet;

use itertools::Itertools;
use serde::Serialize;

use crate::naming::{Identifier, normalize_column};

/// Normalized column names in first-seen order, without duplicates.
///
/// Equality is set equality: two uploads whose headers differ only in
/// column order compare equal.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ColumnSet {
    ordered: Vec<Identifier>,
}

impl ColumnSet {
    pub fn from_identifiers<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = Identifier>,
    {
        Self {
            ordered: columns.into_iter().unique().collect(),
        }
    }

    /// Normalizes each raw header and collapses the duplicates that result.
    pub fn from_raw_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_identifiers(headers.into_iter().map(|h| normalize_column(h.as_ref())))
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn position(&self, column: &Identifier) -> Option<usize> {
        self.ordered.iter().position(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.ordered.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|c| c.to_string()).collect()
    }

    fn members(&self) -> BTreeSet<&Identifier> {
        self.ordered.iter().collect()
    }
}

impl PartialEq for ColumnSet {
    fn eq(&self, other: &Self) -> bool {
        self.members() == other.members()
    }
}

impl Eq for ColumnSet {}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a Identifier;
    type IntoIter = std::slice::Iter<'a, Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.ordered.iter()
    }
}
