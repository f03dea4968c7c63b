//! Schema catalog inspection against the destination store.
//!
//! Implementations must query live store metadata on every call. A failed
//! query is reported as [`UploadError::CatalogUnavailable`], never as a
//! missing table.

use crate::{columns::ColumnSet, error::UploadError, naming::Identifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub exists: bool,
    /// Canonical column names. Empty and meaningless when `exists` is false.
    pub columns: ColumnSet,
    /// Column names the normalizer could never produce, e.g. `Order ID` on a
    /// table created outside this tool.
    pub foreign_columns: Vec<String>,
}

impl TableInfo {
    pub fn missing() -> Self {
        Self {
            exists: false,
            columns: ColumnSet::default(),
            foreign_columns: Vec::new(),
        }
    }

    /// Whether an upload with `incoming` columns can be written into this
    /// table as is. A table with foreign column names never matches.
    pub fn matches(&self, incoming: &ColumnSet) -> bool {
        self.exists && self.foreign_columns.is_empty() && self.columns == *incoming
    }
}

pub trait SchemaCatalog {
    /// Table lookup follows the store's identifier rules, so `Sales` is found
    /// when asking for `sales`.
    fn has_table(&self, namespace: &Identifier, name: &Identifier) -> Result<bool, UploadError>;

    /// Column names of an existing table exactly as the store declares them,
    /// in declaration order.
    fn columns_of(
        &self,
        namespace: &Identifier,
        name: &Identifier,
    ) -> Result<Vec<String>, UploadError>;

    fn table_info(
        &self,
        namespace: &Identifier,
        name: &Identifier,
    ) -> Result<TableInfo, UploadError> {
        if !self.has_table(namespace, name)? {
            return Ok(TableInfo::missing());
        }
        let mut canonical = Vec::new();
        let mut foreign_columns = Vec::new();
        for column in self.columns_of(namespace, name)? {
            match Identifier::from_store(column) {
                Ok(identifier) => canonical.push(identifier),
                Err(raw) => foreign_columns.push(raw),
            }
        }
        Ok(TableInfo {
            exists: true,
            columns: ColumnSet::from_identifiers(canonical),
            foreign_columns,
        })
    }
}

/// Makes a resolved table name durable before the resolution lock is released.
pub trait TableReservations {
    /// Creates `namespace.name` with `columns`. Fails if the name is taken.
    fn reserve_table(
        &self,
        namespace: &Identifier,
        name: &Identifier,
        columns: &ColumnSet,
    ) -> Result<(), UploadError>;
}
