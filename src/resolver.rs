//! Table resolution: which table an upload lands in.
//!
//! Under an advisory lock keyed by `namespace.base_name`, the resolver looks
//! the base table up in the catalog and decides:
//!
//! | catalog state                      | decision                            | final table         |
//! |------------------------------------|-------------------------------------|---------------------|
//! | table missing                      | `created_new_table`                 | `base`              |
//! | table exists, same column set      | `matched_existing_table`            | `base`              |
//! | table exists, different column set | `schema_mismatch_created_new_table` | `base__<8 hex>`     |
//!
//! A table whose columns carry names the normalizer would never produce (for
//! example one created by hand with a `"Order ID"` column) counts as a
//! different column set, since uploads cannot be written into it.
//!
//! New names are reserved in the store before the lock is released, so a
//! concurrent upload of the same file observes the table and matches it
//! instead of racing to create its own. The bulk load happens afterwards,
//! outside the lock.

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    catalog::{SchemaCatalog, TableReservations},
    columns::ColumnSet,
    error::UploadError,
    lock::{AdvisoryLock, lock_id, lock_key},
    naming::Identifier,
};

pub const FORK_SUFFIX_LEN: usize = 8;
pub const MAX_FORK_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionDecision {
    CreatedNewTable,
    MatchedExistingTable,
    SchemaMismatchCreatedNewTable,
}

impl ResolutionDecision {
    pub fn code(self) -> &'static str {
        match self {
            ResolutionDecision::CreatedNewTable => "created_new_table",
            ResolutionDecision::MatchedExistingTable => "matched_existing_table",
            ResolutionDecision::SchemaMismatchCreatedNewTable => {
                "schema_mismatch_created_new_table"
            }
        }
    }
}

impl fmt::Display for ResolutionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub final_name: Identifier,
    pub decision: ResolutionDecision,
}

type SuffixSource = Box<dyn Fn() -> String + Send + Sync>;

pub struct TableResolver<'a, S> {
    store: &'a S,
    suffixes: SuffixSource,
}

impl<'a, S> TableResolver<'a, S>
where
    S: SchemaCatalog + TableReservations + AdvisoryLock,
{
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            suffixes: Box::new(random_suffix),
        }
    }

    /// Replaces the random fork-suffix generator.
    pub fn with_suffixes<F>(mut self, source: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.suffixes = Box::new(source);
        self
    }

    pub fn resolve(
        &self,
        namespace: &Identifier,
        base_name: &Identifier,
        incoming: &ColumnSet,
    ) -> Result<Resolution, UploadError> {
        let key = lock_key(namespace.as_str(), base_name.as_str());
        debug!("Resolving '{key}' under lock id {}", lock_id(&key));

        let resolution = self.store.with_exclusive_lock(&key, || {
            let existing = self.store.table_info(namespace, base_name)?;
            let resolution = if !existing.exists {
                Resolution {
                    final_name: base_name.clone(),
                    decision: ResolutionDecision::CreatedNewTable,
                }
            } else if existing.matches(incoming) {
                Resolution {
                    final_name: base_name.clone(),
                    decision: ResolutionDecision::MatchedExistingTable,
                }
            } else {
                debug!(
                    "Columns of {key} {:?} (foreign: {:?}) differ from upload {:?}",
                    existing.columns.names(),
                    existing.foreign_columns,
                    incoming.names()
                );
                Resolution {
                    final_name: self.fork_name(namespace, base_name)?,
                    decision: ResolutionDecision::SchemaMismatchCreatedNewTable,
                }
            };
            if resolution.decision != ResolutionDecision::MatchedExistingTable {
                self.store
                    .reserve_table(namespace, &resolution.final_name, incoming)?;
            }
            Ok(resolution)
        })?;

        info!(
            "Resolved {namespace}.{base_name} -> {namespace}.{} ({})",
            resolution.final_name, resolution.decision
        );
        Ok(resolution)
    }

    fn fork_name(
        &self,
        namespace: &Identifier,
        base_name: &Identifier,
    ) -> Result<Identifier, UploadError> {
        for _ in 0..MAX_FORK_ATTEMPTS {
            let candidate = base_name.with_suffix(&(self.suffixes)());
            if !self.store.has_table(namespace, &candidate)? {
                return Ok(candidate);
            }
            warn!("Fork name {namespace}.{candidate} already taken; drawing another");
        }
        Err(UploadError::ForkNamesExhausted {
            base: base_name.to_string(),
            attempts: MAX_FORK_ATTEMPTS,
        })
    }
}

/// Eight random lowercase hex characters.
pub fn random_suffix() -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(FORK_SUFFIX_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;
    use crate::naming::normalize_table;

    #[derive(Default)]
    struct MemoryStore {
        tables: Mutex<HashMap<(String, String), Vec<String>>>,
        lock: Mutex<()>,
        catalog_down: bool,
        lock_calls: AtomicUsize,
    }

    impl MemoryStore {
        fn with_table(self, name: &str, columns: &[&str]) -> Self {
            self.tables.lock().unwrap().insert(
                ("csv_demo".to_string(), name.to_string()),
                columns.iter().map(|c| c.to_string()).collect(),
            );
            self
        }

        fn contains(&self, name: &str) -> bool {
            self.tables
                .lock()
                .unwrap()
                .contains_key(&("csv_demo".to_string(), name.to_string()))
        }
    }

    impl SchemaCatalog for MemoryStore {
        fn has_table(&self, ns: &Identifier, name: &Identifier) -> Result<bool, UploadError> {
            if self.catalog_down {
                return Err(UploadError::catalog(
                    ns.as_str(),
                    name.as_str(),
                    rusqlite::Error::InvalidQuery,
                ));
            }
            Ok(self
                .tables
                .lock()
                .unwrap()
                .contains_key(&(ns.to_string(), name.to_string())))
        }

        fn columns_of(
            &self,
            ns: &Identifier,
            name: &Identifier,
        ) -> Result<Vec<String>, UploadError> {
            Ok(self
                .tables
                .lock()
                .unwrap()
                .get(&(ns.to_string(), name.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    impl TableReservations for MemoryStore {
        fn reserve_table(
            &self,
            ns: &Identifier,
            name: &Identifier,
            columns: &ColumnSet,
        ) -> Result<(), UploadError> {
            self.tables
                .lock()
                .unwrap()
                .entry((ns.to_string(), name.to_string()))
                .or_insert_with(|| columns.iter().map(|c| c.to_string()).collect());
            Ok(())
        }
    }

    impl AdvisoryLock for MemoryStore {
        fn with_exclusive_lock<T, F>(&self, _key: &str, body: F) -> Result<T, UploadError>
        where
            F: FnOnce() -> Result<T, UploadError>,
        {
            self.lock_calls.fetch_add(1, Ordering::SeqCst);
            let _guard = self.lock.lock().unwrap();
            body()
        }
    }

    fn ns() -> Identifier {
        normalize_table("csv_demo")
    }

    fn columns(names: &[&str]) -> ColumnSet {
        ColumnSet::from_raw_headers(names.iter().copied())
    }

    #[test]
    fn missing_table_is_created_under_base_name() {
        let store = MemoryStore::default();
        let base = normalize_table("sales");
        let resolution = TableResolver::new(&store)
            .resolve(&ns(), &base, &columns(&["id", "total"]))
            .unwrap();
        assert_eq!(resolution.decision, ResolutionDecision::CreatedNewTable);
        assert_eq!(resolution.final_name, base);
        assert!(store.contains("sales"));
        assert_eq!(store.lock_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_columns_in_any_order_match() {
        let store = MemoryStore::default().with_table("sales", &["id", "total"]);
        let base = normalize_table("sales");
        let resolution = TableResolver::new(&store)
            .resolve(&ns(), &base, &columns(&["Total", "ID"]))
            .unwrap();
        assert_eq!(resolution.decision, ResolutionDecision::MatchedExistingTable);
        assert_eq!(resolution.final_name, base);
    }

    #[test]
    fn mismatched_columns_fork_a_sibling_table() {
        let store = MemoryStore::default().with_table("sales", &["id", "total"]);
        let base = normalize_table("sales");
        let resolution = TableResolver::new(&store)
            .resolve(&ns(), &base, &columns(&["id", "total", "region"]))
            .unwrap();
        assert_eq!(
            resolution.decision,
            ResolutionDecision::SchemaMismatchCreatedNewTable
        );
        let name = resolution.final_name.as_str();
        assert!(name.starts_with("sales__"), "{name}");
        let suffix = &name["sales__".len()..];
        assert_eq!(suffix.len(), FORK_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(store.contains(name));
    }

    #[test]
    fn hand_made_column_names_force_a_fork() {
        let store = MemoryStore::default().with_table("orders", &["Order ID", "total"]);
        let base = normalize_table("orders");
        let resolution = TableResolver::new(&store)
            .resolve(&ns(), &base, &columns(&["order_id", "total"]))
            .unwrap();
        assert_eq!(
            resolution.decision,
            ResolutionDecision::SchemaMismatchCreatedNewTable
        );
        assert_ne!(resolution.final_name, base);
    }

    #[test]
    fn fork_redraws_on_suffix_collision() {
        let store = MemoryStore::default()
            .with_table("sales", &["id"])
            .with_table("sales__aaaaaaaa", &["other"]);
        let draws = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&draws);
        let resolver = TableResolver::new(&store).with_suffixes(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                "aaaaaaaa".to_string()
            } else {
                "bbbbbbbb".to_string()
            }
        });
        let resolution = resolver
            .resolve(&ns(), &normalize_table("sales"), &columns(&["id", "name"]))
            .unwrap();
        assert_eq!(resolution.final_name.as_str(), "sales__bbbbbbbb");
        assert_eq!(draws.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fork_gives_up_after_bounded_attempts() {
        let store = MemoryStore::default()
            .with_table("sales", &["id"])
            .with_table("sales__aaaaaaaa", &["other"]);
        let resolver = TableResolver::new(&store).with_suffixes(|| "aaaaaaaa".to_string());
        let err = resolver
            .resolve(&ns(), &normalize_table("sales"), &columns(&["id", "name"]))
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::ForkNamesExhausted { attempts: MAX_FORK_ATTEMPTS, .. }
        ));
    }

    #[test]
    fn repeated_resolution_is_deterministic() {
        let store = MemoryStore::default().with_table("sales", &["id", "total"]);
        let resolver = TableResolver::new(&store);
        let base = normalize_table("sales");
        let incoming = columns(&["id", "total"]);
        let first = resolver.resolve(&ns(), &base, &incoming).unwrap();
        let second = resolver.resolve(&ns(), &base, &incoming).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn catalog_failure_is_not_treated_as_missing() {
        let store = MemoryStore {
            catalog_down: true,
            ..MemoryStore::default()
        };
        let err = TableResolver::new(&store)
            .resolve(&ns(), &normalize_table("sales"), &columns(&["id"]))
            .unwrap_err();
        assert!(matches!(err, UploadError::CatalogUnavailable { .. }));
        assert!(!store.contains("sales"));
    }

    #[test]
    fn random_suffix_is_lowercase_hex() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), FORK_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }
}
