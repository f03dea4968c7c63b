//! One upload, start to finish: validate, extract headers, resolve, load.

use encoding_rs::Encoding;
use log::info;
use serde::Serialize;

use crate::{
    catalog::{SchemaCatalog, TableReservations},
    config::DEFAULT_NAMESPACE,
    error::UploadError,
    headers,
    ingest::{self, Loader, WriteMode},
    lock::AdvisoryLock,
    naming::{Identifier, has_csv_suffix, normalize_table, table_base_name_from_filename},
    resolver::{ResolutionDecision, TableResolver},
    rows::RowStream,
};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content: Vec<u8>,
    pub table: Option<String>,
    pub namespace: Option<String>,
    pub mode: WriteMode,
    pub encoding: Option<&'static Encoding>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            table: None,
            namespace: None,
            mode: WriteMode::default(),
            encoding: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Tried before the default decode order.
    pub fn with_encoding(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.encoding = encoding;
        self
    }

    fn validate(&self) -> Result<(), UploadError> {
        if self.filename.trim().is_empty() {
            return Err(UploadError::Validation("missing filename".to_string()));
        }
        if !has_csv_suffix(&self.filename) {
            return Err(UploadError::Validation(format!(
                "'{}' is not a .csv file",
                self.filename
            )));
        }
        if self.content.is_empty() {
            return Err(UploadError::Validation("empty file".to_string()));
        }
        Ok(())
    }

    fn base_name(&self) -> Identifier {
        match self.table.as_deref().map(str::trim) {
            Some(table) if !table.is_empty() => normalize_table(table),
            _ => table_base_name_from_filename(&self.filename),
        }
    }

    fn namespace(&self) -> Identifier {
        match self.namespace.as_deref().map(str::trim) {
            Some(namespace) if !namespace.is_empty() => normalize_table(namespace),
            _ => normalize_table(DEFAULT_NAMESPACE),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub namespace: Identifier,
    pub base_table: Identifier,
    pub final_table: Identifier,
    pub decision: ResolutionDecision,
    pub mode: WriteMode,
    pub columns: Vec<String>,
    /// Encoding the upload was decoded with.
    pub encoding: String,
    /// Set when no encoding decoded cleanly and invalid bytes were replaced.
    pub lossy_decode: bool,
    pub load_summary: String,
}

pub fn handle_upload<S>(store: &S, request: &UploadRequest) -> Result<UploadResponse, UploadError>
where
    S: SchemaCatalog + TableReservations + AdvisoryLock + Loader,
{
    request.validate()?;
    let namespace = request.namespace();
    let base_table = request.base_name();

    let (columns, decoded) = headers::extract_column_set_with(&request.content, request.encoding)?;
    info!(
        "Upload '{}' -> {namespace}.{base_table} with {} column(s)",
        request.filename,
        columns.len()
    );

    let resolution = TableResolver::new(store).resolve(&namespace, &base_table, &columns)?;

    let rows = RowStream::new(&decoded.text, &columns)
        .map_err(|err| UploadError::MalformedInput(format!("unreadable header row: {err}")))?;
    let summary = ingest::dispatch(
        store,
        &namespace,
        &resolution.final_name,
        request.mode,
        &columns,
        rows,
    )?;

    Ok(UploadResponse {
        message: "Loaded successfully".to_string(),
        namespace,
        base_table,
        final_table: resolution.final_name,
        decision: resolution.decision,
        mode: request.mode,
        columns: columns.names(),
        encoding: decoded.encoding.name().to_ascii_lowercase(),
        lossy_decode: decoded.lossy,
        load_summary: summary.to_string(),
    })
}
