//! Header extraction: the column set of an upload, read from its first record.

use encoding_rs::Encoding;
use log::debug;

use crate::{
    columns::ColumnSet,
    error::UploadError,
    io_utils::{self, DecodedText},
};

/// Decodes `raw` and builds the column set from its header record.
pub fn extract_column_set(raw: &[u8]) -> Result<ColumnSet, UploadError> {
    extract_column_set_with(raw, None).map(|(columns, _)| columns)
}

/// Like [`extract_column_set`], honoring an explicit encoding and handing the
/// decoded text back so the row pass does not decode twice.
pub fn extract_column_set_with(
    raw: &[u8],
    encoding: Option<&'static Encoding>,
) -> Result<(ColumnSet, DecodedText), UploadError> {
    let decoded = io_utils::decode_upload(raw, encoding);
    let columns = column_set_from_text(&decoded.text)?;
    Ok((columns, decoded))
}

pub fn column_set_from_text(text: &str) -> Result<ColumnSet, UploadError> {
    let mut reader = io_utils::open_text_reader(text);
    let headers = reader
        .headers()
        .map_err(|err| UploadError::MalformedInput(format!("unreadable header row: {err}")))?;
    if headers.is_empty() {
        return Err(UploadError::MalformedInput(
            "no header row found in upload".to_string(),
        ));
    }
    debug!("Raw headers: {:?}", headers.iter().collect::<Vec<_>>());
    Ok(ColumnSet::from_raw_headers(headers.iter()))
}
