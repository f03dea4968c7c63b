//! Upload decoding and CSV reader construction.
//!
//! Uploads arrive as raw bytes in an unknown encoding. [`decode_upload`] tries
//! a fixed, ordered list of encodings and falls back to lossy UTF-8, so it
//! never fails: it only turns bytes into text. Both the header pass and the
//! row pass read from the decoded text through [`open_csv_reader`].

use std::io::{self, Read};

use anyhow::{Result, anyhow};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::{debug, warn};

pub const CSV_DELIMITER: u8 = b',';

/// Strict decode attempts made when the upload carries no byte-order mark.
pub const DEFAULT_DECODE_ORDER: &[&Encoding] = &[UTF_8, WINDOWS_1252];

#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static Encoding,
    pub lossy: bool,
}

pub fn is_dash(path: &std::path::Path) -> bool {
    path == std::path::Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .map(Some)
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(None),
    }
}

/// Decodes upload bytes, preferring a byte-order mark, then `preferred` (or
/// [`DEFAULT_DECODE_ORDER`] when none is given), then lossy UTF-8.
pub fn decode_upload(bytes: &[u8], preferred: Option<&'static Encoding>) -> DecodedText {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        if let Some(text) = decode_strict(&bytes[bom_len..], encoding) {
            debug!("Decoded upload as {} (byte-order mark)", encoding.name());
            return DecodedText {
                text,
                encoding,
                lossy: false,
            };
        }
    }

    let order: Vec<&'static Encoding> = match preferred {
        Some(encoding) => vec![encoding],
        None => DEFAULT_DECODE_ORDER.to_vec(),
    };
    for encoding in order {
        if let Some(text) = decode_strict(bytes, encoding) {
            debug!("Decoded upload as {}", encoding.name());
            return DecodedText {
                text,
                encoding,
                lossy: false,
            };
        }
    }

    warn!("Upload is not valid in any candidate encoding; decoding lossily as UTF-8");
    DecodedText {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: UTF_8,
        lossy: true,
    }
}

fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

pub fn open_csv_reader<R>(reader: R, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(CSV_DELIMITER)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_text_reader(text: &str) -> csv::Reader<io::Cursor<&[u8]>> {
    open_csv_reader(io::Cursor::new(text.as_bytes()), true)
}

pub fn read_input(path: &std::path::Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if is_dash(path) {
        io::stdin().lock().read_to_end(&mut buffer)?;
    } else {
        buffer = std::fs::read(path)?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_is_tried_first() {
        let decoded = decode_upload("id,name\n1,Zoë\n".as_bytes(), None);
        assert_eq!(decoded.encoding, UTF_8);
        assert!(!decoded.lossy);
        assert!(decoded.text.contains("Zoë"));
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"#Passengers,Month\n");
        let decoded = decode_upload(&bytes, None);
        assert!(decoded.text.starts_with("#Passengers"));
    }

    #[test]
    fn utf16_bom_is_honored() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "a,b\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode_upload(&bytes, None);
        assert_eq!(decoded.text, "a,b\n");
        assert_eq!(decoded.encoding.name(), "UTF-16LE");
    }

    #[test]
    fn windows_1252_follows_utf8() {
        let (encoded, _, _) = WINDOWS_1252.encode("name\nCaf\u{e9}\n");
        let decoded = decode_upload(&encoded, None);
        assert_eq!(decoded.encoding, WINDOWS_1252);
        assert!(decoded.text.contains("Café"));
    }

    #[test]
    fn explicit_encoding_falls_back_to_lossy_utf8() {
        let decoded = decode_upload(&[b'a', 0xFF, b'\n'], Some(UTF_8));
        assert!(decoded.lossy);
        assert!(decoded.text.contains('\u{FFFD}'));
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert!(resolve_encoding(Some("klingon")).is_err());
        assert_eq!(resolve_encoding(Some("latin1")).unwrap(), Some(WINDOWS_1252));
        assert_eq!(resolve_encoding(None).unwrap(), None);
    }
}
