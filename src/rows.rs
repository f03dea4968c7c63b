//! The full-file row pass that feeds ingestion.
//!
//! [`RowStream`] is lazy: it yields one [`Row`] per data record, aligned with
//! the upload's [`ColumnSet`] order. Fields are trimmed and empty fields become
//! `None`. Records shorter than the header are padded with `None`; surplus
//! fields are dropped. When two headers normalize to the same column, the
//! later field wins.

use std::io::Cursor;

use crate::{columns::ColumnSet, io_utils, naming::normalize_column};

pub type Row = Vec<Option<String>>;
pub type RowResult = Result<Row, csv::Error>;

pub struct RowStream<'a> {
    records: csv::StringRecordsIntoIter<Cursor<&'a [u8]>>,
    targets: Vec<Option<usize>>,
    width: usize,
}

impl<'a> RowStream<'a> {
    pub fn new(text: &'a str, columns: &ColumnSet) -> Result<Self, csv::Error> {
        let mut reader = io_utils::open_text_reader(text);
        let targets = reader
            .headers()?
            .iter()
            .map(|header| columns.position(&normalize_column(header)))
            .collect();
        Ok(Self {
            records: reader.into_records(),
            targets,
            width: columns.len(),
        })
    }
}

impl Iterator for RowStream<'_> {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(err)),
        };
        let mut row: Row = vec![None; self.width];
        for (field, target) in record.iter().zip(&self.targets) {
            if let Some(idx) = target {
                row[*idx] = clean_field(field);
            }
        }
        Some(Ok(row))
    }
}

fn clean_field(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
