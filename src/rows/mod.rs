//! Per-table row buffers.

use std::collections::BTreeMap;

use crate::encode::{PGCOPY_SIGNATURE, PGCOPY_TRAILER};

/// Encoded rows of one table, stored back to back in a single buffer.
///
/// `offsets` holds `len() + 1` entries so row `i` spans
/// `offsets[i]..offsets[i + 1]`. In binary mode the buffer starts with the
/// COPY signature and, after [`finish`](Self::finish), ends with the trailer.
#[derive(Clone, Debug)]
pub struct CsvRows {
    binary: bool,
    data: Vec<u8>,
    offsets: Vec<usize>,
    finished: bool,
}

impl CsvRows {
    pub fn new(binary: bool) -> Self {
        let mut data = Vec::new();
        if binary {
            data.extend_from_slice(PGCOPY_SIGNATURE);
        }
        let offsets = vec![data.len()];
        Self {
            binary,
            data,
            offsets,
            finished: false,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn add(&mut self, row: &[u8]) {
        self.data.extend_from_slice(row);
        self.offsets.push(self.data.len());
    }

    /// Number of rows added so far.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, i: usize) -> Option<&[u8]> {
        let start = *self.offsets.get(i)?;
        let end = *self.offsets.get(i + 1)?;
        Some(&self.data[start..end])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.offsets
            .windows(2)
            .map(|w| &self.data[w[0]..w[1]])
    }

    /// Appends the binary trailer. Calling it again is a no-op.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        if self.binary {
            self.data.extend_from_slice(&PGCOPY_TRAILER);
        }
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The whole stream as sent to the server.
    pub fn data_blob(&self) -> &[u8] {
        &self.data
    }

    /// Total bytes including signature and trailer.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Rows for every table touched by one batch, keyed by table name.
#[derive(Clone, Debug, Default)]
pub struct CsvBlock {
    binary: bool,
    tables: BTreeMap<String, CsvRows>,
}

impl CsvBlock {
    pub fn new(binary: bool) -> Self {
        Self {
            binary,
            tables: BTreeMap::new(),
        }
    }

    /// Rows of `table`, created empty on first use.
    pub fn get(&mut self, table: &str) -> &mut CsvRows {
        let binary = self.binary;
        self.tables
            .entry(table.to_string())
            .or_insert_with(|| CsvRows::new(binary))
    }

    pub fn rows(&self, table: &str) -> Option<&CsvRows> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &CsvRows)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn finish(&mut self) {
        for rows in self.tables.values_mut() {
            rows.finish();
        }
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(CsvRows::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
