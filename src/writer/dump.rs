//! Diagnostic dumps of table sets, written when a bulk copy fails.
//!
//! Layout is a tagged length-delimited container: each non-empty table is
//! field 1 of the outer message, holding its name (field 1), row count
//! (field 2, varint) and raw stream bytes (field 3). A set with no rows is
//! the literal `EMPTY`.

use bytes::{Buf, BufMut};
use std::fs;
use std::path::Path;

use crate::error::{LoadError, Result};
use crate::rows::CsvBlock;

pub const EMPTY_MARKER: &[u8] = b"EMPTY";

const WIRE_VARINT: u64 = 0;
const WIRE_LEN: u64 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpedTable {
    pub name: String,
    pub row_count: u64,
    pub data: Vec<u8>,
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.put_u8((v as u8) | 0x80);
        v >>= 7;
    }
    out.put_u8(v as u8);
}

fn put_len_field(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    put_varint(out, (field << 3) | WIRE_LEN);
    put_varint(out, bytes.len() as u64);
    out.put_slice(bytes);
}

fn get_varint(buf: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        if !buf.has_remaining() {
            return Err(LoadError::encode("truncated varint in dump"));
        }
        let b = buf.get_u8();
        value |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(LoadError::encode("varint too long in dump"))
}

fn get_bytes<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = get_varint(buf)? as usize;
    if buf.len() < len {
        return Err(LoadError::encode("truncated field in dump"));
    }
    let whole: &'a [u8] = *buf;
    let (head, tail) = whole.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Serializes a table set; `None` and sets without rows become `EMPTY`.
pub fn pack_dump(block: Option<&CsvBlock>) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(block) = block {
        for (name, rows) in block.tables().filter(|(_, rows)| !rows.is_empty()) {
            let mut record = Vec::with_capacity(rows.size() + name.len() + 16);
            put_len_field(&mut record, 1, name.as_bytes());
            put_varint(&mut record, (2 << 3) | WIRE_VARINT);
            put_varint(&mut record, rows.len() as u64);
            put_len_field(&mut record, 3, rows.data_blob());
            put_len_field(&mut out, 1, &record);
        }
    }
    if out.is_empty() {
        return EMPTY_MARKER.to_vec();
    }
    out
}

pub fn unpack_dump(data: &[u8]) -> Result<Vec<DumpedTable>> {
    if data == EMPTY_MARKER {
        return Ok(Vec::new());
    }

    let mut tables = Vec::new();
    let mut buf = data;
    while buf.has_remaining() {
        let key = get_varint(&mut buf)?;
        if key != (1 << 3) | WIRE_LEN {
            return Err(LoadError::encode(format!("unexpected dump key {key}")));
        }
        tables.push(unpack_table(get_bytes(&mut buf)?)?);
    }
    Ok(tables)
}

fn unpack_table(mut buf: &[u8]) -> Result<DumpedTable> {
    let mut name = None;
    let mut row_count = 0;
    let mut data = Vec::new();
    while buf.has_remaining() {
        let key = get_varint(&mut buf)?;
        match (key >> 3, key & 7) {
            (1, WIRE_LEN) => {
                let raw = get_bytes(&mut buf)?;
                name = Some(
                    String::from_utf8(raw.to_vec())
                        .map_err(|e| LoadError::encode(format!("table name: {e}")))?,
                );
            }
            (2, WIRE_VARINT) => row_count = get_varint(&mut buf)?,
            (3, WIRE_LEN) => data = get_bytes(&mut buf)?.to_vec(),
            (field, wire) => {
                return Err(LoadError::encode(format!(
                    "unexpected field {field} (wire type {wire}) in dump"
                )));
            }
        }
    }
    let name = name.ok_or_else(|| LoadError::encode("dump record without table name"))?;
    Ok(DumpedTable {
        name,
        row_count,
        data,
    })
}

pub fn write_dump(path: &Path, block: Option<&CsvBlock>) -> Result<()> {
    fs::write(path, pack_dump(block))?;
    Ok(())
}

pub fn read_dump(path: &Path) -> Result<Vec<DumpedTable>> {
    let data = fs::read(path)?;
    unpack_dump(&data)
}
