//! Record encoding and decoding.
//!
//! A record is one line of eight comma separated fields:
//! `type,size,mode,uid,gid,mtime,payload,relpath`. Mode is octal, mtime is
//! hexadecimal whole seconds and the two last fields use extended escaping.

use std::path::Path;

use dirscan_core::{Entry, EntryType, RecordError, RecordFields};

use crate::error::{DataError, ScanfileError};
use crate::quote::{bytes_to_os, os_to_bytes, quote, unquote};

const FIELD_COUNT: usize = 8;

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: RecordFields,
    /// Path relative to the scanfile root, unescaped.
    pub relpath: Vec<u8>,
}

impl Record {
    /// Decode one record line, without its line terminator.
    pub fn parse(line: &[u8]) -> Result<Self, DataError> {
        let raw: Vec<&[u8]> = line.split(|&b| b == b',').collect();
        if raw.len() != FIELD_COUNT {
            return Err(DataError::FieldCount(raw.len()));
        }
        let args = raw
            .iter()
            .map(|field| unquote(field, true))
            .collect::<Result<Vec<_>, _>>()?;

        let type_field = String::from_utf8_lossy(&args[0]);
        if type_field.is_empty() {
            return Err(DataError::MissingType);
        }
        let mut letters = type_field.chars();
        let entry_type = match (letters.next(), letters.next()) {
            (Some(code), None) => EntryType::from_code(code),
            _ => None,
        }
        .ok_or_else(|| DataError::UnknownType(type_field.to_string()))?;

        let size = parse_number(&args[1], 10)?;
        let mode = narrow(parse_number(&args[2], 8)?)?;
        let uid = narrow(parse_number(&args[3], 10)?)?;
        let gid = narrow(parse_number(&args[4], 10)?)?;
        let mtime = parse_number(&args[5], 16)? as f64;

        let mut args = args.into_iter();
        let payload = args.nth(6).unwrap_or_default();
        let relpath = args.next().unwrap_or_default();
        if relpath.is_empty() {
            return Err(DataError::MissingPath);
        }

        Ok(Self {
            fields: RecordFields {
                entry_type,
                size,
                mode,
                uid,
                gid,
                mtime,
                payload: bytes_to_os(payload),
            },
            relpath,
        })
    }
}

/// Encode `entry` as a record line, without the line terminator.
///
/// `relpath` is the walker's relative path: `.` for the root, `a/b` below it.
/// Hashes are written for non-empty files only.
pub fn format_record(entry: &Entry, relpath: &Path) -> Result<String, ScanfileError> {
    let entry_type = entry.entry_type();
    if entry_type == EntryType::Missing {
        return Err(RecordError::NotStorable { entry_type }.into());
    }

    let payload = match entry_type {
        EntryType::File if entry.size() > 0 => entry
            .content_hash()?
            .map(|hash| hash.to_hex().into_bytes())
            .unwrap_or_default(),
        EntryType::Symlink => entry.link_target().map(os_to_bytes).unwrap_or_default(),
        _ => Vec::new(),
    };

    Ok(format!(
        "{},{},{:o},{},{},{:x},{},{}",
        entry_type.code(),
        entry.size(),
        entry.mode(),
        entry.uid(),
        entry.gid(),
        entry.mtime() as u64,
        quote(&payload, true),
        quote(&scanfile_relpath(relpath), true),
    ))
}

/// Relative path as stored in a scanfile: `.` or `./a/b`.
pub fn scanfile_relpath(relpath: &Path) -> Vec<u8> {
    let bytes = os_to_bytes(relpath.as_os_str());
    if bytes.is_empty() || bytes == b"." {
        return b".".to_vec();
    }
    if bytes.starts_with(b"./") {
        return bytes;
    }
    let mut out = b"./".to_vec();
    out.extend_from_slice(&bytes);
    out
}

fn parse_number(field: &[u8], radix: u32) -> Result<u64, DataError> {
    let text = String::from_utf8_lossy(field);
    if text.is_empty() {
        return Ok(0);
    }
    if let Some(rest) = text.strip_prefix('-') {
        if u64::from_str_radix(rest, radix).is_ok() {
            return Err(DataError::Field("Number must be positive".to_string()));
        }
    }
    u64::from_str_radix(&text, radix)
        .map_err(|_| DataError::Field(format!("invalid number '{text}' for radix {radix}")))
}

fn narrow(value: u64) -> Result<u32, DataError> {
    u32::try_from(value).map_err(|_| DataError::Field(format!("value {value} out of range")))
}
