//! Reversible text escaping.
//!
//! Control characters become `\xNN` and the backslash becomes `\\`. The
//! extended variant used inside scanfile records also turns `,` into `\-`
//! and space into `\ `, so a field never contains the record delimiter.
//! Bytes that are not valid UTF-8 are written as `\xNN` and decode back to
//! the same raw byte.

use std::ffi::{OsStr, OsString};
use std::fmt::Write;

use crate::error::QuoteError;

/// Escape `data` for printing or for a scanfile field.
pub fn quote(data: &[u8], extended: bool) -> String {
    let mut out = String::with_capacity(data.len());
    for chunk in data.utf8_chunks() {
        for ch in chunk.valid().chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                c if (c as u32) < 32 || c as u32 == 127 => {
                    let _ = write!(out, "\\x{:02x}", c as u32);
                }
                ',' if extended => out.push_str("\\-"),
                ' ' if extended => out.push_str("\\ "),
                c => out.push(c),
            }
        }
        for byte in chunk.invalid() {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    out
}

/// Reverse [`quote`].
pub fn unquote(text: &[u8], extended: bool) -> Result<Vec<u8>, QuoteError> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.iter().copied();
    let incomplete = || QuoteError::Incomplete(String::from_utf8_lossy(text).into_owned());

    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        let escape = bytes.next().ok_or_else(incomplete)?;
        let width = match escape {
            b'\\' => {
                out.push(b'\\');
                continue;
            }
            b'n' => {
                out.push(b'\n');
                continue;
            }
            b'r' => {
                out.push(b'\r');
                continue;
            }
            b't' => {
                out.push(b'\t');
                continue;
            }
            b'\'' | b'"' => {
                out.push(escape);
                continue;
            }
            b'-' if extended => {
                out.push(b',');
                continue;
            }
            b' ' if extended => {
                out.push(b' ');
                continue;
            }
            b'x' => 2,
            b'u' => 4,
            b'U' => 8,
            other => return Err(QuoteError::UnknownEscape(char::from(other))),
        };

        let digits: Vec<u8> = bytes.by_ref().take(width).collect();
        if digits.len() < width {
            return Err(incomplete());
        }
        let digits = String::from_utf8_lossy(&digits);
        let value = u32::from_str_radix(&digits, 16)
            .map_err(|_| QuoteError::InvalidValue(digits.to_string()))?;

        if escape == b'x' {
            // Two hex digits always fit a byte; high values are raw bytes
            out.push(value as u8);
        } else {
            let ch = char::from_u32(value)
                .ok_or_else(|| QuoteError::InvalidValue(digits.to_string()))?;
            let mut buf = [0u8; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    Ok(out)
}

/// Raw bytes of a platform string.
#[cfg(unix)]
pub fn os_to_bytes(text: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    text.as_bytes().to_vec()
}

#[cfg(not(unix))]
pub fn os_to_bytes(text: &OsStr) -> Vec<u8> {
    text.to_string_lossy().into_owned().into_bytes()
}

/// Platform string from raw bytes.
#[cfg(unix)]
pub fn bytes_to_os(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
pub fn bytes_to_os(bytes: Vec<u8>) -> OsString {
    String::from_utf8_lossy(&bytes).into_owned().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote(b"hello", false), "hello");
        assert_eq!(quote(b"a\\b", false), "a\\\\b");
        assert_eq!(quote(b"tab\there", false), "tab\\x09here");
        assert_eq!(quote(b"\x7f", false), "\\x7f");
    }

    #[test]
    fn test_quote_extended() {
        assert_eq!(quote(b"a,b c", true), "a\\-b\\ c");
        assert_eq!(quote(b"a,b c", false), "a,b c");
    }

    #[test]
    fn test_quote_non_utf8() {
        assert_eq!(quote(b"caf\xe9", true), "caf\\xe9");
        assert_eq!(quote("café".as_bytes(), true), "café");
    }

    #[test]
    fn test_unquote_escapes() {
        assert_eq!(unquote(b"a\\nb\\tc", false).unwrap(), b"a\nb\tc");
        assert_eq!(unquote(b"\\'\\\"", false).unwrap(), b"'\"");
        assert_eq!(unquote(b"\\xe9", false).unwrap(), vec![0xe9]);
        assert_eq!(unquote(b"\\u00e9", false).unwrap(), "é".as_bytes());
        assert_eq!(unquote(b"\\U0001f600", false).unwrap(), "😀".as_bytes());
        assert_eq!(unquote(b"a\\-b\\ c", true).unwrap(), b"a,b c");
    }

    #[test]
    fn test_unquote_errors() {
        assert_eq!(
            unquote(b"abc\\", false),
            Err(QuoteError::Incomplete("abc\\".to_string()))
        );
        assert!(matches!(
            unquote(b"\\x4", false),
            Err(QuoteError::Incomplete(_))
        ));
        assert_eq!(unquote(b"\\q", false), Err(QuoteError::UnknownEscape('q')));
        assert_eq!(unquote(b"\\-", false), Err(QuoteError::UnknownEscape('-')));
        assert!(matches!(
            unquote(b"\\xzz", false),
            Err(QuoteError::InvalidValue(_))
        ));
        assert!(matches!(
            unquote(b"\\ud800", false),
            Err(QuoteError::InvalidValue(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_unquote_reverses_quote(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(unquote(quote(&data, true).as_bytes(), true).unwrap(), data.clone());
            prop_assert_eq!(unquote(quote(&data, false).as_bytes(), false).unwrap(), data);
        }

        #[test]
        fn prop_extended_quote_has_no_delimiters(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let quoted = quote(&data, true);
            prop_assert_eq!(quoted.split(',').count(), 1);
            // Spaces only appear as the `\ ` escape
            let mut chars = quoted.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    prop_assert!(chars.next().is_some());
                    continue;
                }
                prop_assert!(c > ' ' && c != '\x7f', "raw {:?} in {:?}", c, quoted);
            }
        }
    }
}
