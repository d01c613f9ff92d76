//! Modified UTF-8 as used by `CONSTANT_Utf8` entries.
//!
//! It differs from standard UTF-8 in two ways: NUL is encoded as the two
//! bytes `C0 80`, and characters outside the basic multilingual plane are
//! stored as a surrogate pair of three-byte sequences.

use std::borrow::Cow;
use std::str;

/// Decodes modified UTF-8.
///
/// Returns `None` for malformed input, including unpaired surrogates which
/// Rust strings cannot hold.
pub fn decode(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if !bytes.iter().any(|b| *b == 0 || *b >= 0xF0) {
        if let Ok(s) = str::from_utf8(bytes) {
            return Some(Cow::Borrowed(s));
        }
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(lead) = iter.next() {
        let unit = match lead {
            0x01..=0x7F => lead as u16,
            0xC0..=0xDF => {
                let b = continuation(iter.next())?;
                (lead as u16 & 0x1F) << 6 | b
            }
            0xE0..=0xEF => {
                let b = continuation(iter.next())?;
                let c = continuation(iter.next())?;
                (lead as u16 & 0x0F) << 12 | b << 6 | c
            }
            _ => return None,
        };
        units.push(unit);
    }

    String::from_utf16(&units).ok().map(Cow::Owned)
}

fn continuation(byte: Option<u8>) -> Option<u16> {
    match byte {
        Some(b) if b & 0xC0 == 0x80 => Some((b & 0x3F) as u16),
        _ => None,
    }
}

/// Encodes a string as modified UTF-8.
pub fn encode(s: &str) -> Cow<'_, [u8]> {
    if !s.bytes().any(|b| b == 0 || b >= 0xF0) {
        return Cow::Borrowed(s.as_bytes());
    }

    let mut bytes = Vec::with_capacity(s.len() + 2);
    for ch in s.chars() {
        match ch {
            '\0' => bytes.extend_from_slice(&[0xC0, 0x80]),
            ch if (ch as u32) < 0x1_0000 => {
                let mut buf = [0; 4];
                bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            ch => {
                let mut buf = [0; 2];
                for unit in ch.encode_utf16(&mut buf) {
                    bytes.extend_from_slice(&[
                        0xE0 | (*unit >> 12) as u8,
                        0x80 | (*unit >> 6 & 0x3F) as u8,
                        0x80 | (*unit & 0x3F) as u8,
                    ]);
                }
            }
        }
    }
    Cow::Owned(bytes)
}
