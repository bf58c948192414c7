//! Bounds-checked little-endian cursor over an in-memory byte slice.
//!
//! Used by both index decoders ([`crate::pak`], [`crate::iostore`]) so that
//! a truncated or malformed container is rejected with a typed error instead
//! of a panic or an out-of-bounds read.
//!
//! # Primitive families
//! Every fixed-width primitive has two forms:
//! - a `read_*` ("must") form that returns `Err` on underflow;
//! - a `try_*` form that returns `Ok(None)` on underflow and, for anything
//!   wider than a byte, restores the cursor position to where it was before
//!   the attempt.
//!
//! Index decoders use only the `try_*` forms — see `DESIGN.md` for why the
//! distinction matters here and not elsewhere in the crate.

use thiserror::Error;

/// Strings longer than this (after the length prefix is read) are rejected
/// without the length itself being consumed, so the caller can still probe
/// other interpretations of the same bytes.
pub const MAX_STRING_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    #[error("unexpected end of data: wanted {wanted} bytes at offset {offset}, had {available}")]
    Underflow {
        offset: usize,
        wanted: usize,
        available: usize,
    },
    #[error("string length {0} exceeds sanity limit of {MAX_STRING_BYTES} bytes")]
    StringTooLong(i64),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("string payload is not valid UTF-16")]
    InvalidUtf16,
}

/// A cursor over a borrowed byte slice. Cheap to construct; does not own
/// the underlying bytes.
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn advance(&mut self, n: usize) -> Result<(), CursorError> {
        self.take(n).map(|_| ())
    }

    /// Borrow the next `n` bytes without copying, advancing the position.
    /// This is the "must" form: fails outright on underflow.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        if self.pos + n > self.data.len() {
            return Err(CursorError::Underflow {
                offset: self.pos,
                wanted: n,
                available: self.data.len().saturating_sub(self.pos),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Same as [`Cursor::take`] but restores the position on failure.
    pub fn try_take(&mut self, n: usize) -> Option<&'a [u8]> {
        let start = self.pos;
        match self.take(n) {
            Ok(slice) => Some(slice),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }
}

macro_rules! primitive_readers {
    ($( $must:ident, $try_:ident -> $ty:ty ),* $(,)?) => {
        impl<'a> Cursor<'a> {
            $(
                pub fn $must(&mut self) -> Result<$ty, CursorError> {
                    const N: usize = std::mem::size_of::<$ty>();
                    let bytes = self.take(N)?;
                    Ok(<$ty>::from_le_bytes(bytes.try_into().unwrap()))
                }

                pub fn $try_(&mut self) -> Option<$ty> {
                    let start = self.pos;
                    match self.$must() {
                        Ok(v) => Some(v),
                        Err(_) => {
                            self.pos = start;
                            None
                        }
                    }
                }
            )*
        }
    };
}

primitive_readers! {
    read_u8,  try_u8  -> u8,
    read_i8,  try_i8  -> i8,
    read_u16, try_u16 -> u16,
    read_i16, try_i16 -> i16,
    read_u32, try_u32 -> u32,
    read_i32, try_i32 -> i32,
    read_u64, try_u64 -> u64,
    read_i64, try_i64 -> i64,
    read_f32, try_f32 -> f32,
    read_f64, try_f64 -> f64,
}

impl<'a> Cursor<'a> {
    /// Read a fixed-size byte array.
    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let slice = self.take(N)?;
        Ok(slice.try_into().unwrap())
    }

    pub fn try_bytes<const N: usize>(&mut self) -> Option<[u8; N]> {
        let start = self.pos;
        match self.read_bytes::<N>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }

    pub fn read_guid(&mut self) -> Result<[u8; 16], CursorError> {
        self.read_bytes::<16>()
    }

    pub fn try_guid(&mut self) -> Option<[u8; 16]> {
        self.try_bytes::<16>()
    }

    /// Length-prefixed string: a 32-bit signed length `L`, then either `L`
    /// bytes of UTF-8 (`L > 0`) or `|L|` UTF-16 code units (`L < 0`), each
    /// terminated by a trailing null that is consumed but not included in
    /// the returned string. `L == 0` yields an empty string and consumes
    /// only the length field.
    pub fn try_fstring(&mut self) -> Option<Result<String, CursorError>> {
        let start = self.pos;
        let len = match self.try_i32() {
            Some(l) => l,
            None => return None,
        };

        if len == 0 {
            return Some(Ok(String::new()));
        }

        if len > 0 {
            let byte_len = len as usize;
            if byte_len > MAX_STRING_BYTES {
                self.pos = start;
                return Some(Err(CursorError::StringTooLong(len as i64)));
            }
            let bytes = match self.try_take(byte_len) {
                Some(b) => b,
                None => {
                    self.pos = start;
                    return None;
                }
            };
            let trimmed = bytes.split(|&b| b == 0).next().unwrap_or(bytes);
            return Some(
                std::str::from_utf8(trimmed)
                    .map(|s| s.to_owned())
                    .map_err(|_| CursorError::InvalidUtf8),
            );
        }

        // L < 0: |L| UTF-16 code units, little-endian, null terminated.
        let units = (-len) as usize;
        let byte_len = units * 2;
        if byte_len > MAX_STRING_BYTES {
            self.pos = start;
            return Some(Err(CursorError::StringTooLong(len as i64)));
        }
        let bytes = match self.try_take(byte_len) {
            Some(b) => b,
            None => {
                self.pos = start;
                return None;
            }
        };
        let code_units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        Some(
            String::from_utf16(&code_units).map_err(|_| CursorError::InvalidUtf16),
        )
    }
}

#[inline]
pub fn align16(n: u64) -> u64 {
    (n + 15) & !15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_roundtrip() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.extend_from_slice(&(-7i16).to_le_bytes());
        let mut c = Cursor::new(&buf);
        assert_eq!(c.read_u32().unwrap(), 42);
        assert_eq!(c.read_i16().unwrap(), -7);
        assert!(c.is_eof());
    }

    #[test]
    fn try_variant_restores_position_on_underflow() {
        let buf = [1u8, 2, 3];
        let mut c = Cursor::new(&buf);
        assert!(c.try_u32().is_none());
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn fstring_empty() {
        let buf = 0i32.to_le_bytes();
        let mut c = Cursor::new(&buf);
        assert_eq!(c.try_fstring().unwrap().unwrap(), "");
    }

    #[test]
    fn fstring_utf8() {
        let mut buf = Vec::new();
        let s = b"hello\0";
        buf.extend_from_slice(&(s.len() as i32).to_le_bytes());
        buf.extend_from_slice(s);
        let mut c = Cursor::new(&buf);
        assert_eq!(c.try_fstring().unwrap().unwrap(), "hello");
    }

    #[test]
    fn fstring_utf16() {
        let mut buf = Vec::new();
        let units: Vec<u16> = "hi".encode_utf16().chain(std::iter::once(0)).collect();
        buf.extend_from_slice(&(-(units.len() as i32)).to_le_bytes());
        for u in &units {
            buf.extend_from_slice(&u.to_le_bytes());
        }
        let mut c = Cursor::new(&buf);
        assert_eq!(c.try_fstring().unwrap().unwrap(), "hi");
    }

    #[test]
    fn align16_rounds_up() {
        assert_eq!(align16(0), 0);
        assert_eq!(align16(1), 16);
        assert_eq!(align16(16), 16);
        assert_eq!(align16(17), 32);
    }
}
