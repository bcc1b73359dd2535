//! Low-level byte primitives shared by all parsers and serializers.
//!
//! Each reader reads exactly the bytes it promises or returns an error -
//! there is no partial-read ambiguity. A short stream surfaces as
//! [`Error::UnexpectedEof`] rather than a bare I/O error.

use std::io::{self, Read};

use crate::{Error, Result};

#[inline]
fn fill<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
        _ => Error::Io(e),
    })
}

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    fill(r, &mut b)?;
    Ok(b[0])
}

/// Read a little-endian `u16`.
#[inline]
pub(crate) fn le_u16<R: Read>(r: &mut R) -> Result<u16> {
    Ok(u16::from_le_bytes(bytesa(r)?))
}

/// Read a little-endian `u32`.
#[inline]
pub(crate) fn le_u32<R: Read>(r: &mut R) -> Result<u32> {
    Ok(u32::from_le_bytes(bytesa(r)?))
}

/// Read a little-endian `u64`.
#[inline]
pub(crate) fn le_u64<R: Read>(r: &mut R) -> Result<u64> {
    Ok(u64::from_le_bytes(bytesa(r)?))
}

/// Read a little-endian 48-bit unsigned integer (CNMT content sizes).
#[inline]
pub(crate) fn le_u48<R: Read>(r: &mut R) -> Result<u64> {
    let b = bytesa::<6>(r)?;
    let mut wide = [0u8; 8];
    wide[..6].copy_from_slice(&b);
    Ok(u64::from_le_bytes(wide))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    fill(r, &mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
///
/// The buffer grows with the data actually read, so a bogus length from a
/// header costs nothing beyond the stream itself.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut b)?;
    if b.len() != len {
        return Err(Error::UnexpectedEof);
    }
    Ok(b)
}

/// Verify that the next `N` bytes in the stream match `expected`.
///
/// Returns [`Error::BadMagic`] on mismatch.
#[inline]
pub(crate) fn magic<R: Read, const N: usize>(r: &mut R, expected: &[u8; N]) -> Result<()> {
    let got = bytesa::<N>(r)?;
    if &got != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Extract a null-terminated UTF-8 string from a byte slice at `offset`.
///
/// Returns [`Error::InvalidRange`] if `offset` is out of bounds, or
/// [`Error::UnterminatedName`] if no null byte is found.
#[inline]
pub(crate) fn null_string(buf: &[u8], offset: usize) -> Result<String> {
    let slice = buf.get(offset..).ok_or(Error::InvalidRange)?;
    let end = slice
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnterminatedName)?;
    Ok(String::from_utf8_lossy(&slice[..end]).into_owned())
}

/// Append a little-endian 48-bit integer. The top 16 bits of `v` are dropped.
#[inline]
pub(crate) fn put_le_u48(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes()[..6]);
}
