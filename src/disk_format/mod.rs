/// Perform a const assertion.
macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    }
}

/// Extent header records.
pub mod extent;
/// Disk sectors and sector numbers.
pub mod sector;
/// The volume header.
pub mod volume_header;

use anyhow::{Context, Result};
use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

/// The codec shared by every on-disk record: fixed-width little-endian integers, no length
/// prefixes for arrays, nothing trailing the record.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Encodes a record using the on-disk layout.
pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    codec().serialize(record).context("encoding on-disk record")
}

/// Decodes a record of exactly `size` bytes from the start of `bytes`.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], size: usize) -> Result<T> {
    let bytes = bytes
        .get(..size)
        .context("buffer is shorter than the on-disk record")?;

    codec().deserialize(bytes).context("decoding on-disk record")
}
