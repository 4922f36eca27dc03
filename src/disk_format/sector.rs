use std::mem::size_of;

/// size of a disk sector in bytes
pub const SECTOR_SIZE: usize = 128;

pub type Sector = [u8; SECTOR_SIZE];
const_assert!(size_of::<Sector>() == SECTOR_SIZE);

// sector numbers are represented as `i32`s on the disk, but we use `usize`s to avoid littering
// the code with casts.
pub type SectorNumber = usize;

/// The on-disk value meaning "no such sector".
pub const NO_SECTOR: i32 = -1;

/// Converts an in-memory sector number to its on-disk representation.
pub(crate) fn to_disk(sector: Option<SectorNumber>) -> i32 {
    // sector counts are bounded by `i32::MAX` when a volume is formatted or opened
    sector.map_or(NO_SECTOR, |s| s as i32)
}

/// Converts an on-disk sector number to its in-memory representation. Returns `None` for the
/// sentinel and for any other negative value.
pub(crate) fn from_disk(sector: i32) -> Option<SectorNumber> {
    usize::try_from(sector).ok()
}
