use anyhow::Result;

use crate::disk_format::sector::{Sector, SectorNumber};

/// Blocking, sector-granular access to a disk.
pub trait SectorStorage {
    fn read_sector(&self, sector_number: SectorNumber) -> Result<Sector>;

    fn write_sector(&self, sector_number: SectorNumber, sector: &Sector) -> Result<()>;

    /// The number of addressable sectors.
    fn num_sectors(&self) -> usize;
}
