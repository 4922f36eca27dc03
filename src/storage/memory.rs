use std::cell::RefCell;

use anyhow::{anyhow, Result};

use crate::disk_format::sector::{Sector, SectorNumber, SECTOR_SIZE};

use super::sector_storage::SectorStorage;

/// An in-memory disk of zero-initialized sectors.
pub struct MemoryDisk {
    sectors: RefCell<Vec<Sector>>,
}

impl MemoryDisk {
    /// Constructs a new [`MemoryDisk`] with `num_sectors` zeroed sectors.
    #[must_use]
    pub fn new(num_sectors: usize) -> Self {
        Self {
            sectors: RefCell::new(vec![[0; SECTOR_SIZE]; num_sectors]),
        }
    }
}

impl SectorStorage for MemoryDisk {
    fn read_sector(&self, sector_number: SectorNumber) -> Result<Sector> {
        self.sectors
            .borrow()
            .get(sector_number)
            .copied()
            .ok_or(anyhow!("sector number out of bounds: {sector_number}"))
    }

    fn write_sector(&self, sector_number: SectorNumber, sector: &Sector) -> Result<()> {
        let mut sectors = self.sectors.borrow_mut();
        let slot = sectors
            .get_mut(sector_number)
            .ok_or(anyhow!("sector number out of bounds: {sector_number}"))?;

        *slot = *sector;

        Ok(())
    }

    fn num_sectors(&self) -> usize {
        self.sectors.borrow().len()
    }
}
