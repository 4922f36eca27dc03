use std::fs::File;
use std::os::unix::prelude::FileExt;

use anyhow::{ensure, Context, Result};

use crate::disk_format::sector::{Sector, SectorNumber, SECTOR_SIZE};

use super::sector_storage::SectorStorage;

/// A disk image file. Trailing bytes that do not make up a whole sector are ignored.
pub struct FileBackedStorage {
    file: File,
    num_sectors: usize,
}

impl FileBackedStorage {
    pub fn new(file: File) -> Result<Self> {
        let len = file.metadata().context("reading disk file metadata")?.len();

        Ok(FileBackedStorage {
            file,
            num_sectors: len as usize / SECTOR_SIZE,
        })
    }

    /// Creates (or truncates) a zero-filled disk image of `num_sectors` sectors.
    pub fn create(file: File, num_sectors: usize) -> Result<Self> {
        file.set_len((num_sectors * SECTOR_SIZE) as u64)
            .context("resizing disk file")?;

        Ok(FileBackedStorage { file, num_sectors })
    }

    fn position(&self, sector_number: SectorNumber) -> Result<u64> {
        ensure!(
            sector_number < self.num_sectors,
            "sector number out of bounds: {sector_number}"
        );

        Ok((sector_number * SECTOR_SIZE) as u64)
    }
}

impl SectorStorage for FileBackedStorage {
    fn read_sector(&self, sector_number: SectorNumber) -> Result<Sector> {
        let mut buf = [0; SECTOR_SIZE];
        let position = self.position(sector_number)?;

        self.file
            .read_exact_at(&mut buf, position)
            .with_context(|| format!("reading sector {sector_number}"))?;

        Ok(buf)
    }

    fn write_sector(&self, sector_number: SectorNumber, sector: &Sector) -> Result<()> {
        let position = self.position(sector_number)?;

        self.file
            .write_all_at(sector, position)
            .with_context(|| format!("writing sector {sector_number}"))?;

        Ok(())
    }

    fn num_sectors(&self) -> usize {
        self.num_sectors
    }
}
