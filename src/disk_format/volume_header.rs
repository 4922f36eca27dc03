use std::mem::size_of;

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

use super::sector::{Sector, SectorNumber, SECTOR_SIZE};

/// The sector that holds the volume header.
pub const VOLUME_HEADER_SECTOR: SectorNumber = 0;

/// The first sector of the persisted free-space map.
pub const FREE_MAP_START_SECTOR: SectorNumber = VOLUME_HEADER_SECTOR + 1;

/// Identifies a formatted volume.
pub const VOLUME_MAGIC: u32 = 0x4348_4653;

/// The number of bytes occupied by the volume header.
pub const VOLUME_HEADER_SIZE: usize = size_of::<VolumeHeader>();
const_assert!(VOLUME_HEADER_SIZE <= SECTOR_SIZE);

/// The volume header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct VolumeHeader {
    /// Always [`VOLUME_MAGIC`].
    pub magic: u32,
    /// The number of sectors in the underlying disk.
    pub num_sectors: i32,
    /// The number of sectors occupied by the free-space map, starting at
    /// [`FREE_MAP_START_SECTOR`].
    pub free_map_sectors: i32,
}

impl VolumeHeader {
    /// Constructs the header for a disk of `num_sectors` sectors.
    pub fn new(num_sectors: usize) -> Result<Self> {
        ensure!(
            num_sectors <= i32::MAX as usize,
            "disk is too large: {num_sectors} sectors"
        );

        let free_map_sectors = free_map_sectors(num_sectors);
        ensure!(
            FREE_MAP_START_SECTOR + free_map_sectors < num_sectors,
            "disk is too small: {num_sectors} sectors"
        );

        Ok(Self {
            magic: VOLUME_MAGIC,
            num_sectors: num_sectors as i32,
            free_map_sectors: free_map_sectors as i32,
        })
    }

    /// The number of sectors at the start of the disk that hold volume metadata.
    pub fn reserved_sectors(&self) -> usize {
        FREE_MAP_START_SECTOR + self.free_map_sectors as usize
    }

    pub fn to_sector(&self) -> Result<Sector> {
        let mut sector = [0; SECTOR_SIZE];
        let encoded = super::encode(self)?;
        sector[..encoded.len()].copy_from_slice(&encoded);

        Ok(sector)
    }

    pub fn from_sector(sector: &Sector) -> Result<Self> {
        let header: VolumeHeader = super::decode(sector, VOLUME_HEADER_SIZE)?;

        ensure!(
            header.magic == VOLUME_MAGIC,
            "not a formatted volume (magic {:#x})",
            header.magic
        );

        if header.num_sectors < 2 {
            // we need at least the volume header and one free map sector
            bail!("invalid number of sectors: {}", header.num_sectors);
        }

        ensure!(
            header.free_map_sectors as usize == free_map_sectors(header.num_sectors as usize),
            "free map of {} sectors cannot describe {} sectors",
            header.free_map_sectors,
            header.num_sectors
        );

        Ok(header)
    }
}

/// The number of sectors needed to store one bit per sector of the disk.
pub fn free_map_sectors(num_sectors: usize) -> usize {
    num_sectors.div_ceil(8).div_ceil(SECTOR_SIZE)
}
