use anyhow::{ensure, Result};
use bitvec::{order::Lsb0, vec::BitVec};
use log::debug;

use crate::disk_format::{
    sector::{SectorNumber, SECTOR_SIZE},
    volume_header::free_map_sectors,
};
use crate::storage::SectorStorage;

/// Tracks which sectors of a disk are in use.
///
/// Implementations must make each operation atomic with respect to the others; callers never
/// lock the map themselves.
pub trait FreeSpaceMap {
    /// The number of sectors not currently in use.
    fn count_free(&self) -> usize;

    /// Marks the lowest-numbered free sector as used and returns it, or returns `None` if every
    /// sector is in use.
    fn find_and_claim(&mut self) -> Option<SectorNumber>;

    /// Marks a sector as free.
    fn clear(&mut self, sector: SectorNumber);

    /// Whether a sector is in use.
    fn test(&self, sector: SectorNumber) -> bool;
}

/// A [`FreeSpaceMap`] with one bit per sector.
/// A value of `true` represents "used".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorBitmap {
    bits: BitVec<u8, Lsb0>,
}

impl SectorBitmap {
    /// Constructs a map of `num_sectors` free sectors.
    #[must_use]
    pub fn new(num_sectors: usize) -> Self {
        let mut bits = BitVec::new();
        bits.resize(num_sectors, false);

        Self { bits }
    }

    /// Marks a specific sector as used.
    pub fn mark(&mut self, sector: SectorNumber) {
        self.bits.set(sector, true);
    }

    /// The sectors currently in use, in ascending order.
    pub fn used_sectors(&self) -> Vec<SectorNumber> {
        self.bits.iter_ones().collect()
    }

    /// Loads a map of `num_sectors` bits persisted at `first_sector` onwards.
    pub fn fetch_from<S: SectorStorage>(
        storage: &S,
        first_sector: SectorNumber,
        num_sectors: usize,
    ) -> Result<Self> {
        let mut bytes = Vec::with_capacity(free_map_sectors(num_sectors) * SECTOR_SIZE);
        for s in 0..free_map_sectors(num_sectors) {
            bytes.extend_from_slice(&storage.read_sector(first_sector + s)?);
        }

        let mut bits: BitVec<u8, Lsb0> = BitVec::from_vec(bytes);
        ensure!(bits.len() >= num_sectors, "free map is truncated");
        bits.truncate(num_sectors);

        debug!(
            "loaded free map: {} of {num_sectors} sectors free",
            bits.count_zeros()
        );

        Ok(Self { bits })
    }

    /// Persists the map at `first_sector` onwards.
    pub fn write_back<S: SectorStorage>(
        &self,
        storage: &S,
        first_sector: SectorNumber,
    ) -> Result<()> {
        let raw = self.bits.as_raw_slice();

        for (s, chunk) in raw.chunks(SECTOR_SIZE).enumerate() {
            // bits past the end of the map are persisted as zero
            let mut sector = [0; SECTOR_SIZE];
            sector[..chunk.len()].copy_from_slice(chunk);

            if s == raw.len().div_ceil(SECTOR_SIZE) - 1 {
                let tail_bits = self.bits.len() % 8;
                if tail_bits != 0 {
                    sector[chunk.len() - 1] &= (1u8 << tail_bits) - 1;
                }
            }

            storage.write_sector(first_sector + s, &sector)?;
        }

        Ok(())
    }
}

impl FreeSpaceMap for SectorBitmap {
    fn count_free(&self) -> usize {
        self.bits.count_zeros()
    }

    fn find_and_claim(&mut self) -> Option<SectorNumber> {
        let claimed = self.bits.first_zero();

        if let Some(sector) = claimed {
            self.bits.set(sector, true);
        }

        claimed
    }

    fn clear(&mut self, sector: SectorNumber) {
        self.bits.set(sector, false);
    }

    fn test(&self, sector: SectorNumber) -> bool {
        self.bits[sector]
    }
}
