use std::mem::size_of;

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

use super::sector::{Sector, NO_SECTOR, SECTOR_SIZE};

const_assert!(SECTOR_SIZE % 4 == 0);
/// The number of direct sector entries in one extent record. Chosen so that the record fills
/// exactly one sector.
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 3 * size_of::<i32>()) / size_of::<i32>();

/// The maximum number of content bytes a single extent record can describe.
pub const MAX_FILE_SIZE: usize = NUM_DIRECT * SECTOR_SIZE;

/// The number of bytes occupied by an extent record.
pub const EXTENT_RECORD_SIZE: usize = size_of::<ExtentRecord>();
const_assert!(EXTENT_RECORD_SIZE <= SECTOR_SIZE);

/// One link of a file header chain, as stored on the disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct ExtentRecord {
    /// file content bytes described by this record
    pub content_bytes: i32,
    /// number of valid entries in `direct`
    pub sector_count: i32,
    /// sector numbers holding the content, in file order
    pub direct: [i32; NUM_DIRECT],
    /// sector of the next record in the chain, or [`NO_SECTOR`]
    pub continuation: i32,
}

impl ExtentRecord {
    /// Serializes the record into a sector-sized buffer. Bytes past the record are zeroed.
    pub fn to_sector(&self) -> Result<Sector> {
        let mut sector = [0; SECTOR_SIZE];
        let encoded = super::encode(self)?;
        sector[..encoded.len()].copy_from_slice(&encoded);

        Ok(sector)
    }

    /// Parses and validates a record stored at the start of `sector`.
    pub fn from_sector(sector: &Sector) -> Result<Self> {
        let record: ExtentRecord = super::decode(sector, EXTENT_RECORD_SIZE)?;
        record.validate()?;

        Ok(record)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            (0..=MAX_FILE_SIZE as i32).contains(&self.content_bytes),
            "invalid content size in extent record: {}",
            self.content_bytes
        );

        let expected_sectors = (self.content_bytes as usize).div_ceil(SECTOR_SIZE);
        ensure!(
            self.sector_count as usize == expected_sectors && self.sector_count >= 0,
            "extent record has {} sectors but needs {expected_sectors} to store {} bytes",
            self.sector_count,
            self.content_bytes
        );

        if let Some(sector) = self.direct[..expected_sectors].iter().find(|s| **s < 0) {
            bail!("invalid direct sector number in extent record: {sector}");
        }

        ensure!(
            self.continuation >= NO_SECTOR,
            "invalid continuation sector number: {}",
            self.continuation
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fills_one_sector() {
        assert_eq!(NUM_DIRECT, 29);
        assert_eq!(MAX_FILE_SIZE, 3712);
        assert_eq!(EXTENT_RECORD_SIZE, SECTOR_SIZE);
    }

    #[test]
    fn test_field_layout() {
        let mut direct = [NO_SECTOR; NUM_DIRECT];
        direct[0] = 7;
        direct[1] = 0x0102_0304;

        let record = ExtentRecord {
            content_bytes: 200,
            sector_count: 2,
            direct,
            continuation: NO_SECTOR,
        };
        let sector = record.to_sector().unwrap();

        assert_eq!(sector[0..4], 200i32.to_le_bytes());
        assert_eq!(sector[4..8], 2i32.to_le_bytes());
        assert_eq!(sector[8..12], 7i32.to_le_bytes());
        assert_eq!(sector[12..16], [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(sector[16..20], NO_SECTOR.to_le_bytes());
        assert_eq!(sector[SECTOR_SIZE - 4..], NO_SECTOR.to_le_bytes());

        assert_eq!(ExtentRecord::from_sector(&sector).unwrap(), record);
    }

    #[test]
    fn test_reject_sector_count_mismatch() {
        let record = ExtentRecord {
            content_bytes: 129,
            sector_count: 1,
            direct: [3; NUM_DIRECT],
            continuation: NO_SECTOR,
        };
        let sector = record.to_sector().unwrap();

        assert!(ExtentRecord::from_sector(&sector).is_err());
    }

    #[test]
    fn test_reject_oversized_content() {
        let record = ExtentRecord {
            content_bytes: MAX_FILE_SIZE as i32 + 1,
            sector_count: NUM_DIRECT as i32 + 1,
            direct: [3; NUM_DIRECT],
            continuation: NO_SECTOR,
        };
        let sector = record.to_sector().unwrap();

        assert!(ExtentRecord::from_sector(&sector).is_err());
    }

    #[test]
    fn test_reject_negative_direct_sector() {
        let mut direct = [4; NUM_DIRECT];
        direct[1] = NO_SECTOR;

        let record = ExtentRecord {
            content_bytes: 256,
            sector_count: 2,
            direct,
            continuation: NO_SECTOR,
        };
        let sector = record.to_sector().unwrap();

        assert!(ExtentRecord::from_sector(&sector).is_err());
    }

    #[test]
    fn test_reject_bad_continuation() {
        let record = ExtentRecord {
            content_bytes: 0,
            sector_count: 0,
            direct: [NO_SECTOR; NUM_DIRECT],
            continuation: -2,
        };
        let sector = record.to_sector().unwrap();

        assert!(ExtentRecord::from_sector(&sector).is_err());
    }
}
