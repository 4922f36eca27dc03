use anyhow::{Context, Result};
use log::info;

use crate::{
    disk_format::sector::{SectorNumber, SECTOR_SIZE},
    file_header::FileHeader,
    storage::SectorStorage,
};

/// An open file: a loaded [`FileHeader`] and a seek position.
///
/// Files have the size they were created with. Reads and writes past the end are cut short.
pub struct OpenFile {
    header: FileHeader,
    position: usize,
}

impl OpenFile {
    pub fn new(header: FileHeader) -> Self {
        Self {
            header,
            position: 0,
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn length(&self) -> usize {
        self.header.file_length()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Reads up to `size` bytes starting at `offset`.
    pub fn read_at<S: SectorStorage>(
        &self,
        storage: &S,
        offset: usize,
        size: usize,
    ) -> Result<Vec<u8>> {
        let end = offset.saturating_add(size).min(self.length());

        let mut data = vec![];
        let mut position = offset;
        while position < end {
            let start_offset = position % SECTOR_SIZE;
            let sector_start = position - start_offset;
            let end_position = (sector_start + SECTOR_SIZE).min(end);

            let sector = storage.read_sector(self.sector_at(position)?)?;
            data.extend_from_slice(&sector[start_offset..end_position - sector_start]);

            position = end_position;
        }

        Ok(data)
    }

    /// Writes as much of `data` as fits before the end of the file, starting at `offset`.
    /// Returns the number of bytes written.
    pub fn write_at<S: SectorStorage>(
        &self,
        storage: &S,
        offset: usize,
        data: &[u8],
    ) -> Result<usize> {
        let end = offset.saturating_add(data.len()).min(self.length());

        let mut position = offset;
        while position < end {
            let start_offset = position % SECTOR_SIZE;
            let sector_start = position - start_offset;
            let end_position = (sector_start + SECTOR_SIZE).min(end);

            let sector_number = self.sector_at(position)?;
            let mut sector = if end_position - position == SECTOR_SIZE {
                [0; SECTOR_SIZE]
            } else {
                storage.read_sector(sector_number)?
            };

            sector[start_offset..end_position - sector_start]
                .copy_from_slice(&data[(position - offset)..(end_position - offset)]);
            storage.write_sector(sector_number, &sector)?;

            position = end_position;
        }

        let written = end.saturating_sub(offset);
        info!("wrote {written} bytes at offset {offset}");

        Ok(written)
    }

    /// Reads up to `size` bytes at the current position and advances past them.
    pub fn read<S: SectorStorage>(&mut self, storage: &S, size: usize) -> Result<Vec<u8>> {
        let data = self.read_at(storage, self.position, size)?;
        self.position += data.len();

        Ok(data)
    }

    /// Writes at the current position and advances past the written bytes.
    pub fn write<S: SectorStorage>(&mut self, storage: &S, data: &[u8]) -> Result<usize> {
        let written = self.write_at(storage, self.position, data)?;
        self.position += written;

        Ok(written)
    }

    fn sector_at(&self, offset: usize) -> Result<SectorNumber> {
        self.header
            .byte_to_sector(offset)
            .with_context(|| format!("offset {offset} is outside the file"))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        disk_format::extent::MAX_FILE_SIZE, free_map::SectorBitmap, storage::MemoryDisk,
    };

    use super::*;

    const NUM_SECTORS: usize = 256;

    fn open(disk: &MemoryDisk, size: usize) -> OpenFile {
        let mut map = SectorBitmap::new(disk.num_sectors());
        let mut header = FileHeader::new();
        header.allocate(&mut map, size).unwrap();

        // scribble over the data sectors so reads must come from writes
        for s in header.data_sectors() {
            disk.write_sector(s, &[0xee; SECTOR_SIZE]).unwrap();
        }

        OpenFile::new(header)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_write_then_read_whole_file() {
        let disk = MemoryDisk::new(NUM_SECTORS);
        let size = 2 * MAX_FILE_SIZE + 300;
        let file = open(&disk, size);
        let data = pattern(size);

        assert_eq!(file.write_at(&disk, 0, &data).unwrap(), size);
        assert_eq!(file.read_at(&disk, 0, size).unwrap(), data);
    }

    #[test]
    fn test_unaligned_write_keeps_neighbours() {
        let disk = MemoryDisk::new(NUM_SECTORS);
        let file = open(&disk, MAX_FILE_SIZE + 10);
        file.write_at(&disk, 0, &[1; MAX_FILE_SIZE + 10]).unwrap();

        // straddles the boundary between the two headers
        let offset = MAX_FILE_SIZE - 3;
        file.write_at(&disk, offset, &[9; 6]).unwrap();

        let data = file.read_at(&disk, offset - 2, 10).unwrap();
        assert_eq!(data, [1, 1, 9, 9, 9, 9, 9, 9, 1, 1]);
    }

    #[test]
    fn test_access_clamped_to_length() {
        let disk = MemoryDisk::new(NUM_SECTORS);
        let file = open(&disk, 100);

        assert_eq!(file.write_at(&disk, 90, &[5; 20]).unwrap(), 10);
        assert_eq!(file.read_at(&disk, 95, 50).unwrap(), vec![5; 5]);
        assert_eq!(file.write_at(&disk, 100, &[5; 20]).unwrap(), 0);
        assert!(file.read_at(&disk, 150, 10).unwrap().is_empty());
    }

    #[test]
    fn test_cursor() {
        let disk = MemoryDisk::new(NUM_SECTORS);
        let mut file = open(&disk, 300);

        assert_eq!(file.write(&disk, &pattern(200)).unwrap(), 200);
        assert_eq!(file.position(), 200);
        assert_eq!(file.write(&disk, &pattern(200)).unwrap(), 100);
        assert_eq!(file.position(), 300);

        file.seek(0);
        assert_eq!(file.read(&disk, 200).unwrap(), pattern(200));
        assert_eq!(file.read(&disk, 200).unwrap(), pattern(100));
        assert!(file.read(&disk, 1).unwrap().is_empty());
    }
}
