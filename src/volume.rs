use std::collections::HashMap;

use anyhow::{bail, ensure, Context, Result};
use log::{info, warn};

use crate::{
    disk_format::{
        sector::SectorNumber,
        volume_header::{VolumeHeader, FREE_MAP_START_SECTOR, VOLUME_HEADER_SECTOR},
    },
    file_header::FileHeader,
    free_map::{FreeSpaceMap, SectorBitmap},
    open_file::OpenFile,
    storage::SectorStorage,
};

/// A formatted disk: the volume header, the free-space map, and files identified by the sector
/// holding their root header.
pub struct Volume<S: SectorStorage> {
    pub storage: S,
    header: VolumeHeader,
    /// Tracks the allocation status of sectors.
    free_map: SectorBitmap,
}

impl<S: SectorStorage> Volume<S> {
    /// Writes an empty volume covering the whole of `storage`.
    pub fn format(storage: S) -> Result<Self> {
        let header = VolumeHeader::new(storage.num_sectors())?;

        let mut free_map = SectorBitmap::new(storage.num_sectors());
        for s in 0..header.reserved_sectors() {
            free_map.mark(s);
        }

        storage.write_sector(VOLUME_HEADER_SECTOR, &header.to_sector()?)?;

        let volume = Self {
            storage,
            header,
            free_map,
        };
        volume.flush_free_map()?;

        info!(
            "formatted {} sectors ({} free)",
            volume.num_sectors(),
            volume.free_map.count_free()
        );

        Ok(volume)
    }

    pub fn open(storage: S) -> Result<Self> {
        let header_sector = storage.read_sector(VOLUME_HEADER_SECTOR)?;
        let header =
            VolumeHeader::from_sector(&header_sector).context("unable to parse volume header")?;

        let num_sectors = header.num_sectors as usize;
        if num_sectors > storage.num_sectors() {
            bail!(
                "volume claims {num_sectors} sectors but the disk has {}",
                storage.num_sectors()
            );
        }

        let free_map = SectorBitmap::fetch_from(&storage, FREE_MAP_START_SECTOR, num_sectors)?;
        for s in 0..header.reserved_sectors() {
            ensure!(
                free_map.test(s),
                "reserved sector {s} is marked free in the free-space map"
            );
        }

        info!("{num_sectors} total sectors");
        info!("{} free sectors", free_map.count_free());

        Ok(Self {
            storage,
            header,
            free_map,
        })
    }

    /// The number of sectors in the volume, including the reserved ones.
    pub fn num_sectors(&self) -> usize {
        self.header.num_sectors as usize
    }

    /// The number of sectors not used by the volume metadata or any file.
    pub fn free_sectors(&self) -> usize {
        self.free_map.count_free()
    }

    /// The in-memory free-space map. It is written to disk after every create and remove.
    pub fn free_map(&self) -> &SectorBitmap {
        &self.free_map
    }

    /// Creates a file of `size` bytes and returns the sector holding its root header.
    ///
    /// On failure every sector claimed for the file is released again, whether the disk ran out
    /// of room or writing the header or the free-space map failed.
    pub fn create_file(&mut self, size: usize) -> Result<SectorNumber> {
        let root = self
            .free_map
            .find_and_claim()
            .context("no free sector for the file header")?;

        let mut header = FileHeader::new();
        if let Err(err) = header.allocate(&mut self.free_map, size) {
            self.free_map.clear(root);
            return Err(err.context(format!("creating a file of {size} bytes")));
        }

        let persisted = header
            .write_back(&self.storage, root)
            .and_then(|()| self.flush_free_map());
        if let Err(err) = persisted {
            warn!("[header @{root}] persisting new file failed, releasing its sectors: {err}");

            header.deallocate(&mut self.free_map);
            self.free_map.clear(root);

            return Err(err.context(format!("creating a file of {size} bytes")));
        }

        info!(
            "[header @{root}] created file of {size} bytes in {} header(s)",
            header.chain_len()
        );

        Ok(root)
    }

    /// Releases every sector of the file whose root header is stored in `root`.
    ///
    /// `root` must be a sector returned by [`Self::create_file`]. A continuation header parses
    /// just like a root, so passing one releases the tail of another file. Removing that file
    /// afterwards then fails here, because its chain names sectors that are already free.
    pub fn remove_file(&mut self, root: SectorNumber) -> Result<()> {
        let header = self.fetch_header(root)?;
        ensure!(self.free_map.test(root), "sector {root} is not in use");

        if let Some(s) = header
            .header_sectors()
            .chain(header.data_sectors())
            .find(|s| !self.free_map.test(*s))
        {
            bail!("[header @{root}] sector {s} is already free");
        }

        header.deallocate(&mut self.free_map);
        self.free_map.clear(root);
        self.flush_free_map()?;

        info!(
            "[header @{root}] removed file of {} bytes",
            header.file_length()
        );

        Ok(())
    }

    pub fn open_file(&self, root: SectorNumber) -> Result<OpenFile> {
        Ok(OpenFile::new(self.fetch_header(root)?))
    }

    pub fn fetch_header(&self, root: SectorNumber) -> Result<FileHeader> {
        ensure!(
            root >= self.header.reserved_sectors() && root < self.num_sectors(),
            "sector {root} cannot hold a file header"
        );

        FileHeader::fetch_from(&self.storage, root)
            .with_context(|| format!("loading file header at sector {root}"))
    }

    /// Checks the volume for consistency, given the root header sectors of every file.
    ///
    /// Every sector used by a file must be marked as used, must lie outside the reserved area
    /// and must belong to exactly one file. Every used sector outside the reserved area must
    /// belong to some file.
    pub fn check(&self, roots: &[SectorNumber]) -> Result<()> {
        let reserved = self.header.reserved_sectors();
        let mut owners: HashMap<SectorNumber, SectorNumber> = HashMap::new();

        for &root in roots {
            let header = self.fetch_header(root)?;

            let sectors = [root]
                .into_iter()
                .chain(header.header_sectors())
                .chain(header.data_sectors());

            for s in sectors {
                if s < reserved || s >= self.num_sectors() {
                    bail!("[header @{root}] sector {s} is outside the data area");
                }

                if !self.free_map.test(s) {
                    bail!("[header @{root}] sector {s} is marked free");
                }

                if let Some(owner) = owners.insert(s, root) {
                    bail!("sector {s} is used by the files at {owner} and {root}");
                }
            }
        }

        let leaked = self
            .free_map
            .used_sectors()
            .into_iter()
            .filter(|s| *s >= reserved && !owners.contains_key(s))
            .collect::<Vec<_>>();

        if !leaked.is_empty() {
            warn!("{} sector(s) in use by no file", leaked.len());
            bail!("sectors marked used but not owned by any file: {leaked:?}");
        }

        Ok(())
    }

    fn flush_free_map(&self) -> Result<()> {
        self.free_map
            .write_back(&self.storage, FREE_MAP_START_SECTOR)
            .context("writing free-space map")
    }
}
