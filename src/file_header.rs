//! File headers: the mapping from a file's bytes to the disk sectors that hold them.
//!
//! A single [`ExtentRecord`] describes at most [`MAX_FILE_SIZE`] bytes. Larger files are stored
//! as a chain of records, each one naming the sector of the next. The whole chain is owned by one
//! [`FileHeader`] and kept in memory as a vector of nodes, root first.

use std::collections::HashSet;
use std::io::Write;

use anyhow::{bail, ensure, Context, Result};
use log::{debug, warn};

use crate::{
    disk_format::{
        extent::{ExtentRecord, MAX_FILE_SIZE, NUM_DIRECT},
        sector::{self, SectorNumber, NO_SECTOR, SECTOR_SIZE},
    },
    free_map::FreeSpaceMap,
    storage::SectorStorage,
};

/// One link of a file header chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtentNode {
    content_bytes: usize,
    /// always `content_bytes.div_ceil(SECTOR_SIZE)` entries
    direct: Vec<SectorNumber>,
    /// where the next node is stored, if there is one
    continuation: Option<SectorNumber>,
}

impl ExtentNode {
    fn new(content_bytes: usize) -> Self {
        Self {
            content_bytes,
            direct: Vec::with_capacity(content_bytes.div_ceil(SECTOR_SIZE)),
            continuation: None,
        }
    }

    /// The number of file bytes described by this node.
    pub fn content_bytes(&self) -> usize {
        self.content_bytes
    }

    /// The number of data sectors in this node: the content size rounded up to whole sectors.
    pub fn sector_count(&self) -> usize {
        self.direct.len()
    }

    /// The sectors holding this node's bytes, in file order.
    pub fn direct_sectors(&self) -> &[SectorNumber] {
        &self.direct
    }

    /// The sector holding the next node of the chain.
    pub fn continuation_sector(&self) -> Option<SectorNumber> {
        self.continuation
    }

    fn to_record(&self) -> ExtentRecord {
        let mut direct = [NO_SECTOR; NUM_DIRECT];
        for (slot, s) in direct.iter_mut().zip(&self.direct) {
            *slot = sector::to_disk(Some(*s));
        }

        ExtentRecord {
            content_bytes: self.content_bytes as i32,
            sector_count: self.direct.len() as i32,
            direct,
            continuation: sector::to_disk(self.continuation),
        }
    }

    /// Expects a record that passed [`ExtentRecord::from_sector`] validation.
    fn from_record(record: &ExtentRecord) -> Self {
        Self {
            content_bytes: record.content_bytes as usize,
            direct: record.direct[..record.sector_count as usize]
                .iter()
                .map(|s| *s as SectorNumber)
                .collect(),
            continuation: sector::from_disk(record.continuation),
        }
    }
}

/// A file header chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileHeader {
    nodes: Vec<ExtentNode>,
}

impl FileHeader {
    /// Constructs an empty header. Use [`Self::allocate`] to give it content.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims sectors for a new file of `total_bytes` bytes, building as many chain nodes as the
    /// size requires.
    ///
    /// Fails if the free-space map runs out of sectors, in which case every sector claimed by
    /// this call is released again and the header is left empty.
    pub fn allocate<F: FreeSpaceMap>(&mut self, free_map: &mut F, total_bytes: usize) -> Result<()> {
        ensure!(self.nodes.is_empty(), "file header is already allocated");
        ensure!(
            total_bytes <= i32::MAX as usize,
            "file size {total_bytes} is too large"
        );

        if let Err(err) = self.claim_chain(free_map, total_bytes) {
            warn!("allocating {total_bytes} bytes failed, releasing claimed sectors: {err}");

            self.release(free_map);
            self.nodes.clear();

            return Err(err);
        }

        debug!(
            "allocated {total_bytes} bytes in {} header(s)",
            self.nodes.len()
        );

        Ok(())
    }

    /// Pushes nodes until `total_bytes` are covered. Everything claimed so far is recorded in
    /// `self.nodes` even on failure.
    fn claim_chain<F: FreeSpaceMap>(&mut self, free_map: &mut F, total_bytes: usize) -> Result<()> {
        let mut remaining = total_bytes;

        loop {
            let content_bytes = remaining.min(MAX_FILE_SIZE);
            remaining -= content_bytes;

            let needed = content_bytes.div_ceil(SECTOR_SIZE);
            let available = free_map.count_free();
            if available < needed {
                bail!("not enough free sectors: need {needed}, have {available}");
            }

            let index = self.nodes.len();
            self.nodes.push(ExtentNode::new(content_bytes));
            let node = self.nodes.last_mut().expect("a node was just pushed");

            for _ in 0..needed {
                let s = free_map
                    .find_and_claim()
                    .context("free-space map reported free sectors but had none")?;
                node.direct.push(s);
            }

            debug!(
                "header #{index}: {content_bytes} bytes in sectors {:?}",
                node.direct
            );

            if remaining == 0 {
                return Ok(());
            }

            let continuation = free_map
                .find_and_claim()
                .context("no free sector left for a continuation header")?;
            node.continuation = Some(continuation);
        }
    }

    /// Returns every sector of the chain to the free-space map: the data sectors of all nodes and
    /// the sectors holding the continuation nodes. The sector holding the root node belongs to
    /// the caller and is not released.
    ///
    /// # Panics
    ///
    /// Panics if any of those sectors is already free. That can only happen if the header or
    /// the map is corrupt, and carrying on would hand out a sector that is still in use.
    pub fn deallocate<F: FreeSpaceMap>(&self, free_map: &mut F) {
        self.release(free_map);

        debug!("deallocated {} bytes", self.file_length());
    }

    fn release<F: FreeSpaceMap>(&self, free_map: &mut F) {
        for node in self.nodes.iter().rev() {
            // the node stored in `continuation` was released by the previous iteration
            let owned = node.continuation.iter().chain(&node.direct);

            for &s in owned {
                assert!(free_map.test(s), "sector {s} is already free");
                free_map.clear(s);
            }
        }
    }

    /// Loads the chain whose root node is stored in `sector`.
    pub fn fetch_from<S: SectorStorage>(storage: &S, sector: SectorNumber) -> Result<Self> {
        let mut nodes: Vec<ExtentNode> = vec![];
        let mut seen = HashSet::new();
        let mut next = Some(sector);

        while let Some(s) = next {
            ensure!(
                s < storage.num_sectors(),
                "file header sector out of bounds: {s}"
            );
            ensure!(
                seen.insert(s),
                "file header chain loops back to sector {s}"
            );

            if let Some(previous) = nodes.last() {
                ensure!(
                    previous.content_bytes == MAX_FILE_SIZE,
                    "file header continues after a partially filled header"
                );
            }

            let record = ExtentRecord::from_sector(&storage.read_sector(s)?)
                .with_context(|| format!("parsing file header in sector {s}"))?;
            let node = ExtentNode::from_record(&record);

            if let Some(bad) = node.direct.iter().find(|d| **d >= storage.num_sectors()) {
                bail!("file header in sector {s} points to invalid sector {bad}");
            }

            next = node.continuation;
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    /// Stores the chain with its root node in `sector` and every other node in the sector its
    /// predecessor names.
    pub fn write_back<S: SectorStorage>(&self, storage: &S, sector: SectorNumber) -> Result<()> {
        ensure!(!self.nodes.is_empty(), "file header has not been allocated");

        let mut target = sector;
        for node in &self.nodes {
            storage
                .write_sector(target, &node.to_record().to_sector()?)
                .with_context(|| format!("writing file header to sector {target}"))?;

            if let Some(continuation) = node.continuation {
                target = continuation;
            }
        }

        Ok(())
    }

    /// Translates a byte offset within the file to the sector holding that byte. Returns `None`
    /// for offsets at or past the end of the file.
    pub fn byte_to_sector(&self, offset: usize) -> Option<SectorNumber> {
        let node = self.nodes.get(offset / MAX_FILE_SIZE)?;
        let local = offset % MAX_FILE_SIZE;

        if local >= node.content_bytes {
            return None;
        }

        node.direct.get(local / SECTOR_SIZE).copied()
    }

    /// The size of the file in bytes.
    pub fn file_length(&self) -> usize {
        self.nodes.iter().map(|node| node.content_bytes).sum()
    }

    /// The number of nodes in the chain.
    pub fn chain_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[ExtentNode] {
        &self.nodes
    }

    /// Every data sector of the file, in file order.
    pub fn data_sectors(&self) -> impl Iterator<Item = SectorNumber> + '_ {
        self.nodes.iter().flat_map(|node| node.direct.iter().copied())
    }

    /// The sectors holding the continuation nodes, in chain order.
    pub fn header_sectors(&self) -> impl Iterator<Item = SectorNumber> + '_ {
        self.nodes.iter().filter_map(|node| node.continuation)
    }

    /// Writes a human-readable dump of the chain and the contents of every data sector.
    /// Printable ASCII is shown as is, any other byte as a `\xx` hex escape.
    pub fn print<S: SectorStorage, W: Write>(&self, storage: &S, out: &mut W) -> Result<()> {
        writeln!(
            out,
            "file header: {} bytes in {} header(s)",
            self.file_length(),
            self.nodes.len()
        )?;

        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(
                out,
                "header #{i}: {} bytes, sectors {:?}, continuation {}",
                node.content_bytes,
                node.direct,
                sector::to_disk(node.continuation)
            )?;

            let mut left = node.content_bytes;
            for &s in &node.direct {
                let data = storage.read_sector(s)?;
                let shown = left.min(SECTOR_SIZE);
                left -= shown;

                for &byte in &data[..shown] {
                    if byte.is_ascii_graphic() || byte == b' ' {
                        write!(out, "{}", byte as char)?;
                    } else {
                        write!(out, "\\{byte:x}")?;
                    }
                }
                writeln!(out)?;
            }
        }

        Ok(())
    }
}
