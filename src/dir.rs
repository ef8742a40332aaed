//! Directory-entry iterator, name matching and long-filename reassembly.
//!
//! `DirIter` is grounded on the teacher's linear 32-byte-slot walk in
//! `vfs.rs`/`dir.rs` (`read_at`/`ls_with_attr`), restructured into the
//! explicit state machine spec.md §4.5 describes: current cluster, current
//! sector, remaining sectors in the chunk, byte offset. The teacher leaves
//! chain extension implicit inside `write_at`'s auto-grow path; here it is
//! `next()`'s own job, since the iterator is the only thing that walks
//! directory sectors.

use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::cache::{Cache, SectorCache};
use crate::device::DeviceError;
use crate::entry::{LongDirEntry, ShortDirEntry};
use crate::fat::{FatError, FatTable};
use crate::name;
use crate::volume::VolumeLayout;
use crate::{CLUSTER_EOC, DIRENT_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirError {
    NotFound,
    IsDir,
    NotDir,
    NameExists,
    Corrupt,
    OutOfSpace,
    Device(DeviceError),
}

impl From<DeviceError> for DirError {
    fn from(e: DeviceError) -> Self {
        DirError::Device(e)
    }
}

impl From<FatError> for DirError {
    fn from(e: FatError) -> Self {
        match e {
            FatError::OutOfSpace => DirError::OutOfSpace,
            FatError::Corrupt => DirError::Corrupt,
            FatError::Device(d) => DirError::Device(d),
        }
    }
}

/// A matched (or freshly-created) directory slot: location, parsed short
/// entry, and the combined cluster number.
#[derive(Debug, Clone)]
pub struct DirEntryHandle {
    pub sector: usize,
    pub offset: usize,
    pub entry: ShortDirEntry,
    pub cluster: u32,
    pub is_dir: bool,
}

/// Explicit state machine over a directory's 32-byte slots (spec.md §4.5).
pub struct DirIter {
    current_cluster: u32,
    current_sector: usize,
    sector_in_chunk: usize,
    dir_sectors: usize,
    byte_offset: usize,
}

impl DirIter {
    /// `first(dir_cluster)`: initializes state and positions at offset 0 of
    /// the first sector of `dir_cluster`.
    pub fn first(layout: &VolumeLayout, dir_cluster: u32) -> Self {
        Self {
            current_cluster: dir_cluster,
            current_sector: layout.sector_of_cluster(dir_cluster),
            sector_in_chunk: 0,
            dir_sectors: layout.dir_sectors(dir_cluster),
            byte_offset: 0,
        }
    }

    pub fn sector(&self) -> usize {
        self.current_sector
    }

    pub fn offset(&self) -> usize {
        self.byte_offset
    }

    /// Reads the 32 bytes at the current position.
    pub fn current_bytes<'a>(&self, cache: &'a mut SectorCache) -> Result<&'a [u8], DeviceError> {
        let bytes = cache.sector_bytes(self.current_sector)?;
        Ok(&bytes[self.byte_offset..self.byte_offset + DIRENT_SIZE])
    }

    /// `next()`: advances to the next 32-byte slot, transparently crossing
    /// sector and cluster-chunk boundaries and extending the chain with a
    /// fresh zero-filled cluster on overrun (spec.md §4.5).
    pub fn advance(
        &mut self,
        cache: &mut SectorCache,
        layout: &VolumeLayout,
    ) -> Result<(), DirError> {
        self.byte_offset += DIRENT_SIZE;
        if self.byte_offset < layout.bytes_per_sector {
            return Ok(());
        }

        self.byte_offset = 0;
        self.sector_in_chunk += 1;
        if self.sector_in_chunk < self.dir_sectors {
            self.current_sector += 1;
            return Ok(());
        }

        // Chunk exhausted: follow the FAT chain (the FAT16 root region has
        // no FAT chain at all and must not be extended).
        if layout.variant == crate::bpb::FatVariant::Fat16 && self.current_cluster == 0 {
            warn!("dir: FAT16 root directory region overran its fixed sector count");
            return Err(DirError::Corrupt);
        }

        let mut fat = FatTable::new(
            cache,
            layout.first_fat_sector,
            layout.bytes_per_sector,
            layout.num_clusters,
            layout.variant,
        );
        let next = fat.get_checked(self.current_cluster)?;

        let next_cluster = if next == CLUSTER_EOC {
            let allocated = fat.allocate_n(1)?;
            if allocated == 0 {
                debug!("dir: out of space extending directory at cluster {}", self.current_cluster);
                return Err(DirError::OutOfSpace);
            }
            fat.append(self.current_cluster, allocated)?;
            allocated
        } else {
            next
        };

        let grew = next == CLUSTER_EOC;
        self.current_cluster = next_cluster;
        self.sector_in_chunk = 0;
        self.dir_sectors = layout.dir_sectors(next_cluster);
        self.current_sector = layout.sector_of_cluster(next_cluster);

        if grew {
            // Freshly allocated cluster: zero-fill its first sector so the
            // first slot's name byte reads 0x00 (empty-slot marker).
            let zeros = alloc::vec![0u8; layout.bytes_per_sector];
            cache.write_sector_bytes(self.current_sector, &zeros)?;
        }

        Ok(())
    }

    pub fn is_last(bytes: &[u8]) -> bool {
        bytes[0] == 0x00
    }

    pub fn is_free(bytes: &[u8]) -> bool {
        bytes[0] == 0xE5
    }
}

/// Staging buffer for reassembling a long name across preceding entries
/// (spec.md §4.6). Read-only: nothing ever writes LFN fragments.
pub struct LfnStage {
    buf: [u8; 256],
    active: bool,
}

impl LfnStage {
    pub fn new() -> Self {
        Self { buf: [0; 256], active: false }
    }

    pub fn accumulate(&mut self, lde: &LongDirEntry) {
        if lde.is_last() {
            self.buf = [0; 256];
            self.active = true;
        }
        if self.active {
            lde.write_into(&mut self.buf);
        }
    }

    pub fn take(&mut self) -> Option<String> {
        if !self.active {
            return None;
        }
        self.active = false;
        let end = self.buf.iter().position(|&b| b == 0).unwrap_or(self.buf.len());
        Some(String::from_utf8_lossy(&self.buf[..end]).into_owned())
    }
}

/// Scans a directory starting at `dir_cluster` for an entry whose short or
/// reassembled long name matches `pattern` (spec.md §4.6/§4.7). Skips `.`
/// self-entries and volume-label entries. Returns `None` if the scan hits
/// the terminal `0x00` marker without a match.
pub fn find(
    cache: &mut SectorCache,
    layout: &VolumeLayout,
    dir_cluster: u32,
    pattern: &str,
) -> Result<Option<DirEntryHandle>, DirError> {
    let mut it = DirIter::first(layout, dir_cluster);
    let mut lfn = LfnStage::new();

    loop {
        let bytes = it.current_bytes(cache)?;
        if DirIter::is_last(bytes) {
            return Ok(None);
        }

        if DirIter::is_free(bytes) {
            it.advance(cache, layout)?;
            continue;
        }

        if bytes[11] == crate::ATTR_LONG_NAME {
            let lde = LongDirEntry::from_bytes(bytes);
            lfn.accumulate(&lde);
            it.advance(cache, layout)?;
            continue;
        }

        let short = ShortDirEntry::from_bytes(bytes);
        let long_name = lfn.take();

        if short.is_dot_entry() || short.is_volume_id() {
            it.advance(cache, layout)?;
            continue;
        }

        let short_hit = name::matches(pattern, &short.display_name());
        let long_hit = long_name
            .as_deref()
            .map(|n| name::matches(pattern, n))
            .unwrap_or(false);

        if short_hit || long_hit {
            return Ok(Some(DirEntryHandle {
                sector: it.sector(),
                offset: it.offset(),
                cluster: short.cluster(),
                is_dir: short.is_dir(),
                entry: short,
            }));
        }

        it.advance(cache, layout)?;
    }
}

/// Scans for a free slot (a deleted entry or the terminal `0x00` marker),
/// extending the directory if necessary. Returns the sector/offset to
/// write the new short entry at.
pub fn find_free_slot(
    cache: &mut SectorCache,
    layout: &VolumeLayout,
    dir_cluster: u32,
) -> Result<(usize, usize), DirError> {
    let mut it = DirIter::first(layout, dir_cluster);
    loop {
        let bytes = it.current_bytes(cache)?;
        if DirIter::is_last(bytes) || DirIter::is_free(bytes) {
            return Ok((it.sector(), it.offset()));
        }
        it.advance(cache, layout)?;
    }
}

/// Re-scans the directory from the front to find the entry recorded at
/// `(sector, offset)`, tracking any immediately-preceding long-filename
/// slots, and marks them together with the short slot deleted (`0xE5`) —
/// spec.md §4.8 unlink.
pub fn delete_entry_and_lfns(
    cache: &mut SectorCache,
    layout: &VolumeLayout,
    dir_cluster: u32,
    target_sector: usize,
    target_offset: usize,
) -> Result<(), DirError> {
    let mut it = DirIter::first(layout, dir_cluster);
    let mut pending_lfn_positions: Vec<(usize, usize)> = Vec::new();

    loop {
        let bytes = it.current_bytes(cache)?;
        if DirIter::is_last(bytes) {
            return Err(DirError::NotFound);
        }

        let is_target = it.sector() == target_sector && it.offset() == target_offset;
        let is_lfn = !DirIter::is_free(bytes) && bytes[11] == crate::ATTR_LONG_NAME;

        if is_target {
            cache.patch(it.sector(), it.offset(), &[0xE5])?;
            for (s, o) in pending_lfn_positions {
                cache.patch(s, o, &[0xE5])?;
            }
            return Ok(());
        }

        if is_lfn {
            pending_lfn_positions.push((it.sector(), it.offset()));
        } else {
            pending_lfn_positions.clear();
        }

        it.advance(cache, layout)?;
    }
}

/// Writes a short entry at `(sector, offset)`, through a typed slot rather
/// than a raw byte patch (matching the teacher's `get_mut` usage).
pub fn write_entry(
    cache: &mut SectorCache,
    sector: usize,
    offset: usize,
    entry: &ShortDirEntry,
) -> Result<(), DeviceError> {
    cache.modify(sector, offset, |slot: &mut ShortDirEntry| *slot = *entry)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::test_support::{build_fat32_image, RamDisk};
    use crate::volume::Volume;

    fn mounted(sectors_per_cluster: usize, num_clusters: usize) -> Volume {
        let image = build_fat32_image(512, sectors_per_cluster, num_clusters);
        let dev = Arc::new(RamDisk::from_image(image));
        Volume::mount_unpartitioned(dev, 512).unwrap()
    }

    #[test]
    fn find_on_an_empty_directory_returns_none() {
        let mut volume = mounted(1, 16);
        let layout = volume.layout();
        let root = layout.root_dir_cluster;
        let hit = find(&mut volume.cache, &layout, root, "*").unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn write_then_find_round_trips_a_short_entry() {
        let mut volume = mounted(1, 16);
        let layout = volume.layout();
        let root = layout.root_dir_cluster;

        let (sector, offset) = find_free_slot(&mut volume.cache, &layout, root).unwrap();
        let entry = ShortDirEntry::new_file("HI.TXT", 5, crate::ATTR_ARCHIVE);
        write_entry(&mut volume.cache, sector, offset, &entry).unwrap();

        let hit = find(&mut volume.cache, &layout, root, "HI.TXT").unwrap().unwrap();
        assert_eq!(hit.cluster, 5);
        assert!(!hit.is_dir);
    }

    #[test]
    fn wildcard_pattern_matches_a_stored_short_entry() {
        let mut volume = mounted(1, 16);
        let layout = volume.layout();
        let root = layout.root_dir_cluster;

        let (sector, offset) = find_free_slot(&mut volume.cache, &layout, root).unwrap();
        let entry = ShortDirEntry::new_file("README.TXT", 5, crate::ATTR_ARCHIVE);
        write_entry(&mut volume.cache, sector, offset, &entry).unwrap();

        let hit = find(&mut volume.cache, &layout, root, "*.TXT").unwrap();
        assert!(hit.is_some());
    }

    #[test]
    fn delete_entry_marks_the_slot_free_and_is_skipped_by_find() {
        let mut volume = mounted(1, 16);
        let layout = volume.layout();
        let root = layout.root_dir_cluster;

        let (sector, offset) = find_free_slot(&mut volume.cache, &layout, root).unwrap();
        let entry = ShortDirEntry::new_file("GONE.TXT", 5, crate::ATTR_ARCHIVE);
        write_entry(&mut volume.cache, sector, offset, &entry).unwrap();

        delete_entry_and_lfns(&mut volume.cache, &layout, root, sector, offset).unwrap();

        assert!(find(&mut volume.cache, &layout, root, "GONE.TXT").unwrap().is_none());
    }

    #[test]
    fn find_free_slot_grows_the_directory_once_its_cluster_is_full() {
        // one 512-byte sector per cluster = 16 slots; filling all of them
        // must force find_free_slot to extend onto a second cluster.
        let mut volume = mounted(1, 16);
        let layout = volume.layout();
        let root = layout.root_dir_cluster;

        for i in 0..16 {
            let (sector, offset) = find_free_slot(&mut volume.cache, &layout, root).unwrap();
            let name = alloc::format!("F{}.TXT", i);
            let entry = ShortDirEntry::new_file(&name, 5, crate::ATTR_ARCHIVE);
            write_entry(&mut volume.cache, sector, offset, &entry).unwrap();
        }

        let (sector, _) = find_free_slot(&mut volume.cache, &layout, root).unwrap();
        let first_sector = layout.sector_of_cluster(root);
        assert_ne!(sector, first_sector);
    }
}
