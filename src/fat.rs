//! FAT table: the cluster-indexed linked list of next-cluster pointers.
//!
//! Grounded on the teacher's `fat.rs` (`ClusterChain`/`FatManager`), but
//! generalized for both 2-byte (FAT16) and 4-byte (FAT32) entries, and
//! with the teacher's `recycled_cluster: Vec<u32>` free list dropped:
//! spec.md's FSInfo-hint Open Question is resolved as "always rescan from
//! `start`" (see DESIGN.md), so `find_free` never remembers anything
//! across calls.

use log::{debug, warn};

use crate::bpb::FatVariant;
use crate::cache::SectorCache;
use crate::device::DeviceError;
use crate::{CLUSTER_EOC, CLUSTER_FIRST_DATA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    OutOfSpace,
    Corrupt,
    Device(DeviceError),
}

impl From<DeviceError> for FatError {
    fn from(e: DeviceError) -> Self {
        FatError::Device(e)
    }
}

/// A view over the cached FAT sectors, scoped to one volume's layout.
pub struct FatTable<'a> {
    cache: &'a mut SectorCache,
    first_fat_sector: usize,
    bytes_per_sector: usize,
    num_clusters: usize,
    variant: FatVariant,
}

impl<'a> FatTable<'a> {
    pub fn new(
        cache: &'a mut SectorCache,
        first_fat_sector: usize,
        bytes_per_sector: usize,
        num_clusters: usize,
        variant: FatVariant,
    ) -> Self {
        Self {
            cache,
            first_fat_sector,
            bytes_per_sector,
            num_clusters,
            variant,
        }
    }

    fn entry_width(&self) -> usize {
        match self.variant {
            FatVariant::Fat16 => 2,
            FatVariant::Fat32 => 4,
        }
    }

    fn entry_mask(&self) -> u32 {
        match self.variant {
            FatVariant::Fat16 => 0x0000_FFFF,
            FatVariant::Fat32 => 0x0FFF_FFFF,
        }
    }

    fn eoc_threshold(&self) -> u32 {
        match self.variant {
            FatVariant::Fat16 => 0xFFF8,
            FatVariant::Fat32 => 0x0FFF_FFF8,
        }
    }

    fn locate(&self, cluster: u32) -> (usize, usize) {
        let width = self.entry_width();
        let offset = cluster as usize * width;
        let sector = self.first_fat_sector + offset / self.bytes_per_sector;
        let within = offset % self.bytes_per_sector;
        (sector, within)
    }

    fn normalize(&self, raw: u32) -> u32 {
        let masked = raw & self.entry_mask();
        if masked >= self.eoc_threshold() {
            CLUSTER_EOC
        } else {
            masked
        }
    }

    /// Raw entry read, masked and normalized to the canonical EOC sentinel.
    pub fn get(&mut self, cluster: u32) -> Result<u32, FatError> {
        let (sector, within) = self.locate(cluster);
        let bytes = self.cache.sector_bytes(sector)?;
        let raw = match self.entry_width() {
            2 => u16::from_le_bytes([bytes[within], bytes[within + 1]]) as u32,
            _ => u32::from_le_bytes([
                bytes[within],
                bytes[within + 1],
                bytes[within + 2],
                bytes[within + 3],
            ]),
        };
        Ok(self.normalize(raw))
    }

    /// As `get`, but a free (`0`) entry where a link was expected is a sign
    /// of chain corruption: diagnose it and report end-of-chain instead of
    /// propagating `0`, so callers never mistake it for a truly unallocated
    /// cluster (spec.md §4.4 get-checked / §4.9).
    pub fn get_checked(&mut self, cluster: u32) -> Result<u32, FatError> {
        let entry = self.get(cluster)?;
        if entry == 0 {
            warn!("fat: cluster {} chained to a free entry, treating as corrupt", cluster);
            return Ok(CLUSTER_EOC);
        }
        Ok(entry)
    }

    /// Patches the FAT entry for `cluster` to `value`, masked to the
    /// variant's entry width.
    pub fn set(&mut self, cluster: u32, value: u32) -> Result<(), FatError> {
        let (sector, within) = self.locate(cluster);
        let width = self.entry_width();
        let bytes = match width {
            2 => (value as u16).to_le_bytes().to_vec(),
            _ => value.to_le_bytes().to_vec(),
        };
        self.cache.patch(sector, within, &bytes)?;
        Ok(())
    }

    /// Linear scan `[start .. num_clusters)` for the first free cluster.
    /// Never consults or updates any hint — spec.md's FSInfo maintenance
    /// stays stubbed out (DESIGN.md Open Question).
    pub fn find_free(&mut self, start: u32) -> Result<u32, FatError> {
        let start = start.max(CLUSTER_FIRST_DATA);
        for cluster in start..(self.num_clusters as u32 + CLUSTER_FIRST_DATA) {
            if self.get(cluster)? == 0 {
                return Ok(cluster);
            }
        }
        Ok(0)
    }

    /// Links `tail`, currently the last cluster of a chain, onto `new`.
    /// `new` must already be marked end-of-chain by the caller.
    pub fn append(&mut self, tail: u32, new: u32) -> Result<(), FatError> {
        self.set(tail, new)
    }

    /// Allocates `n` clusters (`n = ⌈size / bytes_per_cluster⌉`), chaining
    /// them together and terminating the last one. Returns the first
    /// allocated cluster, or `0` if the volume runs out of space partway
    /// through (any already-allocated clusters in this call remain
    /// allocated — spec.md does not ask allocate-n to roll back on
    /// partial failure).
    pub fn allocate_n(&mut self, n: usize) -> Result<u32, FatError> {
        let mut first = 0u32;
        let mut prev: Option<u32> = None;
        let mut search_from = CLUSTER_FIRST_DATA;

        for _ in 0..n {
            let cluster = self.find_free(search_from)?;
            if cluster == 0 {
                debug!("fat: out of space allocating cluster {} of {}", first, n);
                return Ok(0);
            }
            self.set(cluster, CLUSTER_EOC)?;
            if let Some(p) = prev {
                self.append(p, cluster)?;
            } else {
                first = cluster;
            }
            prev = Some(cluster);
            search_from = cluster + 1;
        }
        Ok(first)
    }

    /// Walks the chain from `start`, freeing every link, stopping at the
    /// end-of-chain sentinel.
    pub fn free_chain(&mut self, start: u32) -> Result<(), FatError> {
        let mut cluster = start;
        while cluster != 0 && cluster != CLUSTER_EOC {
            let next = self.get_checked(cluster)?;
            self.set(cluster, 0)?;
            cluster = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::test_support::RamDisk;

    fn cache_over(dev: &Arc<RamDisk>) -> SectorCache {
        SectorCache::new(dev.clone(), 512)
    }

    #[test]
    fn allocate_n_chains_clusters_and_terminates_the_last_one() {
        let dev = Arc::new(RamDisk::new(4, 512));
        let mut cache = cache_over(&dev);
        let mut fat = FatTable::new(&mut cache, 0, 512, 16, FatVariant::Fat32);

        let first = fat.allocate_n(3).unwrap();
        assert_ne!(first, 0);

        let second = fat.get(first).unwrap();
        let third = fat.get(second).unwrap();
        assert_eq!(fat.get(third).unwrap(), CLUSTER_EOC);
    }

    #[test]
    fn find_free_skips_allocated_clusters() {
        let dev = Arc::new(RamDisk::new(4, 512));
        let mut cache = cache_over(&dev);
        let mut fat = FatTable::new(&mut cache, 0, 512, 16, FatVariant::Fat32);

        fat.set(CLUSTER_FIRST_DATA, CLUSTER_EOC).unwrap();
        let free = fat.find_free(CLUSTER_FIRST_DATA).unwrap();
        assert_eq!(free, CLUSTER_FIRST_DATA + 1);
    }

    #[test]
    fn allocate_n_reports_out_of_space_by_returning_zero() {
        let dev = Arc::new(RamDisk::new(4, 512));
        let mut cache = cache_over(&dev);
        let mut fat = FatTable::new(&mut cache, 0, 512, 2, FatVariant::Fat32);

        let got = fat.allocate_n(3).unwrap();
        assert_eq!(got, 0);
    }

    #[test]
    fn free_chain_clears_every_link_back_to_zero() {
        let dev = Arc::new(RamDisk::new(4, 512));
        let mut cache = cache_over(&dev);
        let mut fat = FatTable::new(&mut cache, 0, 512, 16, FatVariant::Fat32);

        let first = fat.allocate_n(3).unwrap();
        fat.free_chain(first).unwrap();

        let mut cluster = first;
        for _ in 0..3 {
            assert_eq!(fat.get(cluster).unwrap(), 0);
            cluster += 1;
        }
    }

    #[test]
    fn get_checked_treats_a_free_entry_mid_chain_as_end_of_chain() {
        let dev = Arc::new(RamDisk::new(4, 512));
        let mut cache = cache_over(&dev);
        let mut fat = FatTable::new(&mut cache, 0, 512, 16, FatVariant::Fat32);

        fat.set(CLUSTER_FIRST_DATA, 0).unwrap();
        assert_eq!(fat.get_checked(CLUSTER_FIRST_DATA).unwrap(), CLUSTER_EOC);
    }

    #[test]
    fn fat16_entries_mask_to_sixteen_bits() {
        let dev = Arc::new(RamDisk::new(4, 512));
        let mut cache = cache_over(&dev);
        let mut fat = FatTable::new(&mut cache, 0, 512, 16, FatVariant::Fat16);

        fat.set(CLUSTER_FIRST_DATA, 0xFFFFFFFF).unwrap();
        assert_eq!(fat.get(CLUSTER_FIRST_DATA).unwrap(), CLUSTER_EOC);
    }
}
