//! Mounted volume state.
//!
//! Replaces the teacher's `fs.rs` (`FileSystem`, wrapping a `bpb`/`fat`/
//! `free_cluster_cnt` behind `Arc<RwLock<_>>`). spec.md §5 models a single
//! caller serializing all access to one volume, so here the volume plainly
//! owns its device handle, its one-slot sector cache, and the derived
//! layout constants — no `Arc`, no `RwLock`, no global mount table
//! (spec.md §9 "Global mount table").

use alloc::sync::Arc;

use log::warn;

use crate::bpb::{BiosParameterBlock, FatVariant};
use crate::cache::{Cache, SectorCache};
use crate::device::{BlockDevice, DeviceError};
use crate::fat::FatTable;
use crate::mbr::{self, MbrError};
use crate::CLUSTER_FIRST_DATA;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountError {
    BadVolume,
    Device(DeviceError),
}

impl From<DeviceError> for MountError {
    fn from(e: DeviceError) -> Self {
        MountError::Device(e)
    }
}

impl From<MbrError> for MountError {
    fn from(_: MbrError) -> Self {
        MountError::BadVolume
    }
}

/// Layout constants derived once at mount time (spec.md §3 "Volume
/// state"). `Copy` so callers can borrow the owning `Volume`'s cache
/// mutably while holding their own copy of the layout.
#[derive(Debug, Clone, Copy)]
pub struct VolumeLayout {
    pub bytes_per_sector: usize,
    pub sectors_per_cluster: usize,
    pub bytes_per_cluster: usize,
    pub first_fat_sector: usize,
    pub first_data_sector: usize,
    pub first_dir_sector: usize,
    pub root_dir_sectors: usize,
    pub root_dir_cluster: u32,
    pub num_clusters: usize,
    pub variant: FatVariant,
}

impl VolumeLayout {
    fn from_bpb(bpb: &BiosParameterBlock) -> Self {
        Self {
            bytes_per_sector: bpb.bytes_per_sector(),
            sectors_per_cluster: bpb.sectors_per_cluster(),
            bytes_per_cluster: bpb.bytes_per_cluster(),
            first_fat_sector: bpb.first_fat_sector(),
            first_data_sector: bpb.first_data_sector(),
            first_dir_sector: bpb.first_dir_sector(),
            root_dir_sectors: bpb.root_dir_sectors(),
            root_dir_cluster: bpb.root_dir_cluster(),
            num_clusters: bpb.num_clusters(),
            variant: bpb.variant(),
        }
    }

    /// spec.md §4.3: `cluster == 0` denotes the FAT16 root region.
    pub fn sector_of_cluster(&self, cluster: u32) -> usize {
        if cluster == 0 {
            self.first_dir_sector
        } else {
            self.first_data_sector
                + (cluster as usize - CLUSTER_FIRST_DATA as usize) * self.sectors_per_cluster
        }
    }

    /// spec.md §4.3: number of sectors in the directory chunk starting at
    /// `cluster`'s first sector.
    pub fn dir_sectors(&self, cluster: u32) -> usize {
        if self.variant == FatVariant::Fat16 && cluster == self.root_dir_cluster {
            self.root_dir_sectors
        } else {
            self.sectors_per_cluster
        }
    }
}

pub struct Volume {
    device: Arc<dyn BlockDevice>,
    pub(crate) cache: SectorCache,
    pub(crate) layout: VolumeLayout,
}

impl Volume {
    /// Mounts a volume: reads the MBR/partition record (or refuses a bare
    /// boot sector, spec.md §4.2 step 1), reads the boot sector at the
    /// partition start, and derives layout constants.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self, MountError> {
        // Probe with a conservative 512-byte sector size; real sector size
        // is confirmed once the BPB itself is parsed.
        let partition = mbr::read_first_partition(device.as_ref(), 512)?;
        let partition_start = partition.start_lba as usize;

        let mut boot = alloc::vec![0u8; 512];
        device.dev_read(partition_start * 512, &mut boot, 512)?;
        let bpb = BiosParameterBlock::parse(&boot, partition_start).ok_or_else(|| {
            warn!("mount: boot sector at partition start {} failed to parse", partition_start);
            MountError::BadVolume
        })?;

        if !bpb.is_valid() {
            warn!("mount: boot sector at partition start {} has an invalid layout", partition_start);
            return Err(MountError::BadVolume);
        }

        let layout = VolumeLayout::from_bpb(&bpb);
        let cache = SectorCache::new(Arc::clone(&device), layout.bytes_per_sector);

        Ok(Self { device, cache, layout })
    }

    /// Mounts directly from an already-located boot sector, bypassing MBR
    /// parsing. Used by tests that build a single-partition image.
    pub fn mount_unpartitioned(device: Arc<dyn BlockDevice>, bytes_per_sector: usize) -> Result<Self, MountError> {
        let mut boot = alloc::vec![0u8; bytes_per_sector];
        device.dev_read(0, &mut boot, bytes_per_sector)?;
        let bpb = BiosParameterBlock::parse(&boot, 0).ok_or_else(|| {
            warn!("mount: unpartitioned boot sector failed to parse");
            MountError::BadVolume
        })?;
        if !bpb.is_valid() {
            warn!("mount: unpartitioned boot sector has an invalid layout");
            return Err(MountError::BadVolume);
        }
        let layout = VolumeLayout::from_bpb(&bpb);
        let cache = SectorCache::new(Arc::clone(&device), layout.bytes_per_sector);
        Ok(Self { device, cache, layout })
    }

    pub fn layout(&self) -> VolumeLayout {
        self.layout
    }

    pub fn fat(&mut self) -> FatTable<'_> {
        FatTable::new(
            &mut self.cache,
            self.layout.first_fat_sector,
            self.layout.bytes_per_sector,
            self.layout.num_clusters,
            self.layout.variant,
        )
    }

    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    /// `stats(volume) -> {total, free, alloc}`, counted by scanning the FAT
    /// (spec.md §6).
    pub fn stats(&mut self) -> Result<VolumeStats, crate::fat::FatError> {
        let total = self.layout.num_clusters as u32;
        let mut free = 0u32;
        let mut fat = self.fat();
        for cluster in CLUSTER_FIRST_DATA..(total + CLUSTER_FIRST_DATA) {
            if fat.get(cluster)? == 0 {
                free += 1;
            }
        }
        Ok(VolumeStats {
            total,
            free,
            alloc: total - free,
        })
    }

    pub fn flush(&mut self) -> Result<(), DeviceError> {
        self.cache.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub total: u32,
    pub free: u32,
    pub alloc: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_fat32_image, RamDisk};

    #[test]
    fn mounts_a_freshly_formatted_volume() {
        let image = build_fat32_image(512, 8, 64);
        let dev = Arc::new(RamDisk::from_image(image));
        let volume = Volume::mount_unpartitioned(dev, 512).unwrap();
        assert_eq!(volume.layout().variant, FatVariant::Fat32);
        assert_eq!(volume.layout().root_dir_cluster, 2);
    }

    #[test]
    fn stats_reports_all_clusters_free_on_a_fresh_volume() {
        let image = build_fat32_image(512, 8, 64);
        let dev = Arc::new(RamDisk::from_image(image));
        let mut volume = Volume::mount_unpartitioned(dev, 512).unwrap();
        let stats = volume.stats().unwrap();
        assert_eq!(stats.total, 64);
        assert_eq!(stats.free, 64);
        assert_eq!(stats.alloc, 0);
    }

    #[test]
    fn rejects_a_bare_boot_sector_when_an_mbr_is_expected() {
        let image = build_fat32_image(512, 8, 64);
        let dev = Arc::new(RamDisk::from_image(image));
        assert!(Volume::mount(dev).is_err());
    }
}
