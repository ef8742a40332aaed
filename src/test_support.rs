//! In-memory block device for tests.
//!
//! The teacher ships no tests; the pack's other no_std FAT crate
//! (`rrbutani-fatfs`) and the teacher's own `std` companion binary
//! (`examples/fat32-fs-std`) both back their driver with a `std`-backed
//! device over a plain `Vec<u8>`/file to exercise it off target hardware.
//! This follows the same idea but keeps `spin::Mutex` (already a
//! dependency) instead of reaching for `std::sync::RwLock`, since the rest
//! of the crate is no_std.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::device::{BlockDevice, DeviceError};

pub struct RamDisk {
    bytes: Mutex<Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(num_sectors: usize, bytes_per_sector: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; num_sectors * bytes_per_sector]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(image),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn read_byte(&self, offset: usize, index: usize) -> u8 {
        self.bytes.lock()[offset + index]
    }
}

/// Builds a minimal, freshly-formatted FAT32 image: no MBR (tests mount it
/// with [`crate::volume::Volume::mount_unpartitioned`]), one FAT, root
/// directory at cluster 2, everything else zeroed.
pub fn build_fat32_image(bytes_per_sector: usize, sectors_per_cluster: usize, num_clusters: usize) -> Vec<u8> {
    let num_fats = 1usize;
    let rsvd_sec_cnt = 1usize;
    let fat_bytes_needed = (num_clusters + 2) * 4;
    let fat_sz32 = (fat_bytes_needed + bytes_per_sector - 1) / bytes_per_sector;
    let first_data_sector = rsvd_sec_cnt + num_fats * fat_sz32;
    let total_sectors = first_data_sector + num_clusters * sectors_per_cluster;

    let mut image = vec![0u8; total_sectors * bytes_per_sector];

    image[0] = 0xEB;
    image[1] = 0x3C;
    image[2] = 0x90;
    image[11..13].copy_from_slice(&(bytes_per_sector as u16).to_le_bytes());
    image[13] = sectors_per_cluster as u8;
    image[14..16].copy_from_slice(&(rsvd_sec_cnt as u16).to_le_bytes());
    image[16] = num_fats as u8;
    image[21] = 0xF8;
    image[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes());
    image[36..40].copy_from_slice(&(fat_sz32 as u32).to_le_bytes());
    image[44..48].copy_from_slice(&2u32.to_le_bytes());
    image[bytes_per_sector - 2] = 0x55;
    image[bytes_per_sector - 1] = 0xAA;

    image
}

impl BlockDevice for RamDisk {
    fn dev_read(&self, byte_offset: usize, buf: &mut [u8], n: usize) -> Result<(), DeviceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let data = self.bytes.lock();
        if byte_offset + n > data.len() {
            return Err(DeviceError::ReadError);
        }
        buf[..n].copy_from_slice(&data[byte_offset..byte_offset + n]);
        Ok(())
    }

    fn dev_write(&self, byte_offset: usize, buf: &[u8], n: usize) -> Result<(), DeviceError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.bytes.lock();
        if byte_offset + n > data.len() {
            return Err(DeviceError::WriteError);
        }
        data[byte_offset..byte_offset + n].copy_from_slice(&buf[..n]);
        Ok(())
    }
}
