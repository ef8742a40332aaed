//! BIOS Parameter Block (BPB) and boot sector parsing.
//!
//! Kept from the teacher's `bpb.rs`: the packed, little-endian `BasicBPB`
//! (the DOS 2.0/3.31 fields common to every FAT variant) plus a 54-byte
//! extension block read by field accessors rather than memcpy, so nothing
//! ever borrows across a sector re-read. The teacher only ever builds the
//! FAT32 extension (`BPB32`) and keeps `BPB12_16` as dead, reserved fields;
//! here both extensions are live and selected by `FatVariant`, grounded
//! secondarily on `rrbutani-fatfs/src/fat/boot_sector.rs`'s DOS 2.0 / DOS
//! 3.31 split of the same boot sector.

use crate::{MAX_CLUSTER_FAT16};

pub const BPB_OFFSET: usize = 11;

#[derive(Debug, Clone, Copy)]
#[repr(packed)]
pub struct BasicBPB {
    pub(crate) bs_jmp_boot: [u8; 3],
    pub(crate) bs_oem_name: [u8; 8],
    pub(crate) byts_per_sec: u16,
    pub(crate) sec_per_clus: u8,
    pub(crate) rsvd_sec_cnt: u16,
    pub(crate) num_fats: u8,
    pub(crate) root_ent_cnt: u16,
    pub(crate) tot_sec16: u16,
    pub(crate) media: u8,
    pub(crate) fat_sz16: u16,
    pub(crate) sec_per_trk: u16,
    pub(crate) num_heads: u16,
    pub(crate) hidd_sec: u32,
    pub(crate) tot_sec32: u32,
}

/// FAT32 boot-sector extension, starting at offset 36 (0x24).
#[derive(Debug, Clone, Copy)]
#[repr(packed)]
pub struct Bpb32 {
    pub(crate) fat_sz32: u32,
    pub(crate) ext_flags: u16,
    pub(crate) fs_ver: u16,
    pub(crate) root_clus: u32,
    pub(crate) fs_info: u16,
    pub(crate) bk_boot_sec: u16,
    pub(crate) reserved: [u8; 12],
    pub(crate) bs_drv_num: u8,
    pub(crate) bs_reserved1: u8,
    pub(crate) bs_boot_sig: u8,
    pub(crate) bs_vol_id: u32,
    pub(crate) bs_vol_lab: [u8; 11],
    pub(crate) bs_fil_sys_type: [u8; 8],
}

/// FAT12/16 boot-sector extension, starting at the same offset. The
/// teacher reserves this struct unused; spec.md §2 requires FAT16 support
/// so it is activated here.
#[derive(Debug, Clone, Copy)]
#[repr(packed)]
pub struct Bpb16 {
    pub(crate) bs_drv_num: u8,
    pub(crate) bs_reserved1: u8,
    pub(crate) bs_boot_sig: u8,
    pub(crate) bs_vol_id: u32,
    pub(crate) bs_vol_lab: [u8; 11],
    pub(crate) bs_fil_sys_type: [u8; 8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatVariant {
    Fat16,
    Fat32,
}

#[derive(Debug, Clone, Copy)]
pub enum Extension {
    Fat16(Bpb16),
    Fat32(Bpb32),
}

/// Parsed boot sector: common fields plus the variant-specific extension,
/// already adjusted for the partition's starting LBA (spec.md §4.2 steps
/// 4-10).
#[derive(Debug, Clone, Copy)]
pub struct BiosParameterBlock {
    pub basic: BasicBPB,
    pub ext: Extension,
    /// Sector offset of the partition this volume lives in (0 for an
    /// unpartitioned device — never produced by `mbr::read_first_partition`
    /// but useful for tests that hand-build a volume without an MBR).
    pub partition_start: usize,
}

impl BiosParameterBlock {
    /// Parses the 90-byte BPB region out of a raw boot sector buffer.
    /// `partition_start` is the sector offset the MBR step handed back.
    pub fn parse(buf: &[u8], partition_start: usize) -> Option<Self> {
        if buf.len() < 90 {
            return None;
        }
        let basic = BasicBPB {
            bs_jmp_boot: [buf[0], buf[1], buf[2]],
            bs_oem_name: buf[3..11].try_into().ok()?,
            byts_per_sec: u16::from_le_bytes([buf[11], buf[12]]),
            sec_per_clus: buf[13],
            rsvd_sec_cnt: u16::from_le_bytes([buf[14], buf[15]]),
            num_fats: buf[16],
            root_ent_cnt: u16::from_le_bytes([buf[17], buf[18]]),
            tot_sec16: u16::from_le_bytes([buf[19], buf[20]]),
            media: buf[21],
            fat_sz16: u16::from_le_bytes([buf[22], buf[23]]),
            sec_per_trk: u16::from_le_bytes([buf[24], buf[25]]),
            num_heads: u16::from_le_bytes([buf[26], buf[27]]),
            hidd_sec: u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]),
            tot_sec32: u32::from_le_bytes([buf[32], buf[33], buf[34], buf[35]]),
        };

        let ext = if basic.fat_sz16 == 0 {
            // FAT32: fat_sz32 lives at the start of the extension block.
            let e = buf.get(36..90)?;
            Extension::Fat32(Bpb32 {
                fat_sz32: u32::from_le_bytes([e[0], e[1], e[2], e[3]]),
                ext_flags: u16::from_le_bytes([e[4], e[5]]),
                fs_ver: u16::from_le_bytes([e[6], e[7]]),
                root_clus: u32::from_le_bytes([e[8], e[9], e[10], e[11]]),
                fs_info: u16::from_le_bytes([e[12], e[13]]),
                bk_boot_sec: u16::from_le_bytes([e[14], e[15]]),
                reserved: e[16..28].try_into().ok()?,
                bs_drv_num: e[28],
                bs_reserved1: e[29],
                bs_boot_sig: e[30],
                bs_vol_id: u32::from_le_bytes([e[31], e[32], e[33], e[34]]),
                bs_vol_lab: e[35..46].try_into().ok()?,
                bs_fil_sys_type: e[46..54].try_into().ok()?,
            })
        } else {
            let e = buf.get(36..62)?;
            Extension::Fat16(Bpb16 {
                bs_drv_num: e[0],
                bs_reserved1: e[1],
                bs_boot_sig: e[2],
                bs_vol_id: u32::from_le_bytes([e[3], e[4], e[5], e[6]]),
                bs_vol_lab: e[7..18].try_into().ok()?,
                bs_fil_sys_type: e[18..26].try_into().ok()?,
            })
        };

        Some(Self { basic, ext, partition_start })
    }

    pub fn variant(&self) -> FatVariant {
        match self.ext {
            Extension::Fat16(_) => FatVariant::Fat16,
            Extension::Fat32(_) => FatVariant::Fat32,
        }
    }

    pub fn bytes_per_sector(&self) -> usize {
        self.basic.byts_per_sec as usize
    }

    pub fn sectors_per_cluster(&self) -> usize {
        self.basic.sec_per_clus as usize
    }

    pub fn bytes_per_cluster(&self) -> usize {
        self.bytes_per_sector() * self.sectors_per_cluster()
    }

    /// `num_fat_sectors = bpbFATsecs ?: bpbBigFATsecs` (spec.md §4.2 step 4).
    pub fn num_fat_sectors(&self) -> usize {
        if self.basic.fat_sz16 != 0 {
            self.basic.fat_sz16 as usize
        } else {
            match self.ext {
                Extension::Fat32(e) => e.fat_sz32 as usize,
                Extension::Fat16(_) => 0,
            }
        }
    }

    /// `⌈(bpbRootDirEnts × 32) / bpbBytesPerSec⌉`, zero on FAT32.
    pub fn root_dir_sectors(&self) -> usize {
        let bps = self.bytes_per_sector();
        ((self.basic.root_ent_cnt as usize) * 32 + bps - 1) / bps.max(1)
    }

    pub fn first_fat_sector(&self) -> usize {
        self.basic.rsvd_sec_cnt as usize + self.partition_start
    }

    pub fn first_data_sector(&self) -> usize {
        self.basic.rsvd_sec_cnt as usize
            + (self.basic.num_fats as usize) * self.num_fat_sectors()
            + self.root_dir_sectors()
            + self.partition_start
    }

    /// FAT16 root directory region start; meaningless on FAT32.
    pub fn first_dir_sector(&self) -> usize {
        self.basic.rsvd_sec_cnt as usize
            + (self.basic.num_fats as usize) * self.basic.fat_sz16 as usize
            + self.partition_start
    }

    pub fn root_dir_cluster(&self) -> u32 {
        match self.ext {
            Extension::Fat32(e) => e.root_clus,
            Extension::Fat16(_) => 0,
        }
    }

    fn total_sectors(&self) -> usize {
        if self.basic.tot_sec16 != 0 {
            self.basic.tot_sec16 as usize
        } else {
            self.basic.tot_sec32 as usize
        }
    }

    pub fn num_clusters(&self) -> usize {
        let spc = self.sectors_per_cluster();
        if spc == 0 {
            return 0;
        }
        let data_sectors = self.total_sectors().saturating_sub(self.first_data_sector());
        data_sectors / spc
    }

    /// Mount-time layout check (spec.md §4.2 final paragraph).
    pub fn is_valid(&self) -> bool {
        self.bytes_per_sector() != 0 && self.bytes_per_cluster() != 0
    }

    /// Sanity check against the derived cluster count, matching the
    /// teacher's `fat_type()` classification boundary (spec.md explicitly
    /// drops FAT12: `MAX_CLUSTER_FAT16` is the only boundary left to check).
    pub fn matches_variant_cluster_count(&self) -> bool {
        match self.variant() {
            FatVariant::Fat16 => self.num_clusters() < MAX_CLUSTER_FAT16,
            FatVariant::Fat32 => self.num_clusters() >= MAX_CLUSTER_FAT16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_fat32_image;

    #[test]
    fn parses_a_freshly_formatted_fat32_boot_sector() {
        let image = build_fat32_image(512, 4, 128);
        let bpb = BiosParameterBlock::parse(&image[..512], 0).unwrap();
        assert_eq!(bpb.variant(), FatVariant::Fat32);
        assert_eq!(bpb.bytes_per_sector(), 512);
        assert_eq!(bpb.sectors_per_cluster(), 4);
        assert_eq!(bpb.root_dir_cluster(), 2);
        assert!(bpb.is_valid());
    }

    #[test]
    fn rejects_a_truncated_buffer() {
        let short = alloc::vec![0u8; 32];
        assert!(BiosParameterBlock::parse(&short, 0).is_none());
    }

    #[test]
    fn selects_the_fat16_extension_when_fat_sz16_is_nonzero() {
        let mut buf = alloc::vec![0u8; 512];
        buf[11..13].copy_from_slice(&512u16.to_le_bytes());
        buf[13] = 4;
        buf[14..16].copy_from_slice(&1u16.to_le_bytes());
        buf[16] = 1;
        buf[17..19].copy_from_slice(&512u16.to_le_bytes()); // root_ent_cnt
        buf[19..21].copy_from_slice(&2048u16.to_le_bytes()); // tot_sec16
        buf[22..24].copy_from_slice(&8u16.to_le_bytes()); // fat_sz16

        let bpb = BiosParameterBlock::parse(&buf, 0).unwrap();
        assert_eq!(bpb.variant(), FatVariant::Fat16);
        assert_eq!(bpb.num_fat_sectors(), 8);
        assert!(bpb.root_dir_sectors() > 0);
    }

    #[test]
    fn partition_start_offsets_every_derived_sector() {
        let image = build_fat32_image(512, 4, 128);
        let bpb_at_zero = BiosParameterBlock::parse(&image[..512], 0).unwrap();
        let bpb_offset = BiosParameterBlock::parse(&image[..512], 63).unwrap();
        assert_eq!(bpb_offset.first_fat_sector(), bpb_at_zero.first_fat_sector() + 63);
        assert_eq!(bpb_offset.first_data_sector(), bpb_at_zero.first_data_sector() + 63);
    }
}
