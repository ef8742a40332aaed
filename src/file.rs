//! File lifecycle: open, create, read, write, lseek, close, unlink.
//!
//! Grounded on the teacher's `file.rs` (`File` trait: `read`/`write`) and
//! `vfs.rs` (`read_at`/`write_at`/`incerase_size`/`clear`), restructured
//! into the explicit operations spec.md §4.8 names. File data transfers
//! bypass the sector cache entirely and go straight to the device, kept
//! from the teacher's direct-device-read idiom in `File::read` — here
//! deliberately generalized to *every* file data transfer (not just whole
//! clusters), since the cache's one slot must stay free for the FAT/
//! directory sector the path resolver or iterator is holding (spec.md
//! §4.8, §5).

use crate::cache::Cache;
use crate::dir::{self, DirError};
use crate::entry::ShortDirEntry;
use crate::fat::FatError;
use crate::path::{self, Resolved};
use crate::volume::Volume;
use crate::{ATTR_ARCHIVE, CLUSTER_EOC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileError {
    IsDir,
    InvalidMode,
    NotFound,
    OutOfSpace,
    Corrupt,
    Device(crate::device::DeviceError),
}

impl From<crate::device::DeviceError> for FileError {
    fn from(e: crate::device::DeviceError) -> Self {
        FileError::Device(e)
    }
}

impl From<DirError> for FileError {
    fn from(e: DirError) -> Self {
        match e {
            DirError::NotFound => FileError::NotFound,
            DirError::IsDir | DirError::NotDir | DirError::NameExists => FileError::IsDir,
            DirError::Corrupt => FileError::Corrupt,
            DirError::OutOfSpace => FileError::OutOfSpace,
            DirError::Device(d) => FileError::Device(d),
        }
    }
}

impl From<FatError> for FileError {
    fn from(e: FatError) -> Self {
        match e {
            FatError::OutOfSpace => FileError::OutOfSpace,
            FatError::Corrupt => FileError::Corrupt,
            FatError::Device(d) => FileError::Device(d),
        }
    }
}

/// Open-mode flags (spec.md §6). Plain fields rather than a `bitflags`
/// struct, matching the teacher's habit of small hand-rolled enums over
/// pulling in a flags crate it never depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub write: bool,
    pub create: bool,
    pub trunc: bool,
    pub append: bool,
    /// Accepted but unenforced — spec.md §9 open question.
    pub excl: bool,
}

impl OpenFlags {
    pub fn rdonly() -> Self {
        Self::default()
    }

    pub fn wronly() -> Self {
        Self { write: true, ..Self::default() }
    }

    pub fn rdwr() -> Self {
        Self { write: true, ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// `{Unopened -> Open(position, cluster_cursor) -> Closed}` (spec.md §4.8):
/// this type only ever models the `Open` state — there is no handle for
/// `Unopened`/`Closed`, matching the state machine's actual transitions.
pub struct File {
    start_cluster: u32,
    current_cluster: u32,
    offset: usize,
    size: usize,
    writable: bool,
    dir_cluster: u32,
    entry_sector: usize,
    entry_offset: usize,
}

impl File {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn cluster_cursor_for(volume: &mut Volume, start: u32, target_offset: usize) -> Result<u32, FileError> {
        let bytes_per_cluster = volume.layout().bytes_per_cluster;
        let steps = if bytes_per_cluster == 0 { 0 } else { target_offset / bytes_per_cluster };
        let mut cluster = start;
        let mut fat = volume.fat();
        for _ in 0..steps {
            let next = fat.get_checked(cluster)?;
            if next == CLUSTER_EOC {
                break;
            }
            cluster = next;
        }
        Ok(cluster)
    }
}

/// `open(path, mode)`: resolves the path; `TRUNC` zeroes the size,
/// `APPEND` seeks to the end, `CREAT` on a missing file defers to
/// `create`.
pub fn open(volume: &mut Volume, path: &str, flags: OpenFlags) -> Result<File, FileError> {
    let layout = volume.layout();
    let resolved = {
        path::resolve(&mut volume.cache, &layout, path)?
    };

    match resolved {
        Resolved::Found(handle) => {
            if handle.is_dir {
                return Err(FileError::IsDir);
            }

            let mut size = handle.entry.file_size as usize;
            let mut start_cluster = handle.cluster;

            if flags.trunc && flags.write {
                size = 0;
                let mut zeroed = handle.entry;
                zeroed.file_size = 0;
                dir::write_entry(&mut volume.cache, handle.sector, handle.offset, &zeroed)?;
                volume.fat().free_chain(start_cluster)?;
                let new_cluster = volume.fat().allocate_n(1)?;
                if new_cluster == 0 {
                    return Err(FileError::OutOfSpace);
                }
                let mut updated = zeroed;
                updated.set_cluster(new_cluster);
                dir::write_entry(&mut volume.cache, handle.sector, handle.offset, &updated)?;
                start_cluster = new_cluster;
            }

            let offset = if flags.append { size } else { 0 };
            let current_cluster = File::cluster_cursor_for(volume, start_cluster, offset)?;

            Ok(File {
                start_cluster,
                current_cluster,
                offset,
                size,
                writable: flags.write,
                dir_cluster: 0,
                entry_sector: handle.sector,
                entry_offset: handle.offset,
            })
        }
        Resolved::NotFound { parent_cluster, name } => {
            if !flags.create {
                return Err(FileError::NotFound);
            }
            create(volume, parent_cluster, &name)
        }
    }
}

/// `create(path, size=0)`: allocates one initial cluster, finds a free
/// slot in the parent directory, and writes a short entry (spec.md §4.8).
pub fn create(volume: &mut Volume, parent_cluster: u32, name: &str) -> Result<File, FileError> {
    let layout = volume.layout();

    let start_cluster = volume.fat().allocate_n(1)?;
    if start_cluster == 0 {
        return Err(FileError::OutOfSpace);
    }

    let (sector, offset) = dir::find_free_slot(&mut volume.cache, &layout, parent_cluster)?;
    let entry = ShortDirEntry::new_file(name, start_cluster, ATTR_ARCHIVE);
    dir::write_entry(&mut volume.cache, sector, offset, &entry)?;
    volume.flush()?;

    Ok(File {
        start_cluster,
        current_cluster: start_cluster,
        offset: 0,
        size: 0,
        writable: true,
        dir_cluster: parent_cluster,
        entry_sector: sector,
        entry_offset: offset,
    })
}

/// Computes the device byte offset for `file`'s current cluster/offset
/// pair, and how many bytes remain before the next cluster boundary.
fn current_device_position(volume: &Volume, file: &File) -> (usize, usize) {
    let layout = volume.layout();
    let bytes_per_cluster = layout.bytes_per_cluster;
    let within_cluster = file.offset % bytes_per_cluster.max(1);
    let sector_index = within_cluster / layout.bytes_per_sector;
    let byte_in_sector = within_cluster % layout.bytes_per_sector;
    let sector = layout.sector_of_cluster(file.current_cluster) + sector_index;
    let device_offset = sector * layout.bytes_per_sector + byte_in_sector;
    let remaining_in_cluster = bytes_per_cluster - within_cluster;
    (device_offset, remaining_in_cluster)
}

/// `read(file, buf, n)`: clamps to `size - offset`, transfers directly
/// through the device (bypassing the sector cache), and follows the FAT
/// chain at cluster boundaries. Returns bytes delivered so far if the
/// chain ends mid-request.
pub fn read(volume: &mut Volume, file: &mut File, buf: &mut [u8]) -> Result<usize, FileError> {
    let remaining_in_file = file.size.saturating_sub(file.offset);
    let to_read = buf.len().min(remaining_in_file);
    let mut delivered = 0;

    while delivered < to_read {
        let (device_offset, remaining_in_cluster) = current_device_position(volume, file);
        let chunk = (to_read - delivered).min(remaining_in_cluster);
        if chunk == 0 {
            break;
        }

        volume
            .device()
            .clone()
            .dev_read(device_offset, &mut buf[delivered..delivered + chunk], chunk)?;

        delivered += chunk;
        file.offset += chunk;

        let crossed_cluster = file.offset % volume.layout().bytes_per_cluster == 0;
        if crossed_cluster && delivered < to_read {
            let next = volume.fat().get_checked(file.current_cluster)?;
            if next == CLUSTER_EOC {
                break;
            }
            file.current_cluster = next;
        }
    }

    Ok(delivered)
}

/// `write(file, buf, n)`: same geometry as `read` but through a direct
/// device write, allocating a fresh cluster and splicing it onto the
/// chain at each boundary. Updates `size` and persists it to the
/// directory slot afterward.
pub fn write(volume: &mut Volume, file: &mut File, buf: &[u8]) -> Result<usize, FileError> {
    if !file.writable {
        return Err(FileError::InvalidMode);
    }

    let mut delivered = 0;

    while delivered < buf.len() {
        let (device_offset, remaining_in_cluster) = current_device_position(volume, file);
        let chunk = (buf.len() - delivered).min(remaining_in_cluster);
        if chunk == 0 {
            break;
        }

        volume
            .device()
            .clone()
            .dev_write(device_offset, &buf[delivered..delivered + chunk], chunk)?;

        delivered += chunk;
        file.offset += chunk;

        let crossed_cluster = file.offset % volume.layout().bytes_per_cluster == 0;
        if crossed_cluster && delivered < buf.len() {
            let new_cluster = volume.fat().allocate_n(1)?;
            if new_cluster == 0 {
                break;
            }
            volume.fat().append(file.current_cluster, new_cluster)?;
            file.current_cluster = new_cluster;
        }
    }

    file.size = file.size.max(file.offset);
    let mut entry = volume
        .cache
        .read(file.entry_sector, file.entry_offset, |e: &ShortDirEntry| *e)?;
    entry.file_size = file.size as u32;
    dir::write_entry(&mut volume.cache, file.entry_sector, file.entry_offset, &entry)?;
    volume.flush()?;

    Ok(delivered)
}

/// `lseek(file, off, whence)`: clamps into `[0, size]` and resyncs the
/// cluster cursor by walking from `start_cluster`.
pub fn lseek(volume: &mut Volume, file: &mut File, off: i64, whence: Whence) -> Result<usize, FileError> {
    let base = match whence {
        Whence::Set => 0i64,
        Whence::Cur => file.offset as i64,
        Whence::End => file.size as i64,
    };
    let new_offset = (base + off).clamp(0, file.size as i64) as usize;
    file.offset = new_offset;
    file.current_cluster = File::cluster_cursor_for(volume, file.start_cluster, new_offset)?;
    Ok(new_offset)
}

/// `close(file)`: releases the handle. Dirty state was already flushed by
/// `write`; this performs no I/O itself.
pub fn close(_file: File) {}

/// `unlink(path)`: resolves, fails on a missing or directory target, frees
/// the chain, then re-scans the parent directory to mark the short entry
/// (and any preceding long-name fragments) deleted.
pub fn unlink(volume: &mut Volume, path: &str) -> Result<(), FileError> {
    let layout = volume.layout();
    let resolved = path::resolve(&mut volume.cache, &layout, path)?;

    let handle = match resolved {
        Resolved::Found(h) => h,
        Resolved::NotFound { .. } => return Err(FileError::NotFound),
    };
    if handle.is_dir {
        return Err(FileError::IsDir);
    }

    volume.fat().free_chain(handle.cluster)?;

    // Re-derive the parent cluster by resolving everything but the last
    // component again; cheaper alternatives would require the resolver to
    // also hand back the parent cluster on a *successful* lookup, which
    // spec.md §4.7 only requires on failure.
    let parent_cluster = parent_of(volume, path)?;
    dir::delete_entry_and_lfns(&mut volume.cache, &layout, parent_cluster, handle.sector, handle.offset)?;
    volume.flush()?;
    Ok(())
}

fn parent_of(volume: &mut Volume, path: &str) -> Result<u32, FileError> {
    let layout = volume.layout();
    let trimmed = path.trim_end_matches('/');
    let parent_path = match trimmed.rfind('/') {
        Some(0) => "/",
        Some(i) => &trimmed[..i],
        None => "/",
    };
    if parent_path == "/" {
        return Ok(layout.root_dir_cluster);
    }
    match path::resolve(&mut volume.cache, &layout, parent_path)? {
        Resolved::Found(h) if h.is_dir => Ok(h.cluster),
        Resolved::Found(_) => Err(FileError::IsDir),
        Resolved::NotFound { .. } => Err(FileError::NotFound),
    }
}
