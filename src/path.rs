//! Path resolution.
//!
//! Grounded on the teacher's `Dir::find` (`dir.rs`), a recursive component
//! walk — restructured per spec.md §4.7 to report the parent directory's
//! cluster on a failed non-terminal lookup, so `create` can proceed
//! without re-walking the path. The teacher never needs this: its
//! `Dir::create` always starts from an already-held parent `VirtFile`.

use alloc::vec::Vec;

use crate::cache::SectorCache;
use crate::dir::{self, DirEntryHandle, DirError};
use crate::volume::VolumeLayout;

/// Outcome of resolving an absolute, slash-separated path.
pub enum Resolved {
    Found(DirEntryHandle),
    /// The terminal component was not found; `parent_cluster` is where a
    /// `create` should write the new entry, and `name` is the final
    /// component to use.
    NotFound { parent_cluster: u32, name: alloc::string::String },
}

/// Splits `/a/b/c` into `["a", "b", "c"]`, ignoring empty components from
/// leading/duplicate/trailing slashes.
fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Walks `path` from the root. Non-terminal components that don't match a
/// directory fail outright; a missing non-terminal component fails with no
/// parent reported (so creation correctly refuses to create through a
/// missing intermediate directory).
pub fn resolve(
    cache: &mut SectorCache,
    layout: &VolumeLayout,
    path: &str,
) -> Result<Resolved, DirError> {
    let comps = components(path);
    if comps.is_empty() {
        return Err(DirError::IsDir);
    }

    let mut current_cluster = layout.root_dir_cluster;

    for (i, comp) in comps.iter().enumerate() {
        let is_terminal = i == comps.len() - 1;
        match dir::find(cache, layout, current_cluster, comp)? {
            Some(handle) => {
                if is_terminal {
                    return Ok(Resolved::Found(handle));
                }
                if !handle.is_dir {
                    return Err(DirError::NotDir);
                }
                current_cluster = handle.cluster;
            }
            None => {
                if is_terminal {
                    return Ok(Resolved::NotFound {
                        parent_cluster: current_cluster,
                        name: alloc::string::String::from(*comp),
                    });
                }
                return Err(DirError::NotFound);
            }
        }
    }

    unreachable!("comps is non-empty, loop always returns")
}
