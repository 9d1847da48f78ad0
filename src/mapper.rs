use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{Error, Result};

/// A read-only view of a whole file, unmapped on drop.
pub struct MappedFile {
    // Zero-length files are never mapped.
    map: Option<Mmap>,
}

impl MappedFile {
    pub fn open(path: impl AsRef<Path>, huge_pages: bool) -> Result<Self> {
        let path = path.as_ref();
        let io_error = |op, source| Error::Io {
            op,
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(|e| io_error("open", e))?;
        let len = file.metadata().map_err(|e| io_error("stat", e))?.len();
        if len == 0 {
            return Ok(Self { map: None });
        }

        // SAFETY: the mapping is read-only and the input is not expected to
        // change while the run is in progress.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| io_error("map", e))?;
        advise(&map, huge_pages);

        debug!(path = %path.display(), len, "mapped input");
        Ok(Self { map: Some(map) })
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes()
    }
}

/// Access hints only; a rejected hint never fails the run.
#[cfg(unix)]
fn advise(map: &Mmap, huge_pages: bool) {
    use memmap2::Advice;

    if let Err(e) = map.advise(Advice::Sequential) {
        debug!("sequential advice rejected: {e}");
    }
    #[cfg(target_os = "linux")]
    if huge_pages {
        if let Err(e) = map.advise(Advice::HugePage) {
            debug!("huge page advice rejected: {e}");
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = huge_pages;
}

#[cfg(not(unix))]
fn advise(_map: &Mmap, _huge_pages: bool) {}
