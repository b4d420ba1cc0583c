//! On-disk segment directory.
//!
//! ```text
//! <dir>/spineCount-<N>   zero-byte marker; exactly one per initialized directory
//! <dir>/spine-<index>    one file per populated spine (see `spine` for bodies)
//! ```
//!
//! Spine files are replaced atomically: written to `spine-<index>.tmp` and
//! renamed over the old file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SpineError};

const COUNT_PREFIX: &str = "spineCount-";
const SPINE_PREFIX: &str = "spine-";
const TMP_SUFFIX: &str = ".tmp";

/// Handle on one segment directory.
#[derive(Debug, Clone)]
pub struct SpineDirectory {
    path: PathBuf,
}

impl SpineDirectory {
    /// Open `path`, creating it if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| SpineError::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_names(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.path).map_err(|e| SpineError::io(&self.path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SpineError::io(&self.path, e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn count_markers(&self) -> Result<Vec<(String, usize)>> {
        let mut markers = Vec::new();
        for name in self.file_names()? {
            if let Some(n) = name.strip_prefix(COUNT_PREFIX) {
                let count = n.parse::<usize>().map_err(|_| {
                    SpineError::Inconsistent(format!("unparseable marker {}", name))
                })?;
                markers.push((name, count));
            }
        }
        Ok(markers)
    }

    /// Spine count recorded by the marker. No marker means an uninitialized
    /// directory (0); several markers are an error.
    pub fn spine_count(&self) -> Result<usize> {
        let markers = self.count_markers()?;
        match markers.as_slice() {
            [] => Ok(0),
            [(_, count)] => Ok(*count),
            many => Err(SpineError::Inconsistent(format!(
                "{} spine count markers in {}",
                many.len(),
                self.path.display()
            ))),
        }
    }

    /// Replace whatever markers exist with `spineCount-<count>`.
    pub fn write_spine_count(&self, count: usize) -> Result<()> {
        for (name, _) in self.count_markers()? {
            let path = self.path.join(&name);
            fs::remove_file(&path).map_err(|e| SpineError::io(&path, e))?;
        }
        let path = self.path.join(format!("{}{}", COUNT_PREFIX, count));
        fs::File::create(&path).map_err(|e| SpineError::io(&path, e))?;
        Ok(())
    }

    fn spine_path(&self, index: usize) -> PathBuf {
        self.path.join(format!("{}{}", SPINE_PREFIX, index))
    }

    /// Raw bytes of `spine-<index>`, or `None` when the spine was never written.
    pub fn read_spine(&self, index: usize) -> Result<Option<Vec<u8>>> {
        let path = self.spine_path(index);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SpineError::io(path, e)),
        }
    }

    pub fn write_spine(&self, index: usize, bytes: &[u8]) -> Result<()> {
        let path = self.spine_path(index);
        let tmp = self.path.join(format!("{}{}{}", SPINE_PREFIX, index, TMP_SUFFIX));
        {
            let mut file = fs::File::create(&tmp).map_err(|e| SpineError::io(&tmp, e))?;
            file.write_all(bytes).map_err(|e| SpineError::io(&tmp, e))?;
            file.sync_all().map_err(|e| SpineError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| SpineError::io(&path, e))?;
        debug!(index, bytes = bytes.len(), "wrote spine");
        Ok(())
    }

    /// Indices of every `spine-<index>` file, ascending. Leftover temp files
    /// are ignored.
    pub fn spine_indices(&self) -> Result<Vec<usize>> {
        let mut indices: Vec<usize> = self
            .file_names()?
            .iter()
            .filter_map(|name| name.strip_prefix(SPINE_PREFIX))
            .filter_map(|rest| rest.parse::<usize>().ok())
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_has_no_spines() {
        let dir = tempfile::tempdir().unwrap();
        let seg = SpineDirectory::open(dir.path().join("taxonomy")).unwrap();
        assert_eq!(seg.spine_count().unwrap(), 0);
        assert!(seg.spine_indices().unwrap().is_empty());
        assert!(seg.read_spine(0).unwrap().is_none());
    }

    #[test]
    fn marker_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let seg = SpineDirectory::open(dir.path()).unwrap();
        seg.write_spine_count(3).unwrap();
        seg.write_spine_count(17).unwrap();
        assert_eq!(seg.spine_count().unwrap(), 17);
        assert!(dir.path().join("spineCount-17").exists());
        assert!(!dir.path().join("spineCount-3").exists());
    }

    #[test]
    fn two_markers_are_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let seg = SpineDirectory::open(dir.path()).unwrap();
        fs::File::create(dir.path().join("spineCount-1")).unwrap();
        fs::File::create(dir.path().join("spineCount-2")).unwrap();
        assert!(matches!(seg.spine_count(), Err(SpineError::Inconsistent(_))));
    }

    #[test]
    fn spine_files_roundtrip_and_ignore_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let seg = SpineDirectory::open(dir.path()).unwrap();
        seg.write_spine(4, &[0, 0, 0, 1, 0, 0, 0, 9]).unwrap();
        seg.write_spine(0, &[0, 0, 0, 0]).unwrap();
        fs::write(dir.path().join("spine-9.tmp"), b"junk").unwrap();
        seg.write_spine_count(5).unwrap();
        assert_eq!(seg.spine_indices().unwrap(), vec![0, 4]);
        assert_eq!(seg.read_spine(4).unwrap().unwrap(), vec![0, 0, 0, 1, 0, 0, 0, 9]);
    }
}
