//! Read-only memory-mapped access to a KERO file.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;

/// A read-only contiguous byte view over a whole file.
///
/// Useful for decoding minimizer section columns without seek/read cycles;
/// see [`MinimizerSectionReader::precache_columns_from_mmap`](crate::section::MinimizerSectionReader::precache_columns_from_mmap).
/// The mapping is dropped together with the accessor.
pub struct MmapAccessor {
    mmap: Mmap,
}

impl MmapAccessor {
    /// Opens and maps the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and KERO files are single-writer;
        // the file is not mutated while mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    /// The mapped file contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Size of the mapped file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_map_round_trip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"KERO mapped bytes").unwrap();
        tmp.flush().unwrap();

        let map = MmapAccessor::open(tmp.path()).unwrap();
        assert_eq!(map.len(), 17);
        assert_eq!(map.as_bytes(), b"KERO mapped bytes");
    }

    #[test]
    fn test_missing_file() {
        assert!(MmapAccessor::open("./does-not-exist.kero").is_err());
    }
}
