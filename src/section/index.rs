//! Index (`i`) sections.
//!
//! Wire layout: `'i' [nb_entries u64 BE] ([type u8] [relative_offset i64 BE])*
//! [next_index i64 BE]`. Entry offsets are relative to the position
//! immediately after the section; `next_index` is relative to the position
//! immediately after itself, with 0 ending the chain.

use std::collections::BTreeMap;

use crate::error::{Result, SectionError};
use crate::file::KeroFile;

/// Fixed bytes of an index section: tag, entry count, trailing chain link.
///
/// The relative-offset arithmetic below assumes entries are exactly one type
/// byte and one i64; any future change to the entry layout must revisit both
/// constants together.
pub const INDEX_HEADER_BYTES: u64 = 1 + 8 + 8;

/// Bytes per index entry: type byte plus relative offset.
pub const INDEX_ENTRY_BYTES: u64 = 1 + 8;

/// One decoded catalog of section positions.
#[derive(Debug)]
pub struct IndexSection {
    beginning: u64,
    /// Relative offset of each section's tag byte, keyed for sorted order.
    entries: BTreeMap<i64, u8>,
    next_index: i64,
}

impl IndexSection {
    /// Reads the `i` section at the current position.
    pub fn read(file: &mut KeroFile) -> Result<Self> {
        let beginning = file.tell();
        let tag = file.read_u8()?;
        if tag != b'i' {
            return Err(SectionError::TypeMismatch {
                expected: 'i',
                found: tag as char,
            }
            .into());
        }

        let nb_entries = file.read_u64()?;
        let mut entries = BTreeMap::new();
        for _ in 0..nb_entries {
            let section_type = file.read_u8()?;
            let offset = file.read_u64()? as i64;
            entries.insert(offset, section_type);
        }
        if entries.len() as u64 != nb_entries {
            return Err(SectionError::DecodedLengthMismatch {
                expected: nb_entries as usize,
                found: entries.len(),
            }
            .into());
        }
        let next_index = file.read_u64()? as i64;

        Ok(Self {
            beginning,
            entries,
            next_index,
        })
    }

    /// Relative link to the next index section; 0 means terminal.
    #[must_use]
    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    /// Offset of this section's tag byte.
    #[must_use]
    pub fn beginning(&self) -> u64 {
        self.beginning
    }

    /// Position immediately after this section, the base of its relative
    /// entry offsets.
    #[must_use]
    pub fn end_position(&self) -> u64 {
        self.beginning + INDEX_HEADER_BYTES + INDEX_ENTRY_BYTES * self.entries.len() as u64
    }

    /// The raw entries: relative offset of each section tag byte.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<i64, u8> {
        &self.entries
    }

    /// The entries resolved to absolute `(offset, section tag)` pairs.
    pub fn absolute_entries(&self) -> impl Iterator<Item = (u64, u8)> + '_ {
        let base = self.end_position() as i64;
        self.entries
            .iter()
            .map(move |(&relative, &tag)| ((base + relative) as u64, tag))
    }
}

/// Writes one `i` section from already-relative entries.
pub(crate) fn write_index_section(
    file: &mut KeroFile,
    entries: &BTreeMap<i64, u8>,
    next_index: i64,
) -> Result<()> {
    file.write_bytes(b"i")?;
    file.write_u64(entries.len() as u64)?;
    for (&offset, &section_type) in entries {
        file.write_bytes(&[section_type])?;
        file.write_u64(offset as u64)?;
    }
    file.write_u64(next_index as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::KeroFile;
    use tempfile::TempDir;

    #[test]
    fn test_index_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_indexation(false);
        file.complete_header().unwrap();
        let beginning = file.tell();
        let mut entries = BTreeMap::new();
        entries.insert(-30i64, b'v');
        entries.insert(-12i64, b'r');
        write_index_section(&mut file, &entries, 0).unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        let section = IndexSection::read(&mut file).unwrap();
        assert_eq!(section.beginning(), beginning);
        assert_eq!(section.next_index(), 0);
        assert_eq!(section.entries().len(), 2);
        assert_eq!(section.entries()[&-30], b'v');
        assert_eq!(
            section.end_position(),
            beginning + INDEX_HEADER_BYTES + 2 * INDEX_ENTRY_BYTES
        );

        let absolute: Vec<(u64, u8)> = section.absolute_entries().collect();
        assert_eq!(absolute[0], (section.end_position() - 30, b'v'));
        assert_eq!(absolute[1], (section.end_position() - 12, b'r'));
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notindex.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_indexation(false);
        file.complete_header().unwrap();
        file.write_bytes(b"v").unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        assert!(matches!(
            IndexSection::read(&mut file).unwrap_err(),
            crate::Error::Section(SectionError::TypeMismatch { expected: 'i', .. })
        ));
    }
}
