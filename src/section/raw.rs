//! Raw (`r`) sections: sequential compacted k-mer blocks with inline data.
//!
//! Wire layout: `'r' [nb_blocks u64 BE]` followed by one record per block:
//! the k-mer count on `nb_kmers_bytes` bytes (absent when `max == 1`), the
//! packed sequence, then `data_size` bytes per k-mer. The block count is
//! back-patched on close.

use super::required_var;
use crate::bits::{bytes_from_bit_array, ceil_log2};
use crate::error::{Result, SectionError};
use crate::file::KeroFile;

/// Width in bytes of the per-block k-mer count for a given `max`.
pub(crate) fn nb_kmers_bytes(max: u64) -> usize {
    bytes_from_bit_array(ceil_log2(max), 1) as usize
}

/// Writer for an `r` section. Requires the globals `k`, `max` and
/// `data_size` to be set beforehand.
#[derive(Debug)]
pub struct RawSectionWriter {
    beginning: u64,
    nb_blocks: u64,
    k: u64,
    data_size: u64,
    nb_kmers_bytes: usize,
}

impl RawSectionWriter {
    /// Opens an `r` section at the current position and emits its header.
    pub fn create(file: &mut KeroFile) -> Result<Self> {
        file.complete_header()?;
        let k = required_var(file, "k")?;
        let max = required_var(file, "max")?;
        let data_size = required_var(file, "data_size")?;

        let beginning = file.tell();
        file.register_position(b'r');
        file.write_bytes(b"r")?;
        file.write_u64(0)?; // nb_blocks, back-patched on close

        Ok(Self {
            beginning,
            nb_blocks: 0,
            k,
            data_size,
            nb_kmers_bytes: nb_kmers_bytes(max),
        })
    }

    /// Writes one block: a packed sequence of `seq_size` nucleotides and the
    /// data for each of its `seq_size - k + 1` k-mers.
    pub fn write_block(&mut self, file: &mut KeroFile, seq: &[u8], seq_size: u64, data: &[u8]) -> Result<()> {
        let nb_kmers = seq_size - self.k + 1;
        file.write_uint(nb_kmers, self.nb_kmers_bytes)?;
        let seq_bytes = bytes_from_bit_array(2, seq_size) as usize;
        file.write_bytes(&seq[..seq_bytes])?;
        file.write_bytes(&data[..(self.data_size * nb_kmers) as usize])?;
        self.nb_blocks += 1;
        Ok(())
    }

    /// Back-patches the block count at the section start.
    pub fn close(self, file: &mut KeroFile) -> Result<()> {
        file.write_at(&self.nb_blocks.to_be_bytes(), self.beginning + 1)
    }
}

/// Reader for an `r` section.
pub struct RawSectionReader {
    nb_blocks: u64,
    remaining_blocks: u64,
    k: u64,
    max: u64,
    data_size: u64,
    nb_kmers_bytes: usize,
}

impl RawSectionReader {
    /// Opens the `r` section at the current position.
    pub fn open(file: &mut KeroFile) -> Result<Self> {
        file.complete_header()?;
        let k = required_var(file, "k")?;
        let max = required_var(file, "max")?;
        let data_size = required_var(file, "data_size")?;

        let tag = file.read_u8()?;
        if tag != b'r' {
            return Err(SectionError::TypeMismatch {
                expected: 'r',
                found: tag as char,
            }
            .into());
        }
        let nb_blocks = file.read_u64()?;

        Ok(Self {
            nb_blocks,
            remaining_blocks: nb_blocks,
            k,
            max,
            data_size,
            nb_kmers_bytes: nb_kmers_bytes(max),
        })
    }

    #[must_use]
    pub fn nb_blocks(&self) -> u64 {
        self.nb_blocks
    }

    #[must_use]
    pub fn remaining_blocks(&self) -> u64 {
        self.remaining_blocks
    }

    /// Sequence-buffer size sufficient for any block of this section.
    #[must_use]
    pub fn max_seq_bytes(&self) -> usize {
        bytes_from_bit_array(2, self.k + self.max - 1) as usize
    }

    /// Data-buffer size sufficient for any block of this section.
    #[must_use]
    pub fn max_data_bytes(&self) -> usize {
        (self.max * self.data_size) as usize
    }

    fn read_block_count(&mut self, file: &mut KeroFile) -> Result<u64> {
        if self.nb_kmers_bytes == 0 {
            Ok(1)
        } else {
            file.read_uint(self.nb_kmers_bytes)
        }
    }

    /// Reads the next block into separate sequence and data buffers and
    /// returns its k-mer count.
    pub fn read_block(&mut self, file: &mut KeroFile, seq: &mut [u8], data: &mut [u8]) -> Result<u64> {
        let nb_kmers = self.read_block_count(file)?;
        let seq_size = nb_kmers + self.k - 1;
        let seq_bytes = bytes_from_bit_array(2, seq_size) as usize;
        file.read_bytes(&mut seq[..seq_bytes])?;
        file.read_bytes(&mut data[..(self.data_size * nb_kmers) as usize])?;
        self.remaining_blocks -= 1;
        Ok(nb_kmers)
    }

    /// Reads the next block as one buffer, sequence immediately followed by
    /// data, and returns its k-mer count.
    pub fn read_block_packed(&mut self, file: &mut KeroFile, seq_data: &mut [u8]) -> Result<u64> {
        let nb_kmers = self.read_block_count(file)?;
        let seq_size = nb_kmers + self.k - 1;
        let seq_bytes = bytes_from_bit_array(2, seq_size) as usize;
        let data_bytes = (self.data_size * nb_kmers) as usize;
        file.read_bytes(&mut seq_data[..seq_bytes + data_bytes])?;
        self.remaining_blocks -= 1;
        Ok(nb_kmers)
    }

    /// Skips the next block, reading only its k-mer count.
    pub fn jump_block(&mut self, file: &mut KeroFile) -> Result<()> {
        let nb_kmers = self.read_block_count(file)?;
        let seq_size = nb_kmers + self.k - 1;
        let seq_bytes = bytes_from_bit_array(2, seq_size);
        file.jump((seq_bytes + self.data_size * nb_kmers) as i64)?;
        self.remaining_blocks -= 1;
        Ok(())
    }

    /// Skips every remaining block, leaving the file at the section end.
    pub fn close(mut self, file: &mut KeroFile) -> Result<()> {
        while self.remaining_blocks > 0 {
            self.jump_block(file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::KeroFile;
    use crate::section::vars::VarsSectionWriter;
    use tempfile::TempDir;

    fn write_globals(file: &mut KeroFile, k: u64, max: u64, data_size: u64) {
        let mut section = VarsSectionWriter::create(file).unwrap();
        section.write_var(file, "k", k);
        section.write_var(file, "max", max);
        section.write_var(file, "data_size", data_size);
        section.close(file).unwrap();
    }

    #[test]
    fn test_single_block_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.kero");

        // ACGT with A=0 C=1 G=3 T=2 packs to 0b00_01_11_10
        let mut file = KeroFile::create(&path).unwrap();
        write_globals(&mut file, 3, 2, 1);
        let mut section = RawSectionWriter::create(&mut file).unwrap();
        section
            .write_block(&mut file, &[0x1E], 4, &[0x10, 0x20])
            .unwrap();
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        crate::section::vars::read_vars_section(&mut file).unwrap();
        let mut section = RawSectionReader::open(&mut file).unwrap();
        assert_eq!(section.nb_blocks(), 1);

        let mut seq = vec![0u8; section.max_seq_bytes()];
        let mut data = vec![0u8; section.max_data_bytes()];
        let nb_kmers = section.read_block(&mut file, &mut seq, &mut data).unwrap();
        assert_eq!(nb_kmers, 2);
        assert_eq!(seq[0], 0x1E);
        assert_eq!(&data[..2], &[0x10, 0x20]);
        assert_eq!(section.remaining_blocks(), 0);
    }

    #[test]
    fn test_max_one_has_implicit_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("maxone.kero");

        let mut file = KeroFile::create(&path).unwrap();
        write_globals(&mut file, 4, 1, 0);
        let mut section = RawSectionWriter::create(&mut file).unwrap();
        assert_eq!(section.nb_kmers_bytes, 0);
        // one k-mer, 4 nucleotides, no data
        section.write_block(&mut file, &[0xAA], 4, &[]).unwrap();
        section.write_block(&mut file, &[0x55], 4, &[]).unwrap();
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        crate::section::vars::read_vars_section(&mut file).unwrap();
        let mut section = RawSectionReader::open(&mut file).unwrap();
        assert_eq!(section.nb_blocks(), 2);

        let mut seq = [0u8; 1];
        let mut data = [0u8; 0];
        assert_eq!(section.read_block(&mut file, &mut seq, &mut data).unwrap(), 1);
        assert_eq!(seq[0], 0xAA);
        assert_eq!(section.read_block(&mut file, &mut seq, &mut data).unwrap(), 1);
        assert_eq!(seq[0], 0x55);
    }

    #[test]
    fn test_jump_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jump.kero");

        let mut file = KeroFile::create(&path).unwrap();
        write_globals(&mut file, 3, 4, 2);
        let mut section = RawSectionWriter::create(&mut file).unwrap();
        // 3 nucleotides = 1 k-mer; 6 nucleotides = 4 k-mers
        section.write_block(&mut file, &[0x11], 3, &[1, 2]).unwrap();
        section
            .write_block(&mut file, &[0x22, 0x33], 6, &[3, 4, 5, 6, 7, 8, 9, 10])
            .unwrap();
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        crate::section::vars::read_vars_section(&mut file).unwrap();
        let mut section = RawSectionReader::open(&mut file).unwrap();
        section.jump_block(&mut file).unwrap();

        let mut seq = vec![0u8; section.max_seq_bytes()];
        let mut data = vec![0u8; section.max_data_bytes()];
        let nb_kmers = section.read_block(&mut file, &mut seq, &mut data).unwrap();
        assert_eq!(nb_kmers, 4);
        assert_eq!(&seq[..2], &[0x22, 0x33]);
        assert_eq!(&data[..8], &[3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_missing_global_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.kero");

        let mut file = KeroFile::create(&path).unwrap();
        let mut section = VarsSectionWriter::create(&mut file).unwrap();
        section.write_var(&mut file, "k", 3);
        section.close(&mut file).unwrap();

        let err = RawSectionWriter::create(&mut file).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Section(SectionError::MissingVariable(name)) if name == "max"
        ));
        file.close().unwrap();
    }
}
