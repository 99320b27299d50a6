//! High-level reader yielding successive blocks and k-mers.
//!
//! [`KeroReader`] walks the file's sections in order: `v` sections update the
//! cached `k`, `max` and `data_size` (resizing the scratch buffers), `i` and
//! `h` sections are consumed and discarded (the container already caches
//! them), and `r`/`M` sections become the current block source.
//!
//! For k-mer extraction the reader keeps four copies of the current
//! sequence, pre-shifted by 0 to 3 nucleotides, so [`next_kmer`](KeroReader::next_kmer)
//! can slice a k-mer out with a plain byte copy instead of a per-call shift.
//! The returned slice is the smallest byte window covering the k-mer: its
//! leading pad bits still hold neighboring nucleotides, so consumers mask
//! the top bits when comparing whole k-mers.

use std::path::Path;

use crate::bits::{bytes_from_bit_array, rightshift8};
use crate::error::{Result, SectionError};
use crate::file::KeroFile;
use crate::section::{
    BlockSectionReader, HashtableSection, IndexSection, SectionType, read_vars_section,
};

/// Streaming reader over every k-mer block of a KERO file.
pub struct KeroReader {
    file: KeroFile,
    section: Option<BlockSectionReader>,
    remaining_blocks: u64,

    /// Current packed sequence immediately followed by its data payloads.
    seq_data: Vec<u8>,
    /// The sequence shifted right by 1, 2 and 3 nucleotides.
    shifts: [Vec<u8>; 3],
    /// Scratch space for the k-mer handed to the caller.
    kmer: Vec<u8>,

    seq_nucleotides: u64,
    seq_bytes: usize,
    seq_kmers: u64,
    remaining_kmers: u64,

    k: u64,
    max: u64,
    data_size: u64,
}

impl KeroReader {
    /// Opens `path` and positions the reader on the first block section.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = KeroFile::open(path)?;
        let mut reader = Self {
            file,
            section: None,
            remaining_blocks: 0,
            seq_data: Vec::new(),
            shifts: [Vec::new(), Vec::new(), Vec::new()],
            kmer: Vec::new(),
            seq_nucleotides: 0,
            seq_bytes: 0,
            seq_kmers: 0,
            remaining_kmers: 0,
            k: 0,
            max: 0,
            data_size: 0,
        };
        reader.has_next()?;
        Ok(reader)
    }

    /// The underlying container (encoding, globals, hashtable, ...).
    #[must_use]
    pub fn file(&self) -> &KeroFile {
        &self.file
    }

    /// Fetches a global variable, failing when the file never declared it.
    pub fn get_var(&self, name: &str) -> Result<u64> {
        self.file
            .var(name)
            .ok_or_else(|| SectionError::MissingVariable(name.to_string()).into())
    }

    /// The four 2-bit nucleotide codes, in A, C, G, T order.
    #[must_use]
    pub fn encoding(&self) -> [u8; 4] {
        self.file.encoding()
    }

    #[must_use]
    pub fn k(&self) -> u64 {
        self.k
    }

    #[must_use]
    pub fn max(&self) -> u64 {
        self.max
    }

    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Sequence-buffer size sufficient for [`next_block`](Self::next_block)
    /// under the current globals.
    #[must_use]
    pub fn max_seq_bytes(&self) -> usize {
        bytes_from_bit_array(2, (self.max + self.k).saturating_sub(1)) as usize
    }

    /// Data-buffer size sufficient for [`next_block`](Self::next_block)
    /// under the current globals.
    #[must_use]
    pub fn max_data_bytes(&self) -> usize {
        (self.max * self.data_size) as usize
    }

    fn resize_buffers(&mut self) {
        let seq_max = self.max_seq_bytes();
        let data_max = self.max_data_bytes();
        self.seq_data = vec![0; seq_max + data_max];
        self.shifts = [vec![0; seq_max], vec![0; seq_max], vec![0; seq_max]];
        self.kmer = vec![0; (self.k / 4 + 1) as usize];
    }

    /// Advances over non-block sections until a block section with content
    /// is current, or the end of the file is reached.
    fn read_until_first_section_block(&mut self) -> Result<()> {
        while self.section.is_none() || self.remaining_blocks == 0 {
            if self.file.tell() == self.file.end_position() {
                break;
            }

            match SectionType::peek(&mut self.file)? {
                SectionType::Vars => {
                    let vars = read_vars_section(&mut self.file)?;
                    if vars.contains_key("k")
                        || vars.contains_key("max")
                        || vars.contains_key("data_size")
                    {
                        self.k = self.file.var("k").unwrap_or(0);
                        self.max = self.file.var("max").unwrap_or(0);
                        self.data_size = self.file.var("data_size").unwrap_or(0);
                        self.resize_buffers();
                    }
                }
                SectionType::Index => {
                    IndexSection::read(&mut self.file)?;
                }
                SectionType::Hashtable => {
                    let section = HashtableSection::read(&mut self.file)?;
                    self.file.set_hashtable(section.into_table());
                }
                SectionType::Raw | SectionType::Minimizer => {
                    if let Some(mut section) = BlockSectionReader::open(&mut self.file)? {
                        if section.nb_blocks() == 0 {
                            section.jump_section(&mut self.file)?;
                            continue;
                        }
                        self.remaining_blocks = section.nb_blocks();
                        self.section = Some(section);
                    }
                }
            }
        }
        Ok(())
    }

    fn read_next_block(&mut self) -> Result<()> {
        let section = self.section.as_mut().expect("current block section");
        let nb_kmers = section.read_block_packed(&mut self.file, &mut self.seq_data)?;
        self.seq_kmers = nb_kmers;
        self.remaining_kmers = nb_kmers;
        self.seq_nucleotides = nb_kmers + self.k - 1;
        self.seq_bytes = bytes_from_bit_array(2, self.seq_nucleotides) as usize;

        for i in 1..4u64.min(nb_kmers) as usize {
            let shift = &mut self.shifts[i - 1];
            shift[..self.seq_bytes].copy_from_slice(&self.seq_data[..self.seq_bytes]);
            rightshift8(&mut shift[..self.seq_bytes], 2 * i);
        }
        Ok(())
    }

    /// Whether another k-mer (or block) is available.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.remaining_kmers > 0 || self.remaining_blocks > 0 {
            return Ok(true);
        }
        if self.file.end_position() > self.file.tell() {
            self.read_until_first_section_block()?;
            return Ok(self.remaining_blocks > 0);
        }
        Ok(false)
    }

    /// Reads the next whole block into caller buffers, bypassing per-k-mer
    /// extraction. Returns its k-mer count, 0 at end of file.
    ///
    /// Size the buffers with [`max_seq_bytes`](Self::max_seq_bytes) and
    /// [`max_data_bytes`](Self::max_data_bytes).
    pub fn next_block(&mut self, seq: &mut [u8], data: &mut [u8]) -> Result<u64> {
        if !self.has_next()? {
            return Ok(0);
        }
        let Some(section) = self.section.as_mut() else {
            return Ok(0);
        };
        let nb_kmers = section.read_block(&mut self.file, seq, data)?;

        self.remaining_kmers = 0;
        self.remaining_blocks = self.remaining_blocks.saturating_sub(1);
        if self.remaining_blocks == 0 {
            self.section = None;
        }
        Ok(nb_kmers)
    }

    /// Yields the next k-mer and its data payload.
    ///
    /// The k-mer slice is the minimal byte window covering `k` nucleotides,
    /// right-aligned; bits left of the k-mer are unspecified.
    pub fn next_kmer(&mut self) -> Result<Option<(&[u8], &[u8])>> {
        if !self.has_next()? {
            return Ok(None);
        }
        if self.remaining_kmers == 0 {
            if self.section.is_none() {
                return Ok(None);
            }
            self.read_next_block()?;
        }

        let right_shift = ((self.remaining_kmers - 1) % 4) as usize;
        let prefix_offset = (4 - (self.seq_nucleotides % 4)) % 4;
        let kmer_idx = self.seq_kmers - self.remaining_kmers;

        let start_nucl = prefix_offset + right_shift as u64 + kmer_idx;
        let start_byte = (start_nucl / 4) as usize;
        let end_nucl = start_nucl + self.k - 1;
        let end_byte = (end_nucl / 4) as usize;
        let kmer_bytes = end_byte - start_byte + 1;

        let source: &[u8] = if right_shift == 0 {
            &self.seq_data
        } else {
            &self.shifts[right_shift - 1]
        };
        self.kmer[..kmer_bytes].copy_from_slice(&source[start_byte..=end_byte]);

        let data_start = self.seq_bytes + (kmer_idx * self.data_size) as usize;
        let data_end = data_start + self.data_size as usize;

        self.remaining_kmers -= 1;
        if self.remaining_kmers == 0 {
            self.remaining_blocks -= 1;
            if self.remaining_blocks == 0 {
                self.section = None;
            }
        }

        Ok(Some((
            &self.kmer[..kmer_bytes],
            &self.seq_data[data_start..data_end],
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::KeroFile;
    use crate::section::{MinimizerSectionWriter, RawSectionWriter, VarsSectionWriter};
    use tempfile::TempDir;

    fn write_globals(file: &mut KeroFile, k: u64, m: u64, max: u64, data_size: u64) {
        let mut section = VarsSectionWriter::create(file).unwrap();
        section.write_var(file, "k", k);
        section.write_var(file, "m", m);
        section.write_var(file, "max", max);
        section.write_var(file, "data_size", data_size);
        section.close(file).unwrap();
    }

    #[test]
    fn test_kmers_from_raw_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kmers.kero");

        // k=3: ACGT holds the k-mers ACG and CGT
        let mut file = KeroFile::create(&path).unwrap();
        write_globals(&mut file, 3, 0, 2, 1);
        let mut section = RawSectionWriter::create(&mut file).unwrap();
        section
            .write_block(&mut file, &[0x1E], 4, &[0x10, 0x20])
            .unwrap();
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut reader = KeroReader::open(&path).unwrap();
        assert_eq!(reader.get_var("k").unwrap(), 3);
        assert_eq!(reader.encoding(), [0, 1, 3, 2]);

        // k = 3 spans 6 bits: compare under a 6-bit mask
        let (kmer, data) = reader.next_kmer().unwrap().unwrap();
        assert_eq!(kmer.len(), 1);
        assert_eq!(kmer[0] & 0x3F, 0b00_01_11); // ACG
        assert_eq!(data, &[0x10]);

        let (kmer, data) = reader.next_kmer().unwrap().unwrap();
        assert_eq!(kmer[0] & 0x3F, 0b01_11_10); // CGT
        assert_eq!(data, &[0x20]);

        assert!(reader.next_kmer().unwrap().is_none());
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn test_kmers_from_minimizer_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("minikmers.kero");

        // k=5, m=3: ACGTACGT holds ACGTA, CGTAC, GTACG, TACGT
        let mut file = KeroFile::create(&path).unwrap();
        write_globals(&mut file, 5, 3, 10, 1);
        let mut section = MinimizerSectionWriter::create(&mut file).unwrap();
        section.set_minimizer(&[0x38]); // GTA
        section.write_block(&[0x1E, 0x1E], 8, 2, &[4, 5, 6, 7]);
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut reader = KeroReader::open(&path).unwrap();

        // k = 5 spans 10 bits over 2 bytes: mask the top 6 bits of byte 0
        let expected: [(u8, u8); 4] = [
            (0b00, 0b01_11_10_00), // ACGTA
            (0b01, 0b11_10_00_01), // CGTAC
            (0b11, 0b10_00_01_11), // GTACG
            (0b10, 0b00_01_11_10), // TACGT
        ];
        for (i, (head, tail)) in expected.iter().enumerate() {
            let (kmer, data) = reader.next_kmer().unwrap().unwrap();
            assert_eq!(kmer.len(), 2, "k-mer {i}");
            assert_eq!(kmer[0] & 0x03, *head, "k-mer {i}");
            assert_eq!(kmer[1], *tail, "k-mer {i}");
            assert_eq!(data, &[4 + i as u8]);
        }
        assert!(reader.next_kmer().unwrap().is_none());
    }

    #[test]
    fn test_mixed_sections_and_next_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.kero");

        let mut file = KeroFile::create(&path).unwrap();
        write_globals(&mut file, 5, 3, 10, 0);
        let mut raw = RawSectionWriter::create(&mut file).unwrap();
        raw.write_block(&mut file, &[0x1E, 0x1E], 8, &[]).unwrap();
        raw.close(&mut file).unwrap();
        let mut mini = MinimizerSectionWriter::create(&mut file).unwrap();
        mini.set_minimizer(&[0x38]);
        mini.write_block(&[0x1E, 0x1E], 8, 2, &[]);
        mini.close(&mut file).unwrap();
        file.close().unwrap();

        let mut reader = KeroReader::open(&path).unwrap();
        let mut seq = vec![0u8; reader.max_seq_bytes()];
        let mut data = vec![0u8; reader.max_data_bytes()];

        // Raw block comes back as stored
        assert_eq!(reader.next_block(&mut seq, &mut data).unwrap(), 4);
        assert_eq!(&seq[..2], &[0x1E, 0x1E]);

        // Minimizer block comes back with the minimizer reinserted
        assert_eq!(reader.next_block(&mut seq, &mut data).unwrap(), 4);
        assert_eq!(&seq[..2], &[0x1E, 0x1E]);

        assert_eq!(reader.next_block(&mut seq, &mut data).unwrap(), 0);
    }

    #[test]
    fn test_vars_visible_to_later_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("visible.kero");

        let mut file = KeroFile::create(&path).unwrap();
        write_globals(&mut file, 3, 0, 2, 0);
        let mut raw = RawSectionWriter::create(&mut file).unwrap();
        raw.write_block(&mut file, &[0x1E], 4, &[]).unwrap();
        raw.close(&mut file).unwrap();
        file.close().unwrap();

        let reader = KeroReader::open(&path).unwrap();
        assert_eq!(reader.k(), 3);
        assert_eq!(reader.max(), 2);
        assert_eq!(reader.data_size(), 0);
        assert_eq!(reader.get_var("max").unwrap(), 2);
        assert!(reader.get_var("nope").is_err());
    }
}
