//! Vertical minimizer (`M`) sections.
//!
//! Every super-k-mer of the section shares one minimizer, so the minimizer
//! is stored once in the header and excised from each sequence. The blocks
//! are laid out column-wise rather than record-wise:
//!
//! ```text
//! 'M' [minimizer] [nb_blocks u64]
//! [n_col_off u64] [m_idx_col_off u64] [data_col_off u64] [seq_col_off u64]
//! n column      [compressed_size u64] [bytes]       k-mer counts (u64 codec)
//! m_idx column  [compressed_size u64] [bytes]       minimizer offsets (u64 codec)
//! data column   [nb_bytes u64] [compressed_size u64] [bytes]   payloads (u8 codec)
//! seq column    raw residual sequences, back to back
//! ```
//!
//! Column offsets are relative to the section's tag byte; they are written as
//! zero placeholders and back-patched once the columns are on disk.

use super::required_var;
use crate::bits::{
    bytes_from_bit_array, ceil_log2, fusion8, leftshift8, mask_minimizer, rightshift8,
};
use crate::codec;
use crate::error::{Result, SectionError};
use crate::file::KeroFile;

/// Removes the `m` nucleotides at `mini_pos` from a left-padded packed
/// sequence of `seq_size` nucleotides.
///
/// The returned buffer is `bytes_from_bit_array(2, seq_size)` long; only its
/// first `bytes_from_bit_array(2, seq_size - m)` bytes carry the residual
/// sequence, re-normalized to left padding.
fn excise_minimizer(seq: &[u8], seq_size: u64, mini_pos: u64, m: u64) -> Vec<u8> {
    let seq_bytes = bytes_from_bit_array(2, seq_size) as usize;
    let left_offset = ((4 - seq_size % 4) % 4) as usize;
    let mini_pos = mini_pos as usize;
    let m = m as usize;

    let mut copy = seq[..seq_bytes].to_vec();

    // Move the suffix bytes onto the bytes where the minimizer started
    let mini_start_byte = (mini_pos + left_offset) / 4;
    let suff_start_byte = (mini_pos + m + left_offset) / 4;
    let suff_bytes = seq_bytes - suff_start_byte;
    for i in 0..suff_bytes {
        copy[mini_start_byte + i] = copy[suff_start_byte + i];
    }

    // Align the suffix onto the minimizer's nucleotide offset
    let mini_offset = (mini_pos + left_offset) % 4;
    let suff_offset = (mini_pos + m + left_offset) % 4;
    if mini_offset < suff_offset {
        leftshift8(&mut copy[mini_start_byte..], (suff_offset - mini_offset) * 2);
    } else {
        rightshift8(&mut copy[mini_start_byte..], (mini_offset - suff_offset) * 2);
    }

    // Merge the byte that straddles prefix and suffix
    copy[mini_start_byte] = fusion8(seq[mini_start_byte], copy[mini_start_byte], mini_offset * 2);

    // Re-normalize to left padding for seq_size - m nucleotides
    leftshift8(&mut copy, left_offset * 2);
    let residual_pad = ((4 - (seq_size as usize - m) % 4) % 4) * 2;
    rightshift8(&mut copy, residual_pad);

    copy
}

/// Reinserts `minimizer` at nucleotide `mini_pos` of a residual sequence,
/// in place.
///
/// On entry, `seq` holds the left-padded residual of
/// `nb_kmers + k - m - 1` nucleotides; on exit it holds the left-padded full
/// sequence of `nb_kmers + k - 1` nucleotides. The buffer must be at least
/// `bytes_from_bit_array(2, nb_kmers + k - 1)` bytes; `minimizer` is
/// left-padded over `bytes_from_bit_array(2, m)` bytes.
fn insert_minimizer(
    seq: &mut [u8],
    nb_kmers: u64,
    mini_pos: u64,
    minimizer: &[u8],
    k: u64,
    m: u64,
) {
    let seq_size = (nb_kmers + k - 1) as usize;
    let seq_bytes = bytes_from_bit_array(2, seq_size as u64) as usize;
    let seq_left_offset = (4 - seq_size % 4) % 4;
    let m = m as usize;
    let mini_pos = mini_pos as usize;
    let no_mini_size = seq_size - m;
    let no_mini_bytes = bytes_from_bit_array(2, no_mini_size as u64) as usize;
    let no_mini_left_offset = (4 - no_mini_size % 4) % 4;
    let nb_bytes_mini = bytes_from_bit_array(2, m as u64) as usize;

    // Left-align the residual sequence
    leftshift8(&mut seq[..no_mini_bytes], no_mini_left_offset * 2);

    // Extract the suffix, left-aligned in a scratch buffer
    let suff_nucl = seq_size - m - mini_pos;
    let mut suffix = vec![0u8; seq_bytes];
    let suff_start_byte = mini_pos / 4;
    let suff_src_bytes = no_mini_bytes - suff_start_byte;
    suffix[..suff_src_bytes].copy_from_slice(&seq[suff_start_byte..no_mini_bytes]);
    leftshift8(&mut suffix[..suff_src_bytes], (mini_pos % 4) * 2);

    // Left-align the minimizer in its own scratch buffer
    let mut mini = vec![0u8; seq_bytes];
    mini[..nb_bytes_mini].copy_from_slice(&minimizer[..nb_bytes_mini]);
    leftshift8(&mut mini[..nb_bytes_mini], ((4 - m % 4) % 4) * 2);

    // Shift the minimizer to its final offset and merge it in
    let mini_start_byte = mini_pos / 4;
    let mini_offset = mini_pos % 4;
    let mini_byte_size = (m + mini_offset).div_ceil(4);
    rightshift8(&mut mini, mini_offset * 2);
    seq[mini_start_byte] = fusion8(seq[mini_start_byte], mini[0], mini_offset * 2);
    seq[mini_start_byte + 1..mini_start_byte + mini_byte_size]
        .copy_from_slice(&mini[1..mini_byte_size]);

    // Shift the suffix behind the minimizer and merge it in
    let final_suff_start = mini_pos + m;
    let final_suff_byte = final_suff_start / 4;
    let final_suff_offset = final_suff_start % 4;
    let final_suff_byte_size = (suff_nucl + final_suff_offset).div_ceil(4);
    if final_suff_byte_size > 0 {
        rightshift8(&mut suffix, final_suff_offset * 2);
        seq[final_suff_byte] = fusion8(seq[final_suff_byte], suffix[0], final_suff_offset * 2);
        seq[final_suff_byte + 1..final_suff_byte + final_suff_byte_size]
            .copy_from_slice(&suffix[1..final_suff_byte_size]);
    }

    // Restore the left padding of the full sequence
    rightshift8(&mut seq[..seq_bytes], seq_left_offset * 2);
}

/// Writer for an `M` section.
///
/// Blocks accumulate in the four column buffers; nothing reaches the file
/// until [`close`](Self::close), which emits the header, the columns, and
/// back-patches the column offsets. Requires the globals `k`, `m`, `max` and
/// `data_size`.
pub struct MinimizerSectionWriter {
    k: u64,
    m: u64,
    data_size: u64,
    nb_bytes_mini: usize,
    mini_pos_bytes: usize,
    minimizer: Vec<u8>,
    nb_blocks: u64,
    n_values: Vec<u64>,
    m_idx_values: Vec<u64>,
    data_buffer: Vec<u8>,
    seq_buffer: Vec<u8>,
}

impl MinimizerSectionWriter {
    /// Prepares an `M` section; the header is only written on close.
    pub fn create(file: &mut KeroFile) -> Result<Self> {
        file.complete_header()?;
        let k = required_var(file, "k")?;
        let m = required_var(file, "m")?;
        let max = required_var(file, "max")?;
        let data_size = required_var(file, "data_size")?;

        let nb_bytes_mini = bytes_from_bit_array(2, m) as usize;
        let mini_pos_bytes = bytes_from_bit_array(ceil_log2(k + max - 1), 1) as usize;

        Ok(Self {
            k,
            m,
            data_size,
            nb_bytes_mini,
            mini_pos_bytes,
            minimizer: vec![0u8; nb_bytes_mini],
            nb_blocks: 0,
            n_values: Vec::new(),
            m_idx_values: Vec::new(),
            data_buffer: Vec::new(),
            seq_buffer: Vec::new(),
        })
    }

    /// Sets the section's minimizer, left-padded over
    /// `bytes_from_bit_array(2, m)` bytes.
    pub fn set_minimizer(&mut self, minimizer: &[u8]) {
        self.minimizer.copy_from_slice(&minimizer[..self.nb_bytes_mini]);
    }

    /// The minimizer as a value modulo `2 * m` bits.
    #[must_use]
    pub fn minimizer_value(&self) -> u64 {
        mask_minimizer(&self.minimizer, self.m)
    }

    /// Reserved width of a stored minimizer offset, in bytes.
    #[must_use]
    pub fn mini_pos_bytes(&self) -> usize {
        self.mini_pos_bytes
    }

    #[must_use]
    pub fn nb_blocks(&self) -> u64 {
        self.nb_blocks
    }

    /// Buffers a super-k-mer whose minimizer is still embedded: the `m`
    /// nucleotides at `mini_pos` are excised before storage.
    pub fn write_block(&mut self, seq: &[u8], seq_size: u64, mini_pos: u64, data: &[u8]) {
        let residual = excise_minimizer(seq, seq_size, mini_pos, self.m);
        self.write_block_excised(&residual, seq_size - self.m, mini_pos, data);
    }

    /// Buffers a super-k-mer already stripped of its minimizer.
    ///
    /// `residual_size` counts the remaining nucleotides; `mini_pos` is the
    /// offset the minimizer had (and will regain on read).
    pub fn write_block_excised(
        &mut self,
        seq: &[u8],
        residual_size: u64,
        mini_pos: u64,
        data: &[u8],
    ) {
        let nb_kmers = residual_size + self.m - self.k + 1;
        self.n_values.push(nb_kmers);
        self.m_idx_values.push(mini_pos);
        self.data_buffer
            .extend_from_slice(&data[..(self.data_size * nb_kmers) as usize]);
        let seq_bytes = bytes_from_bit_array(2, residual_size) as usize;
        self.seq_buffer.extend_from_slice(&seq[..seq_bytes]);
        self.nb_blocks += 1;
    }

    /// Registers the section with the container, writes the header and the
    /// four columns, then back-patches the column offsets.
    pub fn close(self, file: &mut KeroFile) -> Result<()> {
        file.register_minimizer_section(mask_minimizer(&self.minimizer, self.m));
        file.register_position(b'M');
        let start_pos = file.tell();

        file.write_bytes(b"M")?;
        file.write_bytes(&self.minimizer)?;
        file.write_u64(self.nb_blocks)?;
        let offset_slots = file.tell();
        for _ in 0..4 {
            file.write_u64(0)?;
        }

        let n_col = file.tell();
        let encoded = codec::encode_u64(&self.n_values)?;
        file.write_u64(encoded.len() as u64)?;
        file.write_bytes(&encoded)?;

        let m_idx_col = file.tell();
        let encoded = codec::encode_u64(&self.m_idx_values)?;
        file.write_u64(encoded.len() as u64)?;
        file.write_bytes(&encoded)?;

        let data_col = file.tell();
        file.write_u64(self.data_buffer.len() as u64)?;
        let encoded = codec::encode_u8(&self.data_buffer)?;
        file.write_u64(encoded.len() as u64)?;
        file.write_bytes(&encoded)?;

        let seq_col = file.tell();
        file.write_bytes(&self.seq_buffer)?;

        for (slot, col) in [n_col, m_idx_col, data_col, seq_col].into_iter().enumerate() {
            file.write_at(&(col - start_pos).to_be_bytes(), offset_slots + 8 * slot as u64)?;
        }
        Ok(())
    }
}

/// Reader for an `M` (or legacy `m`) section.
///
/// The three compressed columns are decoded into memory on the first block
/// access; the sequence column is streamed from the file as blocks are read.
pub struct MinimizerSectionReader {
    k: u64,
    m: u64,
    max: u64,
    data_size: u64,
    nb_bytes_mini: usize,
    mini_pos_bytes: usize,
    minimizer: Vec<u8>,
    nb_blocks: u64,
    remaining_blocks: u64,

    n_col_offset: u64,
    m_idx_col_offset: u64,
    data_col_offset: u64,
    seq_col_offset: u64,

    columns_loaded: bool,
    n_values: Vec<u64>,
    m_idx_values: Vec<u64>,
    data_buffer: Vec<u8>,
    cur_block: usize,
    data_pos: usize,
    /// Absolute on-disk cursor into the seq column.
    seq_pos: u64,
}

impl MinimizerSectionReader {
    /// Opens the `M` section at the current position and reads its header.
    pub fn open(file: &mut KeroFile) -> Result<Self> {
        file.complete_header()?;
        let k = required_var(file, "k")?;
        let m = required_var(file, "m")?;
        let max = required_var(file, "max")?;
        let data_size = required_var(file, "data_size")?;

        let start_pos = file.tell();
        let tag = file.read_u8()?;
        if tag != b'M' && tag != b'm' {
            return Err(SectionError::TypeMismatch {
                expected: 'M',
                found: tag as char,
            }
            .into());
        }

        let nb_bytes_mini = bytes_from_bit_array(2, m) as usize;
        let mini_pos_bytes = bytes_from_bit_array(ceil_log2(k + max - 1), 1) as usize;
        let mut minimizer = vec![0u8; nb_bytes_mini];
        file.read_bytes(&mut minimizer)?;

        let nb_blocks = file.read_u64()?;
        let n_col_offset = file.read_u64()? + start_pos;
        let m_idx_col_offset = file.read_u64()? + start_pos;
        let data_col_offset = file.read_u64()? + start_pos;
        let seq_col_offset = file.read_u64()? + start_pos;

        Ok(Self {
            k,
            m,
            max,
            data_size,
            nb_bytes_mini,
            mini_pos_bytes,
            minimizer,
            nb_blocks,
            remaining_blocks: nb_blocks,
            n_col_offset,
            m_idx_col_offset,
            data_col_offset,
            seq_col_offset,
            columns_loaded: false,
            n_values: Vec::new(),
            m_idx_values: Vec::new(),
            data_buffer: Vec::new(),
            cur_block: 0,
            data_pos: 0,
            seq_pos: seq_col_offset,
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

    /// The section's minimizer, left-padded.
    #[must_use]
    pub fn minimizer(&self) -> &[u8] {
        &self.minimizer
    }

    /// The minimizer as a value modulo `2 * m` bits.
    #[must_use]
    pub fn minimizer_value(&self) -> u64 {
        mask_minimizer(&self.minimizer, self.m)
    }

    /// Reserved width of a stored minimizer offset, in bytes.
    #[must_use]
    pub fn mini_pos_bytes(&self) -> usize {
        self.mini_pos_bytes
    }

    /// Sequence-buffer size sufficient for any reconstructed block.
    #[must_use]
    pub fn max_seq_bytes(&self) -> usize {
        bytes_from_bit_array(2, self.k + self.max - 1) as usize
    }

    /// Data-buffer size sufficient for any block.
    #[must_use]
    pub fn max_data_bytes(&self) -> usize {
        (self.max * self.data_size) as usize
    }

    /// Decodes the n, m_idx and data columns into memory. Subsequent block
    /// reads only touch the file for the sequence column.
    fn ensure_columns(&mut self, file: &mut KeroFile) -> Result<()> {
        if self.columns_loaded {
            return Ok(());
        }

        file.jump_to(self.n_col_offset)?;
        let compressed_size = file.read_u64()? as usize;
        let mut compressed = vec![0u8; compressed_size];
        file.read_bytes(&mut compressed)?;
        self.n_values = codec::decode_u64(&compressed, self.nb_blocks as usize)?;

        file.jump_to(self.m_idx_col_offset)?;
        let compressed_size = file.read_u64()? as usize;
        let mut compressed = vec![0u8; compressed_size];
        file.read_bytes(&mut compressed)?;
        self.m_idx_values = codec::decode_u64(&compressed, self.nb_blocks as usize)?;

        if self.data_size > 0 {
            file.jump_to(self.data_col_offset)?;
            let nb_bytes = file.read_u64()? as usize;
            let compressed_size = file.read_u64()? as usize;
            let mut compressed = vec![0u8; compressed_size];
            file.read_bytes(&mut compressed)?;
            self.data_buffer = codec::decode_u8(&compressed, nb_bytes)?;
        }

        self.columns_loaded = true;
        Ok(())
    }

    /// Runs the same column decompressions against a memory-mapped byte
    /// view of the whole file, with no intervening file I/O.
    pub fn precache_columns_from_mmap(&mut self, mmap: &[u8]) -> Result<()> {
        if self.columns_loaded {
            return Ok(());
        }

        let offset = self.n_col_offset as usize;
        let compressed_size = crate::bits::read_uint_be(&mmap[offset..offset + 8]) as usize;
        self.n_values = codec::decode_u64(
            &mmap[offset + 8..offset + 8 + compressed_size],
            self.nb_blocks as usize,
        )?;

        let offset = self.m_idx_col_offset as usize;
        let compressed_size = crate::bits::read_uint_be(&mmap[offset..offset + 8]) as usize;
        self.m_idx_values = codec::decode_u64(
            &mmap[offset + 8..offset + 8 + compressed_size],
            self.nb_blocks as usize,
        )?;

        if self.data_size > 0 {
            let offset = self.data_col_offset as usize;
            let nb_bytes = crate::bits::read_uint_be(&mmap[offset..offset + 8]) as usize;
            let compressed_size =
                crate::bits::read_uint_be(&mmap[offset + 8..offset + 16]) as usize;
            self.data_buffer =
                codec::decode_u8(&mmap[offset + 16..offset + 16 + compressed_size], nb_bytes)?;
        }

        self.columns_loaded = true;
        Ok(())
    }

    /// Reads the next block without reinserting the minimizer.
    ///
    /// Fills `seq` with the left-padded residual sequence and `data` with the
    /// per-k-mer payloads; returns the k-mer count and the minimizer offset,
    /// or `None` once every block has been consumed.
    pub fn read_block_excised(
        &mut self,
        file: &mut KeroFile,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<(u64, u64)>> {
        if self.cur_block as u64 >= self.nb_blocks {
            return Ok(None);
        }
        self.ensure_columns(file)?;

        let nb_kmers = self.n_values[self.cur_block];
        let mini_pos = self.m_idx_values[self.cur_block];

        if self.data_size > 0 {
            let nb_data_bytes = (self.data_size * nb_kmers) as usize;
            data[..nb_data_bytes]
                .copy_from_slice(&self.data_buffer[self.data_pos..self.data_pos + nb_data_bytes]);
            self.data_pos += nb_data_bytes;
        }

        let nb_seq_bytes = bytes_from_bit_array(2, nb_kmers + self.k - self.m - 1) as usize;
        file.jump_to(self.seq_pos)?;
        file.read_bytes(&mut seq[..nb_seq_bytes])?;
        self.seq_pos += nb_seq_bytes as u64;

        self.cur_block += 1;
        self.remaining_blocks -= 1;
        Ok(Some((nb_kmers, mini_pos)))
    }

    /// Reads the next block and reinserts the minimizer into `seq`, which
    /// must hold at least [`max_seq_bytes`](Self::max_seq_bytes) bytes.
    ///
    /// Returns the k-mer count, or `None` once exhausted.
    pub fn read_block(
        &mut self,
        file: &mut KeroFile,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<u64>> {
        let Some((nb_kmers, mini_pos)) = self.read_block_excised(file, seq, data)? else {
            return Ok(None);
        };
        insert_minimizer(seq, nb_kmers, mini_pos, &self.minimizer, self.k, self.m);
        Ok(Some(nb_kmers))
    }

    /// Reads the next block into a single buffer: the reconstructed sequence
    /// immediately followed by the per-k-mer data.
    ///
    /// The buffer must hold [`max_seq_bytes`](Self::max_seq_bytes) plus
    /// [`max_data_bytes`](Self::max_data_bytes) bytes.
    pub fn read_block_packed(
        &mut self,
        file: &mut KeroFile,
        seq_data: &mut [u8],
    ) -> Result<Option<u64>> {
        let mut seq = vec![0u8; self.max_seq_bytes()];
        let mut data = vec![0u8; self.max_data_bytes()];
        let Some((nb_kmers, mini_pos)) = self.read_block_excised(file, &mut seq, &mut data)?
        else {
            return Ok(None);
        };

        let residual_nucl = nb_kmers + self.k - self.m - 1;
        let residual_bytes = bytes_from_bit_array(2, residual_nucl) as usize;
        let data_bytes = (self.data_size * nb_kmers) as usize;
        seq_data[..residual_bytes].copy_from_slice(&seq[..residual_bytes]);
        seq_data[residual_bytes..residual_bytes + data_bytes].copy_from_slice(&data[..data_bytes]);

        // Slide the data right to open the gap the minimizer will fill
        let free_nucls = (4 - residual_nucl % 4) % 4;
        let bytes_needed = ((self.m + 3 - free_nucls) / 4) as usize;
        if bytes_needed > 0 {
            for i in 0..data_bytes {
                let byte_idx = residual_bytes + data_bytes - 1 - i;
                seq_data[byte_idx + bytes_needed] = seq_data[byte_idx];
                seq_data[byte_idx] = 0;
            }
        }

        insert_minimizer(seq_data, nb_kmers, mini_pos, &self.minimizer, self.k, self.m);
        Ok(Some(nb_kmers))
    }

    /// Skips the next block by advancing the in-memory column cursors and
    /// the on-disk sequence cursor, without copying anything.
    pub fn jump_block(&mut self, file: &mut KeroFile) -> Result<()> {
        if self.remaining_blocks == 0 {
            return Ok(());
        }
        self.ensure_columns(file)?;
        let nb_kmers = self.n_values[self.cur_block];
        self.data_pos += (self.data_size * nb_kmers) as usize;
        self.seq_pos += bytes_from_bit_array(2, nb_kmers + self.k - self.m - 1);
        self.cur_block += 1;
        self.remaining_blocks -= 1;
        Ok(())
    }

    /// Leaves the file positioned on the byte after the section.
    pub(crate) fn seek_section_end(&mut self, file: &mut KeroFile) -> Result<()> {
        file.jump_to(self.seq_pos)
    }

    /// Skips every remaining block and positions the file after the section.
    pub fn close(mut self, file: &mut KeroFile) -> Result<()> {
        while self.remaining_blocks > 0 {
            self.jump_block(file)?;
        }
        self.seek_section_end(file)
    }
}
