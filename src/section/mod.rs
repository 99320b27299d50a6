//! Typed sections of a KERO file.
//!
//! Every section starts with a single ASCII tag byte: `v` (global
//! variables), `i` (index), `r` (raw blocks), `M` (vertical minimizer
//! blocks) and `h` (minimizer hashtable). [`SectionType`] decodes the tag;
//! [`BlockSectionReader`] unifies the two block-section kinds for code that
//! walks a file.

pub mod hashtable;
pub mod index;
pub mod minimizer;
pub mod raw;
pub mod vars;

pub use hashtable::HashtableSection;
pub use index::IndexSection;
pub use minimizer::{MinimizerSectionReader, MinimizerSectionWriter};
pub use raw::{RawSectionReader, RawSectionWriter};
pub use vars::{VarsSectionWriter, read_vars_section};

use crate::error::{Result, SectionError};
use crate::file::KeroFile;

/// Fetches a global variable required by a block section constructor.
pub(crate) fn required_var(file: &KeroFile, name: &str) -> Result<u64> {
    file.var(name)
        .ok_or_else(|| SectionError::MissingVariable(name.to_string()).into())
}

/// The kinds of section a KERO file may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Vars,
    Index,
    Raw,
    Minimizer,
    Hashtable,
}

impl SectionType {
    /// Decodes a section tag byte.
    ///
    /// The legacy `m` tag routes to the minimizer section; the writer only
    /// ever emits `M`.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            b'v' => Ok(Self::Vars),
            b'i' => Ok(Self::Index),
            b'r' => Ok(Self::Raw),
            b'm' | b'M' => Ok(Self::Minimizer),
            b'h' => Ok(Self::Hashtable),
            other => Err(SectionError::UnknownType(other).into()),
        }
    }

    /// The tag byte emitted by the writer for this section kind.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Vars => b'v',
            Self::Index => b'i',
            Self::Raw => b'r',
            Self::Minimizer => b'M',
            Self::Hashtable => b'h',
        }
    }

    /// Peeks the section type at the current file position without advancing.
    pub fn peek(file: &mut KeroFile) -> Result<Self> {
        Self::from_tag(file.read_section_type()?)
    }
}

/// A reader over either kind of block section (`r` or `M`).
pub enum BlockSectionReader {
    Raw(RawSectionReader),
    Minimizer(MinimizerSectionReader),
}

impl BlockSectionReader {
    /// Opens the block section at the current position, or returns `None`
    /// when the next section holds no k-mer blocks.
    pub fn open(file: &mut KeroFile) -> Result<Option<Self>> {
        file.complete_header()?;
        match SectionType::peek(file)? {
            SectionType::Raw => Ok(Some(Self::Raw(RawSectionReader::open(file)?))),
            SectionType::Minimizer => {
                Ok(Some(Self::Minimizer(MinimizerSectionReader::open(file)?)))
            }
            _ => Ok(None),
        }
    }

    /// Number of blocks declared by the section header.
    #[must_use]
    pub fn nb_blocks(&self) -> u64 {
        match self {
            Self::Raw(section) => section.nb_blocks(),
            Self::Minimizer(section) => section.nb_blocks(),
        }
    }

    /// Blocks left to read or skip.
    #[must_use]
    pub fn remaining_blocks(&self) -> u64 {
        match self {
            Self::Raw(section) => section.remaining_blocks(),
            Self::Minimizer(section) => section.remaining_blocks(),
        }
    }

    /// Reads the next block into separate sequence and data buffers.
    /// Minimizer blocks come back with the minimizer reinserted.
    ///
    /// Returns the number of k-mers in the block, 0 once exhausted.
    pub fn read_block(
        &mut self,
        file: &mut KeroFile,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<u64> {
        match self {
            Self::Raw(section) => section.read_block(file, seq, data),
            Self::Minimizer(section) => Ok(section.read_block(file, seq, data)?.unwrap_or(0)),
        }
    }

    /// Reads the next block as one buffer: packed sequence immediately
    /// followed by the per-k-mer data.
    ///
    /// Returns the number of k-mers in the block, 0 once exhausted.
    pub fn read_block_packed(&mut self, file: &mut KeroFile, seq_data: &mut [u8]) -> Result<u64> {
        match self {
            Self::Raw(section) => section.read_block_packed(file, seq_data),
            Self::Minimizer(section) => {
                Ok(section.read_block_packed(file, seq_data)?.unwrap_or(0))
            }
        }
    }

    /// Skips the next block without copying its payload.
    pub fn jump_block(&mut self, file: &mut KeroFile) -> Result<()> {
        match self {
            Self::Raw(section) => section.jump_block(file),
            Self::Minimizer(section) => section.jump_block(file),
        }
    }

    /// Skips every remaining block of the section.
    pub fn jump_section(&mut self, file: &mut KeroFile) -> Result<()> {
        while self.remaining_blocks() > 0 {
            self.jump_block(file)?;
        }
        if let Self::Minimizer(section) = self {
            section.seek_section_end(file)?;
        }
        Ok(())
    }

    /// Sequence-buffer size (bytes) large enough for any block of the section.
    #[must_use]
    pub fn max_seq_bytes(&self) -> usize {
        match self {
            Self::Raw(section) => section.max_seq_bytes(),
            Self::Minimizer(section) => section.max_seq_bytes(),
        }
    }

    /// Data-buffer size (bytes) large enough for any block of the section.
    #[must_use]
    pub fn max_data_bytes(&self) -> usize {
        match self {
            Self::Raw(section) => section.max_data_bytes(),
            Self::Minimizer(section) => section.max_data_bytes(),
        }
    }
}
