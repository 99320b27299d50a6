#![doc = include_str!("../README.md")]

/// Bit-level primitives for packed nucleotide arrays
pub mod bits;

/// Integer compression codec for minimizer section columns
pub mod codec;

/// Error definitions
pub mod error;

/// The KERO file container
pub mod file;

/// Read-only memory-mapped file access
pub mod mmap;

/// Minimal perfect hash wrapper for the hashtable section
pub mod mph;

/// High-level block and k-mer streaming
pub mod reader;

/// Typed file sections
pub mod section;

pub use error::{Error, Result};
pub use file::KeroFile;
pub use mmap::MmapAccessor;
pub use mph::MphTable;
pub use reader::KeroReader;
pub use section::SectionType;
