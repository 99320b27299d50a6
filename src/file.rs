//! The KERO file container.
//!
//! [`KeroFile`] owns the file descriptor, the in-memory write buffer and the
//! decoded footer/index caches. Writes append to the buffer, which doubles
//! from 1 KiB up to a 1 MiB ceiling before spilling to disk; reads and
//! positioned overwrites transparently cross the disk/buffer boundary, so
//! section writers can back-patch counters and offsets no matter where they
//! landed.
//!
//! A file is opened either for writing ([`KeroFile::create`]) or for reading
//! ([`KeroFile::open`]); a single container is never both. On read, the head
//! and tail signatures are verified, then the footer and the index chain are
//! discovered and cached, and the minimizer hashtable is loaded when the
//! index names one.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::error::{FileError, HeaderError, Result};
use crate::mph::MphTable;
use crate::section::hashtable::{HashtableSection, write_hashtable_section};
use crate::section::index::{
    INDEX_ENTRY_BYTES, INDEX_HEADER_BYTES, IndexSection, write_index_section,
};
use crate::section::vars::{VarsSectionWriter, read_vars_section};
use crate::section::{BlockSectionReader, SectionType};

/// Signature framing both ends of a KERO file.
pub const SIGNATURE: [u8; 4] = *b"KERO";

/// Format version written by this library.
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 1;

/// Default nucleotide encoding byte: A=0, C=1, G=3, T=2.
pub const DEFAULT_ENCODING: u8 = 0b0001_1110;

/// Initial write buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 1 << 10;
/// Ceiling above which the write buffer spills to disk.
const MAX_BUFFER_SIZE: usize = 1 << 20;

/// Head layout: signature 0..4, major 4, minor 5, then these three.
const ENCODING_OFFSET: u64 = 6;
const UNIQUENESS_OFFSET: u64 = 7;
const CANONICITY_OFFSET: u64 = 8;

/// Name of the footer variable holding its own section size.
const FOOTER_SIZE_NAME: &[u8] = b"footer_size";

/// Distance from the end of file to the start of the `"footer_size"` name:
/// name, NUL, u64 value, tail signature.
const FOOTER_PROBE_FROM_END: u64 =
    FOOTER_SIZE_NAME.len() as u64 + 1 + 8 + SIGNATURE.len() as u64;

/// Byte size of the footer `v` section written on close: tag + count +
/// two 12-byte names with their u64 values (`first_index`, `footer_size`).
const FOOTER_SECTION_SIZE: u64 = 9 + 2 * (12 + 8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    Read,
    Closed,
}

/// Low-level handle on a KERO file.
///
/// In write mode the 9-byte prefix is emitted at construction and the header
/// is completed lazily (with empty metadata) by the first section operation.
/// [`close`](Self::close) emits the hashtable, index and footer sections when
/// indexing is active, then the tail signature, and flushes the buffer.
#[derive(Debug)]
pub struct KeroFile {
    path: PathBuf,
    mode: Mode,
    fs: Option<File>,

    writing_started: bool,
    tmp_closed: bool,

    /// In-memory tail of the file; `buffer.len()` is the `next_free` cursor.
    buffer: Vec<u8>,
    buffer_cap: usize,
    /// Bytes already on disk.
    file_size: u64,
    current_position: u64,

    header_over: bool,
    footer_discovery_ended: bool,
    indexed: bool,
    /// Position of the tail signature (read mode).
    end_position: u64,

    major_version: u8,
    minor_version: u8,
    uniqueness: bool,
    canonicity: bool,
    encoding: [u8; 4],
    metadata_size: u32,

    pub(crate) global_vars: HashMap<String, u64>,

    /// Absolute tag-byte offset of every section written so far.
    pub(crate) section_positions: BTreeMap<u64, u8>,
    /// Minimizer values and `M`-tag offsets registered for the hashtable.
    mini_list: Vec<u64>,
    mini_positions: Vec<u64>,

    footer: Option<BTreeMap<String, u64>>,
    index: Vec<IndexSection>,
    hashtable: Option<MphTable>,
}

impl KeroFile {
    fn new(path: PathBuf, mode: Mode) -> Self {
        Self {
            path,
            mode,
            fs: None,
            writing_started: false,
            tmp_closed: false,
            buffer: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            buffer_cap: INITIAL_BUFFER_SIZE,
            file_size: 0,
            current_position: 0,
            header_over: false,
            footer_discovery_ended: true,
            indexed: false,
            end_position: 0,
            major_version: VERSION_MAJOR,
            minor_version: VERSION_MINOR,
            uniqueness: false,
            canonicity: false,
            encoding: [0, 1, 3, 2],
            metadata_size: 0,
            global_vars: HashMap::new(),
            section_positions: BTreeMap::new(),
            mini_list: Vec::new(),
            mini_positions: Vec::new(),
            footer: None,
            index: Vec::new(),
            hashtable: None,
        }
    }

    /// Opens `path` for writing and emits the fixed 9-byte prefix.
    ///
    /// Files are indexed by default; see [`set_indexation`](Self::set_indexation).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = Self::new(path.as_ref().to_path_buf(), Mode::Write);
        file.indexed = true;

        let prefix = [
            SIGNATURE[0],
            SIGNATURE[1],
            SIGNATURE[2],
            SIGNATURE[3],
            VERSION_MAJOR,
            VERSION_MINOR,
            DEFAULT_ENCODING,
            0, // uniqueness
            0, // canonicity
        ];
        file.write_bytes(&prefix)?;
        debug!("created KERO file {:?}", file.path);
        Ok(file)
    }

    /// Opens `path` for reading, verifying both signatures and the version,
    /// then discovering the footer and the index chain.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = Self::new(path.as_ref().to_path_buf(), Mode::Read);
        let fs = File::open(&file.path)?;
        file.file_size = fs.metadata()?.len();
        file.fs = Some(fs);

        // Head signature
        let mut buff = [0u8; 4];
        file.read_bytes(&mut buff)?;
        if buff != SIGNATURE {
            return Err(HeaderError::MissingHeadSignature.into());
        }

        // Version
        let mut version = [0u8; 2];
        file.read_bytes(&mut version)?;
        file.major_version = version[0];
        file.minor_version = version[1];
        if (file.major_version, file.minor_version) > (VERSION_MAJOR, VERSION_MINOR) {
            return Err(HeaderError::UnsupportedVersion {
                file_major: file.major_version,
                file_minor: file.minor_version,
                reader_major: VERSION_MAJOR,
                reader_minor: VERSION_MINOR,
            }
            .into());
        }

        file.read_encoding()?;

        let mut flag = [0u8; 1];
        file.read_bytes(&mut flag)?;
        file.uniqueness = flag[0] != 0;
        file.read_bytes(&mut flag)?;
        file.canonicity = flag[0] != 0;

        let mut size = [0u8; 4];
        file.read_bytes(&mut size)?;
        file.metadata_size = BigEndian::read_u32(&size);

        // Tail signature
        let saved = file.tell();
        file.jump_from_end(SIGNATURE.len() as u64)?;
        file.end_position = file.tell();
        file.read_bytes(&mut buff)?;
        if buff != SIGNATURE {
            return Err(HeaderError::MissingTailSignature.into());
        }
        file.jump_to(saved)?;

        file.footer_discovery_ended = false;
        file.footer_discovery()?;
        file.index_discovery()?;
        file.load_hashtable()?;

        Ok(file)
    }

    // --- accessors ---

    /// Current position in the file.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.current_position
    }

    /// Total number of written bytes (disk plus buffer).
    #[must_use]
    pub fn end(&self) -> u64 {
        self.file_size + self.buffer.len() as u64
    }

    /// Position of the tail signature (read mode only).
    #[must_use]
    pub fn end_position(&self) -> u64 {
        self.end_position
    }

    /// File format version `(major, minor)`.
    #[must_use]
    pub fn version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }

    /// The four 2-bit nucleotide codes, in A, C, G, T order.
    #[must_use]
    pub fn encoding(&self) -> [u8; 4] {
        self.encoding
    }

    #[must_use]
    pub fn uniqueness(&self) -> bool {
        self.uniqueness
    }

    #[must_use]
    pub fn canonicity(&self) -> bool {
        self.canonicity
    }

    /// Declared metadata size in bytes.
    #[must_use]
    pub fn metadata_size(&self) -> u32 {
        self.metadata_size
    }

    /// Looks up a global variable populated by `v` sections.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<u64> {
        self.global_vars.get(name).copied()
    }

    /// The whole global-variable map.
    #[must_use]
    pub fn global_vars(&self) -> &HashMap<String, u64> {
        &self.global_vars
    }

    /// The decoded footer variables, when the file carries a footer.
    #[must_use]
    pub fn footer(&self) -> Option<&BTreeMap<String, u64>> {
        self.footer.as_ref()
    }

    /// The cached index chain, in traversal order.
    #[must_use]
    pub fn index(&self) -> &[IndexSection] {
        &self.index
    }

    /// The minimizer hashtable, once loaded.
    #[must_use]
    pub fn hashtable(&self) -> Option<&MphTable> {
        self.hashtable.as_ref()
    }

    pub(crate) fn set_hashtable(&mut self, table: MphTable) {
        if self.hashtable.is_none() {
            self.hashtable = Some(table);
        }
    }

    /// Absolute offset of the `M` section holding `minimizer`, through the
    /// hashtable. Only defined for minimizers present in the file.
    #[must_use]
    pub fn minimizer_offset(&self, minimizer: u64) -> Option<u64> {
        self.hashtable.as_ref().map(|table| table.get(minimizer))
    }

    #[must_use]
    pub fn is_writer(&self) -> bool {
        self.mode == Mode::Write
    }

    #[must_use]
    pub fn is_reader(&self) -> bool {
        self.mode == Mode::Read
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Toggles footer index generation (write mode, on by default).
    pub fn set_indexation(&mut self, indexed: bool) {
        if self.mode == Mode::Write {
            self.indexed = indexed;
        }
    }

    // --- raw byte I/O ---

    /// Reads `bytes.len()` bytes from the current position, crossing the
    /// disk/buffer boundary transparently.
    pub fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        if self.mode != Mode::Read {
            return Err(FileError::ReadInWriteMode.into());
        }
        let size = bytes.len() as u64;

        if self.current_position < self.file_size {
            if self.current_position + size > self.file_size {
                // Straddles the end of the disk prefix
                let fs_read_size = (self.file_size - self.current_position) as usize;
                let (head, tail) = bytes.split_at_mut(fs_read_size);
                self.read_bytes(head)?;
                return self.read_bytes(tail);
            }
            if self.fs.is_none() {
                self.fs = Some(File::open(&self.path)?);
            }
            let fs = self.fs.as_mut().expect("file handle just ensured");
            fs.seek(SeekFrom::Start(self.current_position))?;
            fs.read_exact(bytes)?;
        } else {
            let buffer_position = (self.current_position - self.file_size) as usize;
            if buffer_position as u64 + size > self.buffer.len() as u64 {
                return Err(FileError::OutOfRangeRead {
                    position: self.current_position + size,
                    end: self.end(),
                }
                .into());
            }
            bytes.copy_from_slice(&self.buffer[buffer_position..buffer_position + bytes.len()]);
        }

        self.current_position += size;
        Ok(())
    }

    /// Appends bytes, spilling the buffer to disk when it would exceed the
    /// 1 MiB ceiling.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        match self.mode {
            Mode::Write => {}
            Mode::Read => return Err(FileError::WriteInReadMode.into()),
            Mode::Closed => return Err(FileError::WriteAfterClose.into()),
        }

        let mut space = self.buffer_cap - self.buffer.len();
        while space < bytes.len() && self.buffer_cap < MAX_BUFFER_SIZE {
            self.buffer_cap *= 2;
            space = self.buffer_cap - self.buffer.len();
        }

        if space >= bytes.len() {
            self.buffer.extend_from_slice(bytes);
        } else {
            self.ensure_open_for_append()?;
            let fs = self.fs.as_mut().expect("file handle just ensured");
            fs.write_all(&self.buffer)?;
            fs.write_all(bytes)?;
            self.file_size += (self.buffer.len() + bytes.len()) as u64;
            self.buffer.clear();
        }

        self.current_position = self.end();
        Ok(())
    }

    /// Overwrites already-written bytes at `position`, wherever they live.
    /// The current position is left untouched.
    pub fn write_at(&mut self, bytes: &[u8], position: u64) -> Result<()> {
        match self.mode {
            Mode::Write => {}
            Mode::Read => return Err(FileError::WriteInReadMode.into()),
            Mode::Closed => return Err(FileError::WriteAfterClose.into()),
        }
        if position > self.end() {
            return Err(FileError::WritePastEnd {
                position,
                end: self.end(),
            }
            .into());
        }

        let size = bytes.len() as u64;
        if position < self.file_size {
            if position + size <= self.file_size {
                if self.tmp_closed {
                    self.reopen()?;
                }
                let fs = self.fs.as_mut().expect("write started before disk overwrite");
                fs.seek(SeekFrom::Start(position))?;
                fs.write_all(bytes)?;
                fs.seek(SeekFrom::Start(self.file_size))?;
            } else {
                // Straddles disk and buffer
                let in_file_size = (self.file_size - position) as usize;
                let (head, tail) = bytes.split_at(in_file_size);
                self.write_at(head, position)?;
                self.write_at(tail, position + in_file_size as u64)?;
            }
        } else {
            let corrected = (position - self.file_size) as usize;
            if corrected + bytes.len() <= self.buffer.len() {
                self.buffer[corrected..corrected + bytes.len()].copy_from_slice(bytes);
            } else {
                // Extends past the buffered tail: truncate and append
                let saved = self.current_position;
                self.buffer.truncate(corrected);
                self.write_bytes(bytes)?;
                self.current_position = saved;
            }
        }

        Ok(())
    }

    /// Relative seek; `delta` may be negative.
    pub fn jump(&mut self, delta: i64) -> Result<()> {
        let target = self.current_position as i64 + delta;
        if target < 0 {
            return Err(FileError::JumpOutOfRange {
                position: 0,
                end: self.end(),
            }
            .into());
        }
        self.jump_to(target as u64)
    }

    /// Absolute seek from the beginning of the file.
    pub fn jump_to(&mut self, position: u64) -> Result<()> {
        if self.end() < position {
            return Err(FileError::JumpOutOfRange {
                position,
                end: self.end(),
            }
            .into());
        }
        self.current_position = position;
        Ok(())
    }

    /// Absolute seek counted backwards from the last written byte.
    pub fn jump_from_end(&mut self, offset: u64) -> Result<()> {
        let Some(position) = self.end().checked_sub(offset) else {
            return Err(FileError::JumpOutOfRange {
                position: 0,
                end: self.end(),
            }
            .into());
        };
        self.jump_to(position)
    }

    /// Releases the descriptor of a writer; the next disk access reopens it.
    pub fn tmp_close(&mut self) {
        if self.mode == Mode::Write && self.fs.is_some() {
            self.fs = None;
            self.tmp_closed = true;
        }
    }

    fn reopen(&mut self) -> Result<()> {
        if self.tmp_closed {
            let mut fs = OpenOptions::new().read(true).write(true).open(&self.path)?;
            fs.seek(SeekFrom::End(0))?;
            self.fs = Some(fs);
            self.tmp_closed = false;
        }
        Ok(())
    }

    fn ensure_open_for_append(&mut self) -> Result<()> {
        if !self.writing_started {
            self.fs = Some(File::create(&self.path)?);
            self.writing_started = true;
        } else if self.tmp_closed {
            self.reopen()?;
        }
        Ok(())
    }

    // --- fixed-width big-endian helpers ---

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buff = [0u8; 1];
        self.read_bytes(&mut buff)?;
        Ok(buff[0])
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buff = [0u8; 8];
        self.read_bytes(&mut buff)?;
        Ok(BigEndian::read_u64(&buff))
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buff = [0u8; 8];
        BigEndian::write_u64(&mut buff, value);
        self.write_bytes(&buff)
    }

    /// Reads an unsigned big-endian integer of `nbytes` (0 to 8) bytes.
    /// Zero bytes decodes as zero without touching the file.
    pub fn read_uint(&mut self, nbytes: usize) -> Result<u64> {
        debug_assert!(nbytes <= 8);
        if nbytes == 0 {
            return Ok(0);
        }
        let mut buff = [0u8; 8];
        self.read_bytes(&mut buff[..nbytes])?;
        Ok(BigEndian::read_uint(&buff[..nbytes], nbytes))
    }

    /// Writes `value` as an unsigned big-endian integer of `nbytes` (0 to 8)
    /// bytes. Zero bytes writes nothing.
    pub fn write_uint(&mut self, value: u64, nbytes: usize) -> Result<()> {
        debug_assert!(nbytes <= 8);
        if nbytes == 0 {
            return Ok(());
        }
        let mut buff = [0u8; 8];
        BigEndian::write_uint(&mut buff[..nbytes], value, nbytes);
        self.write_bytes(&buff[..nbytes])
    }

    // --- header ---

    fn read_encoding(&mut self) -> Result<()> {
        let mut code = [0u8; 1];
        self.read_bytes(&mut code)?;
        let code = code[0];
        let a = (code >> 6) & 0b11;
        let c = (code >> 4) & 0b11;
        let g = (code >> 2) & 0b11;
        let t = code & 0b11;
        if a == c || a == g || a == t || c == g || c == t || g == t {
            return Err(HeaderError::InvalidEncoding(code).into());
        }
        self.encoding = [a, c, g, t];
        Ok(())
    }

    /// Sets the 2-bit codes for A, C, G, T and back-patches the header byte.
    /// The four values must be distinct.
    pub fn write_encoding(&mut self, a: u8, c: u8, g: u8, t: u8) -> Result<()> {
        let (a, c, g, t) = (a & 0b11, c & 0b11, g & 0b11, t & 0b11);
        let code = (a << 6) | (c << 4) | (g << 2) | t;
        if a == c || a == g || a == t || c == g || c == t || g == t {
            return Err(HeaderError::InvalidEncoding(code).into());
        }
        self.encoding = [a, c, g, t];
        self.write_at(&[code], ENCODING_OFFSET)
    }

    /// Records whether no k-mer appears twice in the file.
    pub fn set_uniqueness(&mut self, uniqueness: bool) -> Result<()> {
        self.uniqueness = uniqueness;
        self.write_at(&[u8::from(uniqueness)], UNIQUENESS_OFFSET)
    }

    /// Records whether the file is free of reverse complements.
    pub fn set_canonicity(&mut self, canonicity: bool) -> Result<()> {
        self.canonicity = canonicity;
        self.write_at(&[u8::from(canonicity)], CANONICITY_OFFSET)
    }

    /// Writes the user metadata field. Must precede every section; sections
    /// written without it get a zero-length field.
    pub fn write_metadata(&mut self, data: &[u8]) -> Result<()> {
        if self.header_over {
            return Err(HeaderError::MetadataAlreadyWritten.into());
        }
        let mut size = [0u8; 4];
        BigEndian::write_u32(&mut size, data.len() as u32);
        self.write_bytes(&size)?;
        self.write_bytes(data)?;
        self.metadata_size = data.len() as u32;
        self.header_over = true;
        Ok(())
    }

    /// Reads the metadata field (read mode, before any section access).
    pub fn read_metadata(&mut self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.metadata_size as usize];
        self.read_bytes(&mut data)?;
        self.header_over = true;
        Ok(data)
    }

    /// Finishes the header before the first section operation: skips unread
    /// metadata on the read path, emits empty metadata on the write path.
    pub fn complete_header(&mut self) -> Result<()> {
        if self.header_over {
            return Ok(());
        }
        match self.mode {
            Mode::Read => {
                self.jump(i64::from(self.metadata_size))?;
                self.header_over = true;
            }
            Mode::Write => self.write_metadata(&[])?,
            Mode::Closed => {}
        }
        Ok(())
    }

    // --- sections ---

    /// Peeks the section tag byte at the current position without advancing.
    pub fn read_section_type(&mut self) -> Result<u8> {
        if !self.header_over {
            self.complete_header()?;
        }
        if self.current_position < self.file_size {
            if self.fs.is_none() {
                self.fs = Some(File::open(&self.path)?);
            }
            let fs = self.fs.as_mut().expect("file handle just ensured");
            fs.seek(SeekFrom::Start(self.current_position))?;
            let mut tag = [0u8; 1];
            fs.read_exact(&mut tag)?;
            Ok(tag[0])
        } else {
            let buffer_position = (self.current_position - self.file_size) as usize;
            match self.buffer.get(buffer_position) {
                Some(&tag) => Ok(tag),
                None => Err(FileError::OutOfRangeRead {
                    position: self.current_position,
                    end: self.end(),
                }
                .into()),
            }
        }
    }

    /// Skips the next section if it is a block section (`r`, `m` or `M`).
    ///
    /// Returns whether a section was skipped.
    pub fn jump_next_section(&mut self) -> Result<bool> {
        if self.mode != Mode::Read {
            return Ok(false);
        }
        if self.current_position >= self.end() {
            return Ok(false);
        }
        match SectionType::from_tag(self.read_section_type()?) {
            Ok(SectionType::Raw | SectionType::Minimizer) => {
                if let Some(mut section) = BlockSectionReader::open(self)? {
                    section.jump_section(self)?;
                    return Ok(true);
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Records the tag offset of a section being written, for the index.
    pub(crate) fn register_position(&mut self, section_type: u8) {
        if self.mode == Mode::Write && self.indexed {
            self.section_positions
                .insert(self.current_position, section_type);
        }
    }

    /// Records a minimizer section for the footer hashtable. The current
    /// position must be the section's tag byte.
    pub(crate) fn register_minimizer_section(&mut self, minimizer: u64) {
        if self.mode == Mode::Write && self.indexed {
            self.mini_list.push(minimizer);
            self.mini_positions.push(self.current_position);
        }
    }

    // --- footer and index discovery ---

    fn footer_discovery(&mut self) -> Result<()> {
        self.footer_discovery_ended = true;
        if self.end() < FOOTER_PROBE_FROM_END + FOOTER_SECTION_SIZE {
            return Ok(());
        }
        let saved = self.tell();

        self.jump_from_end(FOOTER_PROBE_FROM_END)?;
        let mut name = [0u8; FOOTER_SIZE_NAME.len()];
        self.read_bytes(&mut name)?;
        if name != *FOOTER_SIZE_NAME {
            debug!("no footer found in {:?}", self.path);
            self.jump_to(saved)?;
            return Ok(());
        }
        self.jump(1)?; // NUL terminator
        let size = self.read_u64()?;

        self.jump_from_end(size + SIGNATURE.len() as u64)?;
        let vars = read_vars_section(self)?;
        debug!("footer found with {} variables", vars.len());
        self.footer = Some(vars);

        self.jump_to(saved)
    }

    fn index_discovery(&mut self) -> Result<()> {
        let saved = self.tell();
        let was_header_over = self.header_over;
        self.complete_header()?;

        if let Some(first_index) = self.footer.as_ref().and_then(|f| f.get("first_index")) {
            let first_index = *first_index;
            self.indexed = true;
            self.read_index_chain(first_index)?;
        }

        if !self.indexed && self.read_section_type()? == b'i' {
            self.indexed = true;
            let position = self.tell();
            self.read_index_chain(position)?;
        }

        self.header_over = was_header_over;
        self.jump_to(saved)
    }

    fn read_index_chain(&mut self, mut position: u64) -> Result<()> {
        let initial = self.tell();

        while position != 0 {
            self.jump_to(position)?;
            let section = IndexSection::read(self)?;
            let next = section.next_index();
            self.index.push(section);
            position = if next == 0 {
                0
            } else {
                (self.tell() as i64 + next) as u64
            };
        }
        debug!("index chain of {} section(s) cached", self.index.len());

        self.jump_to(initial)
    }

    fn load_hashtable(&mut self) -> Result<()> {
        let offset = self
            .index
            .iter()
            .flat_map(IndexSection::absolute_entries)
            .find(|&(_, tag)| tag == b'h')
            .map(|(offset, _)| offset);
        if let Some(offset) = offset {
            let saved = self.tell();
            self.jump_to(offset)?;
            let section = HashtableSection::read(self)?;
            self.hashtable = Some(section.into_table());
            self.jump_to(saved)?;
        }
        Ok(())
    }

    // --- close ---

    fn write_footer(&mut self) -> Result<()> {
        self.complete_header()?;

        // Hashtable over the registered minimizer sections
        let minimizers = std::mem::take(&mut self.mini_list);
        let positions = std::mem::take(&mut self.mini_positions);
        write_hashtable_section(self, &minimizers, &positions)?;

        // Single index section cataloguing every registered position
        let index_start = self.tell();
        let end_of_index = index_start
            + INDEX_HEADER_BYTES
            + INDEX_ENTRY_BYTES * self.section_positions.len() as u64;
        let entries: BTreeMap<i64, u8> = self
            .section_positions
            .iter()
            .map(|(&absolute, &tag)| (absolute as i64 - end_of_index as i64, tag))
            .collect();
        write_index_section(self, &entries, 0)?;

        // Footer variables
        let mut footer = VarsSectionWriter::create(self)?;
        footer.write_var(self, "first_index", index_start);
        footer.write_var(self, "footer_size", FOOTER_SECTION_SIZE);
        footer.close(self)
    }

    /// Finishes the file.
    ///
    /// In write mode, emits the footer region (hashtable, index, footer
    /// variables) when indexing is active, writes the tail signature and
    /// flushes the buffer to disk. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        match self.mode {
            Mode::Write => {
                if self.indexed {
                    self.write_footer()?;
                }
                self.write_bytes(&SIGNATURE)?;

                self.ensure_open_for_append()?;
                let fs = self.fs.as_mut().expect("file handle just ensured");
                fs.write_all(&self.buffer)?;
                fs.flush()?;
                self.file_size += self.buffer.len() as u64;
                self.buffer.clear();
                self.fs = None;
                debug!("closed KERO file {:?} ({} bytes)", self.path, self.file_size);
            }
            Mode::Read => {
                self.fs = None;
            }
            Mode::Closed => {}
        }
        self.tmp_closed = false;
        self.mode = Mode::Closed;
        Ok(())
    }
}
