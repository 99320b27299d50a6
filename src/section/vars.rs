//! Global variable (`v`) sections.
//!
//! Wire layout: `'v' [nb_vars u64 BE] ([name NUL] [value u64 BE])*`, names
//! emitted in sorted order. Every pair read or written is mirrored into the
//! container's global-variable map, where later sections override earlier
//! values per name.

use std::collections::BTreeMap;

use crate::error::{Result, SectionError};
use crate::file::KeroFile;

/// Writer for a `v` section.
///
/// Variables accumulate in a sorted map and are emitted on
/// [`close`](Self::close); the count written at creation is a placeholder
/// back-patched at that point.
pub struct VarsSectionWriter {
    beginning: u64,
    vars: BTreeMap<String, u64>,
}

impl VarsSectionWriter {
    /// Opens a `v` section at the current position.
    pub fn create(file: &mut KeroFile) -> Result<Self> {
        file.complete_header()?;
        let beginning = file.tell();
        file.register_position(b'v');
        file.write_bytes(b"v")?;
        file.write_u64(0)?; // nb_vars, back-patched on close
        Ok(Self {
            beginning,
            vars: BTreeMap::new(),
        })
    }

    /// Declares a variable, immediately visible in the container's global map.
    pub fn write_var(&mut self, file: &mut KeroFile, name: &str, value: u64) {
        self.vars.insert(name.to_string(), value);
        file.global_vars.insert(name.to_string(), value);
    }

    /// Emits the accumulated variables and back-patches the count.
    pub fn close(self, file: &mut KeroFile) -> Result<()> {
        for (name, value) in &self.vars {
            file.write_bytes(name.as_bytes())?;
            file.write_bytes(&[0])?;
            file.write_u64(*value)?;
        }
        file.write_at(&(self.vars.len() as u64).to_be_bytes(), self.beginning + 1)
    }
}

/// Reads the `v` section at the current position, mirroring every pair into
/// the container's global-variable map.
pub fn read_vars_section(file: &mut KeroFile) -> Result<BTreeMap<String, u64>> {
    let tag = file.read_u8()?;
    if tag != b'v' {
        return Err(SectionError::TypeMismatch {
            expected: 'v',
            found: tag as char,
        }
        .into());
    }

    let nb_vars = file.read_u64()?;
    let mut vars = BTreeMap::new();
    for _ in 0..nb_vars {
        let (name, value) = read_var(file)?;
        file.global_vars.insert(name.clone(), value);
        vars.insert(name, value);
    }
    Ok(vars)
}

fn read_var(file: &mut KeroFile) -> Result<(String, u64)> {
    let mut name = Vec::new();
    loop {
        if file.tell() >= file.end_position() {
            return Err(SectionError::UnexpectedEof('v').into());
        }
        match file.read_u8()? {
            0 => break,
            byte => name.push(byte),
        }
    }
    let value = file.read_u64()?;
    Ok((String::from_utf8_lossy(&name).into_owned(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::KeroFile;
    use tempfile::TempDir;

    #[test]
    fn test_vars_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vars.kero");

        let mut file = KeroFile::create(&path).unwrap();
        let mut section = VarsSectionWriter::create(&mut file).unwrap();
        section.write_var(&mut file, "k", 5);
        section.write_var(&mut file, "m", 3);
        section.write_var(&mut file, "max", 2);
        section.write_var(&mut file, "data_size", 0);
        assert_eq!(file.var("k"), Some(5));
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        let vars = read_vars_section(&mut file).unwrap();
        assert_eq!(vars.len(), 4);
        assert_eq!(vars["k"], 5);
        assert_eq!(vars["m"], 3);
        assert_eq!(vars["max"], 2);
        assert_eq!(vars["data_size"], 0);
        assert_eq!(file.var("data_size"), Some(0));
    }

    #[test]
    fn test_later_section_overrides_per_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("override.kero");

        let mut file = KeroFile::create(&path).unwrap();
        let mut section = VarsSectionWriter::create(&mut file).unwrap();
        section.write_var(&mut file, "k", 21);
        section.write_var(&mut file, "max", 100);
        section.close(&mut file).unwrap();
        let mut section = VarsSectionWriter::create(&mut file).unwrap();
        section.write_var(&mut file, "k", 31);
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        read_vars_section(&mut file).unwrap();
        read_vars_section(&mut file).unwrap();
        // the second section overrides k but leaves max in place
        assert_eq!(file.var("k"), Some(31));
        assert_eq!(file.var("max"), Some(100));
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tag.kero");

        let mut file = KeroFile::create(&path).unwrap();
        let mut section = VarsSectionWriter::create(&mut file).unwrap();
        section.write_var(&mut file, "k", 1);
        section.close(&mut file).unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        file.jump(1).unwrap(); // misalign onto the count field
        let err = read_vars_section(&mut file).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Section(SectionError::TypeMismatch { expected: 'v', .. })
        ));
    }
}
