//! Hashtable (`h`) sections: minimal perfect hash over the file's minimizers.
//!
//! Wire layout: `'h' [mph_size u64 BE] [mph bytes] [nb_entries u64 BE]
//! [value u64 BE]*`. The value at index `mph(minimizer)` is the absolute
//! offset of that minimizer's `M` section tag byte. At most one hashtable
//! section is written per file, in the footer region.

use log::debug;

use crate::error::{Result, SectionError};
use crate::file::KeroFile;
use crate::mph::MphTable;

/// A decoded `h` section.
pub struct HashtableSection {
    table: MphTable,
}

impl HashtableSection {
    /// Reads the `h` section at the current position.
    pub fn read(file: &mut KeroFile) -> Result<Self> {
        let tag = file.read_u8()?;
        if tag != b'h' {
            return Err(SectionError::TypeMismatch {
                expected: 'h',
                found: tag as char,
            }
            .into());
        }

        let mph_size = file.read_u64()? as usize;
        let mut mph_bytes = vec![0u8; mph_size];
        file.read_bytes(&mut mph_bytes)?;

        let nb_entries = file.read_u64()?;
        let mut values = Vec::with_capacity(nb_entries as usize);
        for _ in 0..nb_entries {
            values.push(file.read_u64()?);
        }
        debug!("hashtable section loaded with {nb_entries} minimizers");

        Ok(Self {
            table: MphTable::from_parts(&mph_bytes, values)?,
        })
    }

    /// Absolute file offset of the `M` section holding `minimizer`.
    ///
    /// Only defined for minimizers present in the file.
    #[must_use]
    pub fn lookup(&self, minimizer: u64) -> u64 {
        self.table.get(minimizer)
    }

    #[must_use]
    pub fn table(&self) -> &MphTable {
        &self.table
    }

    #[must_use]
    pub fn into_table(self) -> MphTable {
        self.table
    }
}

/// Builds the MPH over the registered minimizers and writes the `h` section.
/// Writes nothing when no minimizer section was registered.
pub(crate) fn write_hashtable_section(
    file: &mut KeroFile,
    minimizers: &[u64],
    positions: &[u64],
) -> Result<()> {
    if minimizers.is_empty() {
        return Ok(());
    }
    let table = MphTable::build(minimizers, positions)?;

    file.register_position(b'h');
    file.write_bytes(b"h")?;
    let mph_bytes = table.mph_bytes()?;
    file.write_u64(mph_bytes.len() as u64)?;
    file.write_bytes(&mph_bytes)?;
    file.write_u64(table.len() as u64)?;
    for &value in table.values() {
        file.write_u64(value)?;
    }
    Ok(())
}
