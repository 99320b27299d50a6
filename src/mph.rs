//! Minimal perfect hash wrapper for the hashtable section.
//!
//! Wraps a [`boomphf::Mphf`] over 64-bit minimizer values together with the
//! parallel value table the hashtable section stores next to it. The hash is
//! serialized straight through an in-memory buffer, so no temporary file is
//! involved in the round trip.

use boomphf::Mphf;
use log::debug;

use crate::error::{MphError, Result};

/// Space-leaning construction parameter for the minimal perfect hash.
pub const MPH_GAMMA: f64 = 1.7;

/// A minimal perfect hash over `u64` keys with a parallel `u64` value table.
///
/// Built once from the `(minimizer, section offset)` pairs registered during
/// writing; read-only afterwards. Lookups are only defined for keys that were
/// part of the build set: an absent key silently aliases to some present
/// key's slot.
#[derive(Debug)]
pub struct MphTable {
    mphf: Mphf<u64>,
    values: Vec<u64>,
}

impl MphTable {
    /// Builds the hash from parallel key/value lists.
    pub fn build(keys: &[u64], values: &[u64]) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(MphError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            }
            .into());
        }
        debug!("building minimal perfect hash over {} keys", keys.len());
        let mphf = Mphf::new(MPH_GAMMA, keys);
        let mut table = vec![0u64; keys.len()];
        for (key, value) in keys.iter().zip(values) {
            table[mphf.hash(key) as usize] = *value;
        }
        Ok(Self {
            mphf,
            values: table,
        })
    }

    /// Rebuilds the table from serialized hash bytes and a value table.
    pub fn from_parts(mph_bytes: &[u8], values: Vec<u64>) -> Result<Self> {
        let mphf = bincode::deserialize(mph_bytes)?;
        Ok(Self { mphf, values })
    }

    /// Serializes the hash state (the value table is framed separately).
    pub fn mph_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.mphf)?)
    }

    /// Looks up the value associated with `key`.
    ///
    /// Defined only for keys present at build time.
    #[must_use]
    pub fn get(&self, key: u64) -> u64 {
        self.values[self.mphf.hash(&key) as usize]
    }

    /// The value table, indexed by hash output.
    #[must_use]
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Number of keys in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let keys = [42u64, 100, 7, 123_456_789];
        let values = [10u64, 20, 30, 40];
        let table = MphTable::build(&keys, &values).unwrap();
        assert_eq!(table.len(), 4);
        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(table.get(*key), *value);
        }
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let err = MphTable::build(&[1, 2, 3], &[1]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Mph(MphError::LengthMismatch { keys: 3, values: 1 })
        ));
    }

    #[test]
    fn test_byte_round_trip() {
        let keys: Vec<u64> = (0..200).map(|i| i * 31 + 5).collect();
        let values: Vec<u64> = (0..200).map(|i| i + 1000).collect();
        let table = MphTable::build(&keys, &values).unwrap();

        let bytes = table.mph_bytes().unwrap();
        let reloaded = MphTable::from_parts(&bytes, table.values().to_vec()).unwrap();
        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(reloaded.get(*key), *value);
        }
    }
}
