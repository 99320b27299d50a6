//! Integer-compression collaborator for the minimizer section columns.
//!
//! The column frames only record the compressed byte count; the number of
//! decoded elements is tracked separately by the section (`nb_blocks` for the
//! count and offset columns, an explicit byte count for the data column), so
//! every decode validates the element count it was asked for.

use pco::ChunkConfig;
use pco::standalone::{simple_compress, simple_decompress};

use crate::error::{Result, SectionError};

/// Compresses a slice of 64-bit values.
pub fn encode_u64(values: &[u64]) -> Result<Vec<u8>> {
    Ok(simple_compress(values, &ChunkConfig::default())?)
}

/// Decompresses exactly `expected` 64-bit values.
pub fn decode_u64(bytes: &[u8], expected: usize) -> Result<Vec<u64>> {
    let values = simple_decompress::<u64>(bytes)?;
    if values.len() != expected {
        return Err(SectionError::DecodedLengthMismatch {
            expected,
            found: values.len(),
        }
        .into());
    }
    Ok(values)
}

/// Compresses a slice of bytes.
///
/// The codec has no 8-bit number type, so bytes are widened to `u16` before
/// compression; the delta stage absorbs the cost.
pub fn encode_u8(values: &[u8]) -> Result<Vec<u8>> {
    let widened: Vec<u16> = values.iter().map(|&b| u16::from(b)).collect();
    Ok(simple_compress(&widened, &ChunkConfig::default())?)
}

/// Decompresses exactly `expected` bytes.
pub fn decode_u8(bytes: &[u8], expected: usize) -> Result<Vec<u8>> {
    let widened = simple_decompress::<u16>(bytes)?;
    if widened.len() != expected {
        return Err(SectionError::DecodedLengthMismatch {
            expected,
            found: widened.len(),
        }
        .into());
    }
    Ok(widened.iter().map(|&v| v as u8).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_round_trip() {
        let values: Vec<u64> = (0..500).map(|i| i * 3 + 7).collect();
        let encoded = encode_u64(&values).unwrap();
        let decoded = decode_u64(&encoded, values.len()).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_u64_empty() {
        let encoded = encode_u64(&[]).unwrap();
        let decoded = decode_u64(&encoded, 0).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_u8_round_trip() {
        let values: Vec<u8> = (0..=255).collect();
        let encoded = encode_u8(&values).unwrap();
        let decoded = decode_u8(&encoded, values.len()).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_wrong_count_is_rejected() {
        let encoded = encode_u64(&[1, 2, 3]).unwrap();
        let err = decode_u64(&encoded, 4).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Section(SectionError::DecodedLengthMismatch { .. })
        ));
    }
}
