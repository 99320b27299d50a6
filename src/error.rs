/// Custom Result type for kero operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the kero library, encompassing all possible error
/// cases that can occur while writing or reading a KERO file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to the fixed file header and footer framing
    #[error("Error processing header: {0}")]
    Header(#[from] HeaderError),

    /// Errors raised inside a section frame
    #[error("Error processing section: {0}")]
    Section(#[from] SectionError),

    /// Errors raised by the file container itself
    #[error("File access error: {0}")]
    File(#[from] FileError),

    /// Errors related to the minimizer hashtable
    #[error("Hashtable error: {0}")]
    Mph(#[from] MphError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the integer compression codec
    #[error("Integer codec error: {0}")]
    Codec(#[from] pco::errors::PcoError),

    /// Errors while serializing or deserializing the minimal perfect hash
    #[error("Hash serialization error: {0}")]
    MphCodec(#[from] bincode::Error),
}

/// Errors specific to the file signature, version, encoding and metadata
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The `KERO` signature is absent at the head of the file
    #[error("Absent KERO signature at the beginning of the file")]
    MissingHeadSignature,

    /// The `KERO` signature is absent at the tail of the file
    #[error("Absent KERO signature at the end of the file")]
    MissingTailSignature,

    /// The file was written by a newer library version than this reader
    #[error(
        "Reader version {reader_major}.{reader_minor} cannot read a file written in version {file_major}.{file_minor}"
    )]
    UnsupportedVersion {
        file_major: u8,
        file_minor: u8,
        reader_major: u8,
        reader_minor: u8,
    },

    /// The encoding byte does not define four distinct 2-bit codes
    #[error("Invalid encoding byte {0:#010b}: the four 2-bit values must be distinct")]
    InvalidEncoding(u8),

    /// Metadata can only be written once, before any section
    #[error("The metadata must be written prior to any other content")]
    MetadataAlreadyWritten,
}

/// Corruption errors raised while decoding a section frame
#[derive(thiserror::Error, Debug)]
pub enum SectionError {
    /// The byte at a section boundary is not a known section tag
    #[error("Unknown section type byte {0}")]
    UnknownType(u8),

    /// A section constructor was pointed at a different section type
    #[error("Section starts with {found:?}, expected {expected:?}")]
    TypeMismatch { expected: char, found: char },

    /// A block section was opened without one of its required global variables
    #[error("Variable {0} is required but absent from the file")]
    MissingVariable(String),

    /// The file ended in the middle of a section frame
    #[error("End of file reached inside a {0:?} section")]
    UnexpectedEof(char),

    /// A compressed column decoded to the wrong number of elements
    #[error("Column decoded to {found} elements, expected {expected}")]
    DecodedLengthMismatch { expected: usize, found: usize },
}

/// Precondition and range errors raised by the [`KeroFile`](crate::KeroFile) container
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    /// A read was attempted on a container opened for writing
    #[error("Cannot read a file in writing mode")]
    ReadInWriteMode,

    /// A write was attempted on a container opened for reading
    #[error("Cannot write a file in reading mode")]
    WriteInReadMode,

    /// A write was attempted after the container was closed
    #[error("Cannot write a closed file")]
    WriteAfterClose,

    /// A read went past the last written byte
    #[error("Read out of the file, byte {position} of {end}")]
    OutOfRangeRead { position: u64, end: u64 },

    /// A positioned overwrite targeted bytes that were never written
    #[error("Cannot write at byte {position} past the end of file ({end})")]
    WritePastEnd { position: u64, end: u64 },

    /// A seek targeted a position past the last written byte
    #[error("Jump out of the file, byte {position} of {end}")]
    JumpOutOfRange { position: u64, end: u64 },
}

/// Precondition errors raised while building the minimizer hashtable
#[derive(thiserror::Error, Debug)]
pub enum MphError {
    /// The key and value lists must be the same length
    #[error("Hashtable keys ({keys}) and values ({values}) differ in length")]
    LengthMismatch { keys: usize, values: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_header_error() {
        let error: Error = HeaderError::MissingHeadSignature.into();
        assert!(matches!(error, Error::Header(_)));
        let msg = format!("{error}");
        assert!(msg.contains("beginning"));
    }

    #[test]
    fn test_error_from_section_error() {
        let error: Error = SectionError::UnknownType(b'x').into();
        assert!(matches!(error, Error::Section(_)));
        assert!(format!("{error}").contains("120"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let error = SectionError::TypeMismatch {
            expected: 'v',
            found: 'r',
        };
        let msg = format!("{error}");
        assert!(msg.contains("'v'"));
        assert!(msg.contains("'r'"));
    }

    #[test]
    fn test_out_of_range_display() {
        let error = FileError::OutOfRangeRead {
            position: 150,
            end: 100,
        };
        let msg = format!("{error}");
        assert!(msg.contains("150"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_unsupported_version_display() {
        let error = HeaderError::UnsupportedVersion {
            file_major: 1,
            file_minor: 2,
            reader_major: 0,
            reader_minor: 1,
        };
        let msg = format!("{error}");
        assert!(msg.contains("1.2"));
        assert!(msg.contains("0.1"));
    }
}
