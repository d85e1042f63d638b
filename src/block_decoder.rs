//! Decoder for IEEE 488.2 definite-length arbitrary blocks.
//!
//! A block is `#`, one ASCII digit `D` (1-9), `D` ASCII digits giving the payload length `L`,
//! then exactly `L` raw bytes. The payload is binary; newlines inside it carry no meaning.

use std::io::{self, Read};

/// Marker byte that starts every block.
pub const BLOCK_MARKER: u8 = b'#';

#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("Expected block marker '#' but got 0x{found:02x}")]
    MissingMarker { found: u8 },

    #[error("Invalid length-of-length byte 0x{found:02x}, expected '1'..='9'")]
    InvalidLengthOfLength { found: u8 },

    #[error("Invalid length digit 0x{found:02x}")]
    InvalidLengthDigit { found: u8 },

    #[error("Stream ended inside block: expected {expected} bytes of {part}, got {received}")]
    Truncated {
        part: &'static str,
        expected: usize,
        received: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Payload of one decoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBlock {
    data: Vec<u8>,
}

impl BinaryBlock {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Declared payload length, which always equals the number of bytes read.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decode one block from `reader`.
///
/// Reads nothing past the first byte when the marker is wrong, and nothing past the payload
/// on success.
pub fn decode_block<R: Read + ?Sized>(reader: &mut R) -> Result<BinaryBlock, BlockError> {
    let [marker] = read_header_bytes::<1, R>(reader, "marker")?;
    if marker != BLOCK_MARKER {
        return Err(BlockError::MissingMarker { found: marker });
    }

    let [length_of_length] = read_header_bytes::<1, R>(reader, "length-of-length")?;
    let digits = match length_of_length {
        b'1'..=b'9' => usize::from(length_of_length - b'0'),
        found => return Err(BlockError::InvalidLengthOfLength { found }),
    };

    let length = read_length(reader, digits)?;
    log::debug!("Block header announces {} payload bytes", length);

    let mut data = Vec::with_capacity(length.min(1 << 20));
    let received = (&mut *reader).take(length as u64).read_to_end(&mut data)?;
    if received != length {
        return Err(BlockError::Truncated {
            part: "payload",
            expected: length,
            received,
        });
    }

    Ok(BinaryBlock { data })
}

fn read_header_bytes<const N: usize, R: Read + ?Sized>(
    reader: &mut R,
    part: &'static str,
) -> Result<[u8; N], BlockError> {
    let mut buf = [0u8; N];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(BlockError::Truncated {
            part,
            expected: N,
            received: 0,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Parse `digits` ASCII decimal digits. Nine digits always fit in a `usize`.
fn read_length<R: Read + ?Sized>(reader: &mut R, digits: usize) -> Result<usize, BlockError> {
    let mut length = 0usize;
    for read in 0..digits {
        let [digit] = read_header_bytes::<1, R>(reader, "length digits").map_err(|e| match e {
            BlockError::Truncated { part, .. } => BlockError::Truncated {
                part,
                expected: digits,
                received: read,
            },
            other => other,
        })?;
        if !digit.is_ascii_digit() {
            return Err(BlockError::InvalidLengthDigit { found: digit });
        }
        length = length * 10 + usize::from(digit - b'0');
    }
    Ok(length)
}
