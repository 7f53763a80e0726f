//! Record framing.

use crate::error::{CoreError, CoreResult};
use snaplog_codec::{encode_op, Op};

/// Magic bytes opening every record.
pub const RECORD_MAGIC: [u8; 4] = *b"SLOG";

/// Current record envelope version.
pub const RECORD_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
pub const HEADER_SIZE: usize = 10;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Frames one operation as a complete record.
///
/// # Errors
///
/// Returns an error if the operation cannot be encoded or its payload does
/// not fit the 4-byte length field.
pub fn encode_record(op: &Op) -> CoreResult<Vec<u8>> {
    let payload = encode_op(op)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        CoreError::writer_failed(format!(
            "record payload too large: {} bytes",
            payload.len()
        ))
    })?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&RECORD_MAGIC);
    data.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);

    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());

    Ok(data)
}

/// Parsed record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub version: u16,
    pub payload_len: usize,
}

impl RecordHeader {
    /// Parses the first [`HEADER_SIZE`] bytes of `bytes`.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_SIZE {
            return Err(format!("short header: {} bytes", bytes.len()));
        }
        if bytes[0..4] != RECORD_MAGIC {
            return Err(format!("invalid magic {:02x?}", &bytes[0..4]));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version == 0 || version > RECORD_VERSION {
            return Err(format!("unsupported record version {version}"));
        }
        let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        Ok(Self {
            version,
            payload_len,
        })
    }

    /// Length of the whole record including header and checksum.
    pub(crate) fn record_len(&self) -> usize {
        HEADER_SIZE + self.payload_len + CRC_SIZE
    }
}
