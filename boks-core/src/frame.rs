//! Boks protocol frame structure and encoding/decoding

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    error::{Error, Result},
    FRAME_OVERHEAD, MAX_PAYLOAD_SIZE,
};

/// Boks protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬─────────────┐
/// │   Opcode    │   Length    │   Payload   │  Checksum   │
/// │   1 byte    │   1 byte    │   N bytes   │   1 byte    │
/// └─────────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// The checksum is the 8-bit sum of every preceding byte.
///
/// # Examples
///
/// ```
/// use boks_core::Frame;
///
/// let frame = Frame::new(0x07, &b""[..]);
/// let encoded = frame.encode().unwrap();
/// assert_eq!(&encoded[..], &[0x07, 0x00, 0x07]);
///
/// let decoded = Frame::decode(&encoded).unwrap();
/// assert_eq!(decoded.opcode, 0x07);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Opcode identifying the command, notification or log event
    pub opcode: u8,

    /// Frame payload (opcode-specific data)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(opcode: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Checksum this frame would carry on the wire
    pub fn checksum(&self) -> u8 {
        let mut body = Vec::with_capacity(2 + self.payload.len());
        body.push(self.opcode);
        body.push(self.payload.len() as u8);
        body.extend_from_slice(&self.payload);
        checksum::calculate(&body)
    }

    /// Encode frame to bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the payload exceeds 255 bytes (the length field
    /// is a single byte).
    pub fn encode(&self) -> Result<BytesMut> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + self.payload.len());
        buf.put_u8(self.opcode);
        buf.put_u8(self.payload.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_u8(checksum::calculate(&buf));

        Ok(buf)
    }

    /// Decode a frame from raw bytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than 3 bytes (opcode + length + checksum)
    /// - The trailing checksum byte does not match
    /// - The length byte disagrees with the actual payload size
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < FRAME_OVERHEAD {
            return Err(Error::FrameTooShort {
                expected: FRAME_OVERHEAD,
                actual: raw.len(),
            });
        }

        let expected = checksum::calculate(&raw[..raw.len() - 1]);
        let received = raw[raw.len() - 1];
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        let declared = raw[1] as usize;
        let actual = raw.len() - FRAME_OVERHEAD;
        if declared != actual {
            return Err(Error::LengthMismatch { declared, actual });
        }

        Ok(Self {
            opcode: raw[0],
            payload: Bytes::copy_from_slice(&raw[2..raw.len() - 1]),
        })
    }

    /// Total size of the encoded frame
    pub fn size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("opcode", &format!("0x{:02X}", self.opcode))
            .field("checksum", &format!("0x{:02X}", self.checksum()))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[0x{:02X}](len={})",
            self.opcode,
            self.payload.len()
        )
    }
}
