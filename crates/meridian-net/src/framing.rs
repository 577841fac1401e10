//! Fixed-header framing for TCP streams.
//!
//! Every packet on the wire is a 4-byte header followed by the payload:
//!
//! ```text
//! +------------------+------------------+--------------------+
//! | type (2 bytes)   | size (2 bytes)   |   payload          |
//! | u16 little-endian| u16 little-endian|   (size bytes)     |
//! +------------------+------------------+--------------------+
//! ```
//!
//! There is no checksum and no sequence number. A stream that ends inside a
//! header or inside a payload is unrecoverable: the reader reports
//! [`FrameError::Truncated`] and never tries to find the next frame boundary.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the `type` + `size` header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 16-bit size field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit in the 16-bit size field.
    #[error("payload size {size} exceeds maximum {MAX_PAYLOAD_SIZE}")]
    PayloadTooLarge {
        /// The actual payload size.
        size: usize,
    },

    /// The stream ended cleanly before a new frame started, or the
    /// connection is no longer live.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream or buffer ended in the middle of a frame or field.
    #[error("truncated frame: expected {expected} bytes, got {received}")]
    Truncated {
        /// Bytes the header (or field prefix) promised.
        expected: usize,
        /// Bytes actually available.
        received: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid string field: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One application message: a 16-bit type code and its payload.
///
/// The header `size` is always derived from the payload, so it cannot drift
/// from the actual payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: u16,
    payload: Vec<u8>,
}

impl Packet {
    /// Create a packet, rejecting payloads longer than [`MAX_PAYLOAD_SIZE`].
    pub fn new(packet_type: impl Into<u16>, payload: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
            });
        }
        Ok(Self {
            packet_type: packet_type.into(),
            payload,
        })
    }

    /// Create a packet with an empty payload.
    pub fn empty(packet_type: impl Into<u16>) -> Self {
        Self {
            packet_type: packet_type.into(),
            payload: Vec::new(),
        }
    }

    /// Create a packet whose payload is a single length-prefixed string.
    pub fn with_string(packet_type: impl Into<u16>, text: &str) -> Result<Self, FrameError> {
        let mut payload = Vec::with_capacity(2 + text.len());
        crate::payload::put_string(&mut payload, text)?;
        Self::new(packet_type, payload)
    }

    /// The raw type code.
    pub fn packet_type(&self) -> u16 {
        self.packet_type
    }

    /// The header size field; always equal to `payload().len()`.
    pub fn size(&self) -> u16 {
        // Bounded by the constructor.
        self.payload.len() as u16
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the packet and return its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.packet_type.to_le_bytes());
        buf.extend_from_slice(&self.size().to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns the packet and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: buf.len(),
            });
        }
        let (packet_type, size) = parse_header([buf[0], buf[1], buf[2], buf[3]]);
        let body = &buf[HEADER_SIZE..];
        if body.len() < size {
            return Err(FrameError::Truncated {
                expected: size,
                received: body.len(),
            });
        }
        let packet = Self {
            packet_type,
            payload: body[..size].to_vec(),
        };
        Ok((packet, HEADER_SIZE + size))
    }
}

fn parse_header(header: [u8; HEADER_SIZE]) -> (u16, usize) {
    let packet_type = u16::from_le_bytes([header[0], header[1]]);
    let size = u16::from_le_bytes([header[2], header[3]]) as usize;
    (packet_type, size)
}

/// Fill `buf` from the reader, stopping early only at end of stream.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Read a single frame from the stream.
///
/// Blocks until the full frame is available. Returns
/// [`FrameError::ConnectionClosed`] if the stream ends before any header byte,
/// and [`FrameError::Truncated`] if it ends anywhere inside the frame.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    match read_full(reader, &mut header).await? {
        0 => return Err(FrameError::ConnectionClosed),
        HEADER_SIZE => {}
        received => {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received,
            });
        }
    }

    let (packet_type, size) = parse_header(header);

    let mut payload = vec![0u8; size];
    if size > 0 {
        let received = read_full(reader, &mut payload).await?;
        if received != size {
            return Err(FrameError::Truncated {
                expected: size,
                received,
            });
        }
    }

    Ok(Packet {
        packet_type,
        payload,
    })
}

/// Write a single frame to the stream as one contiguous buffer.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
) -> Result<(), FrameError> {
    writer.write_all(&packet.encode()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PacketType;
    use tokio::io::duplex;

    #[test]
    fn test_header_is_little_endian() {
        let packet = Packet::new(0x0102u16, vec![0xAA; 3]).unwrap();
        let bytes = packet.encode();
        assert_eq!(&bytes[..HEADER_SIZE], &[0x02, 0x01, 0x03, 0x00]);
        assert_eq!(&bytes[HEADER_SIZE..], &[0xAA, 0xAA, 0xAA]);
    }

    #[test]
    fn test_boundary_payload_lengths_decode() {
        for len in [0usize, 1, 255, 256, MAX_PAYLOAD_SIZE] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let packet = Packet::new(PacketType::GameData, payload.clone()).unwrap();
            let (decoded, consumed) = Packet::decode(&packet.encode()).unwrap();
            assert_eq!(consumed, HEADER_SIZE + len);
            assert_eq!(decoded.packet_type(), 200);
            assert_eq!(decoded.size() as usize, len);
            assert_eq!(decoded.payload(), payload.as_slice());
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = Packet::new(1u16, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size }) if size == MAX_PAYLOAD_SIZE + 1
        ));
    }

    #[test]
    fn test_decode_short_header() {
        let result = Packet::decode(&[1, 0, 4]);
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: 3
            })
        ));
    }

    #[test]
    fn test_decode_size_exceeds_buffer() {
        // Header claims 10 bytes, only 2 follow.
        let result = Packet::decode(&[1, 0, 10, 0, b'h', b'i']);
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: 10,
                received: 2
            })
        ));
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let mut bytes = Packet::new(1u16, b"abc".to_vec()).unwrap().encode();
        bytes.extend_from_slice(&[9, 9]);
        let (packet, consumed) = Packet::decode(&bytes).unwrap();
        assert_eq!(packet.payload(), b"abc");
        assert_eq!(consumed, bytes.len() - 2);
    }

    #[tokio::test]
    async fn test_multiple_packets_in_sequence() {
        let (mut client, mut server) = duplex(8192);
        let packets = [
            Packet::new(1u16, b"first".to_vec()).unwrap(),
            Packet::empty(PacketType::ZoneData),
            Packet::new(202u16, b"third".to_vec()).unwrap(),
        ];
        for packet in &packets {
            write_packet(&mut client, packet).await.unwrap();
        }
        for expected in &packets {
            assert_eq!(&read_packet(&mut server).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_partial_read_resumes_correctly() {
        // A tiny duplex buffer forces the frame across many reads.
        let (mut client, mut server) = duplex(3);
        let packet = Packet::new(201u16, b"this payload is larger than the buffer".to_vec()).unwrap();

        let sent = packet.clone();
        let write_task = tokio::spawn(async move {
            write_packet(&mut client, &sent).await.unwrap();
        });

        let received = read_packet(&mut server).await.unwrap();
        write_task.await.unwrap();
        assert_eq!(received, packet);
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_closed() {
        let (client, mut server) = duplex(64);
        drop(client);
        let result = read_packet(&mut server).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_eof_inside_header_is_truncated() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[1, 0]).await.unwrap();
        drop(client);
        let result = read_packet(&mut server).await;
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_size_field_longer_than_stream() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[1, 0, 8, 0, b'p', b'i']).await.unwrap();
        drop(client);
        let result = read_packet(&mut server).await;
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: 8,
                received: 2
            })
        ));
    }
}
