//! Application packet type codes and the scalar payload encodings.
//!
//! Strings are a 2-byte little-endian length followed by the raw bytes, with
//! no terminator. 32-bit integers are 4 bytes little-endian, two's complement.
//! Readers advance a caller-held offset so several fields can be read from one
//! payload in sequence.

use crate::framing::FrameError;

/// Packet type codes shared by the services.
///
/// The networking core itself never interprets these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    /// Echo request or response.
    Echo = 1,
    /// Client credentials for the auth service.
    AuthRequest = 100,
    /// Auth service verdict.
    AuthResponse = 101,
    /// Login request routed through the gateway.
    LoginRequest = 102,
    /// Gateway login verdict.
    LoginResponse = 103,
    /// Generic simulation data.
    GameData = 200,
    /// Player movement.
    PlayerMove = 201,
    /// Chat line.
    PlayerChat = 202,
    /// Zone transfer request.
    ZoneChange = 300,
    /// Zone description.
    ZoneData = 301,
}

impl From<PacketType> for u16 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u16
    }
}

impl TryFrom<u16> for PacketType {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Echo,
            100 => Self::AuthRequest,
            101 => Self::AuthResponse,
            102 => Self::LoginRequest,
            103 => Self::LoginResponse,
            200 => Self::GameData,
            201 => Self::PlayerMove,
            202 => Self::PlayerChat,
            300 => Self::ZoneChange,
            301 => Self::ZoneData,
            other => return Err(other),
        })
    }
}

/// Append a length-prefixed string.
pub fn put_string(buf: &mut Vec<u8>, text: &str) -> Result<(), FrameError> {
    let len = u16::try_from(text.len()).map_err(|_| FrameError::PayloadTooLarge { size: text.len() })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(text.as_bytes());
    Ok(())
}

/// Read a length-prefixed string at `offset`, advancing it past the field.
///
/// On error the offset is left unchanged.
pub fn get_string(data: &[u8], offset: &mut usize) -> Result<String, FrameError> {
    let start = *offset;
    let prefix = take(data, start, 2)?;
    let len = u16::from_le_bytes([prefix[0], prefix[1]]) as usize;
    let bytes = take(data, start + 2, len)?;
    let text = String::from_utf8(bytes.to_vec())?;
    *offset = start + 2 + len;
    Ok(text)
}

/// Append a little-endian 32-bit integer.
pub fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Read a little-endian 32-bit integer at `offset`, advancing it by 4.
pub fn get_i32(data: &[u8], offset: &mut usize) -> Result<i32, FrameError> {
    let bytes = take(data, *offset, 4)?;
    let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    *offset += 4;
    Ok(value)
}

fn take(data: &[u8], start: usize, len: usize) -> Result<&[u8], FrameError> {
    let available = data.len().saturating_sub(start);
    if available < len {
        return Err(FrameError::Truncated {
            expected: len,
            received: available,
        });
    }
    Ok(&data[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout() {
        let mut buf = Vec::new();
        put_string(&mut buf, "ping").unwrap();
        assert_eq!(buf, [4, 0, b'p', b'i', b'n', b'g']);
    }

    #[test]
    fn test_empty_string() {
        let mut buf = Vec::new();
        put_string(&mut buf, "").unwrap();
        assert_eq!(buf, [0, 0]);
        let mut offset = 0;
        assert_eq!(get_string(&buf, &mut offset).unwrap(), "");
        assert_eq!(offset, 2);
    }

    #[test]
    fn test_sequential_fields() {
        let mut buf = Vec::new();
        put_string(&mut buf, "alice").unwrap();
        put_i32(&mut buf, -42);
        put_i32(&mut buf, i32::MAX);

        let mut offset = 0;
        assert_eq!(get_string(&buf, &mut offset).unwrap(), "alice");
        assert_eq!(get_i32(&buf, &mut offset).unwrap(), -42);
        assert_eq!(get_i32(&buf, &mut offset).unwrap(), i32::MAX);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_i32_twos_complement() {
        let mut buf = Vec::new();
        put_i32(&mut buf, -1);
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFF]);
        put_i32(&mut buf, 0x0102_0304);
        assert_eq!(&buf[4..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_truncated_string_is_error() {
        // Prefix says 10 bytes, 3 follow.
        let buf = [10, 0, b'a', b'b', b'c'];
        let mut offset = 0;
        let result = get_string(&buf, &mut offset);
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: 10,
                received: 3
            })
        ));
        assert_eq!(offset, 0, "offset must not move on failure");
    }

    #[test]
    fn test_truncated_i32_is_error() {
        let mut offset = 1;
        let result = get_i32(&[0, 1, 2], &mut offset);
        assert!(matches!(result, Err(FrameError::Truncated { expected: 4, received: 2 })));
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let buf = [2, 0, 0xFF, 0xFE];
        let mut offset = 0;
        assert!(matches!(
            get_string(&buf, &mut offset),
            Err(FrameError::InvalidString(_))
        ));
    }

    #[test]
    fn test_oversized_string_rejected() {
        let text = "x".repeat(u16::MAX as usize + 1);
        let mut buf = Vec::new();
        assert!(matches!(
            put_string(&mut buf, &text),
            Err(FrameError::PayloadTooLarge { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_packet_type_codes() {
        assert_eq!(u16::from(PacketType::Echo), 1);
        assert_eq!(u16::from(PacketType::LoginResponse), 103);
        assert_eq!(u16::from(PacketType::ZoneData), 301);
        assert_eq!(PacketType::try_from(202), Ok(PacketType::PlayerChat));
        assert_eq!(PacketType::try_from(999), Err(999));
    }
}
