//! Binary serialization of OHAP messages.
//!
//! Frames have no length prefix: a one-byte tag followed by the fields of
//! that message type. All multi-byte numbers are big-endian.
//!
//! | primitive   | layout                                   |
//! |-------------|------------------------------------------|
//! | `int8`      | 1 byte, unsigned                         |
//! | `int32`     | 4 bytes, signed                          |
//! | `decimal64` | 8 bytes, IEEE-754 double                 |
//! | `binary8`   | 1 byte, 0 = false, anything else = true  |
//! | `text`      | u16 byte length, then UTF-8 bytes        |

use bytes::{Buf, BufMut, BytesMut};

use ohap_core::prelude::*;

use crate::message::{
    BinaryDeviceInfo, ContainerInfo, DecimalDeviceInfo, MessageType, OhapMessage,
};

/// Longest text field the wire format can carry
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

// ============================================================================
// Encoding
// ============================================================================

/// Append the frame for `message` to `buf`.
///
/// On error `buf` is left as it was.
pub fn encode(message: &OhapMessage, buf: &mut BytesMut) -> Result<()> {
    let start = buf.len();
    let result = encode_fields(message, buf);
    if result.is_err() {
        buf.truncate(start);
    }
    result
}

/// Encode a single message into a fresh buffer
pub fn encode_to_bytes(message: &OhapMessage) -> Result<bytes::Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    encode(message, &mut buf)?;
    Ok(buf.freeze())
}

fn encode_fields(message: &OhapMessage, buf: &mut BytesMut) -> Result<()> {
    buf.put_u8(message.tag());
    match message {
        OhapMessage::Login {
            protocol_minor,
            username,
            password,
        } => {
            buf.put_u8(*protocol_minor);
            write_text(buf, username)?;
            write_text(buf, password)?;
        }
        OhapMessage::Logout { reason } => write_text(buf, reason)?,
        OhapMessage::Ping { id } | OhapMessage::Pong { id } => buf.put_i32(*id),
        OhapMessage::DecimalSensor(info) | OhapMessage::DecimalActuator(info) => {
            buf.put_i32(info.id);
            buf.put_f64(info.value);
            buf.put_i32(info.parent_id);
            write_text(buf, &info.name)?;
            write_text(buf, &info.description)?;
            write_binary(buf, info.internal);
            buf.put_f64(info.min);
            buf.put_f64(info.max);
            write_text(buf, &info.unit)?;
            write_text(buf, &info.unit_abbreviation)?;
        }
        OhapMessage::BinarySensor(info) | OhapMessage::BinaryActuator(info) => {
            buf.put_i32(info.id);
            write_binary(buf, info.value);
            buf.put_i32(info.parent_id);
            write_text(buf, &info.name)?;
            write_text(buf, &info.description)?;
            write_binary(buf, info.internal);
        }
        OhapMessage::Container(info) => {
            buf.put_i32(info.id);
            buf.put_i32(info.parent_id);
            write_text(buf, &info.name)?;
            write_text(buf, &info.description)?;
            write_binary(buf, info.internal);
        }
        OhapMessage::DecimalValueChanged { id, value } => {
            buf.put_i32(*id);
            buf.put_f64(*value);
        }
        OhapMessage::BinaryValueChanged { id, value } => {
            buf.put_i32(*id);
            write_binary(buf, *value);
        }
        OhapMessage::ItemRemoved { id }
        | OhapMessage::ListeningStart { id }
        | OhapMessage::ListeningStop { id } => buf.put_i32(*id),
    }
    Ok(())
}

fn write_text(buf: &mut BytesMut, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| Error::TextTooLong { len: bytes.len() })?;
    buf.put_u16(len);
    buf.put_slice(bytes);
    Ok(())
}

fn write_binary(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode the next message from the front of `buf`.
///
/// - `Ok(Some(msg))`: a complete frame was consumed.
/// - `Ok(None)`: the frame is incomplete; nothing was consumed.
/// - `Err(UnknownMessageType)`: the tag byte was consumed.
/// - `Err(Protocol)`: a text field was not UTF-8; the whole frame was consumed.
pub fn decode(buf: &mut BytesMut) -> Result<Option<OhapMessage>> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };
    let Some(message_type) = MessageType::from_byte(tag) else {
        buf.advance(1);
        return Err(Error::UnknownMessageType(tag));
    };

    let mut reader = FrameReader::new(&buf[1..]);
    let Some(message) = read_body(message_type, &mut reader) else {
        return Ok(None);
    };
    let frame_len = 1 + reader.position();
    let invalid_text = reader.invalid_text.take();

    buf.advance(frame_len);
    if let Some(reason) = invalid_text {
        return Err(Error::protocol(format!(
            "invalid UTF-8 in {} message: {reason}",
            message_type.name()
        )));
    }
    Ok(Some(message))
}

/// Decode every complete frame in `buf`, leaving any partial tail in place.
///
/// Malformed frames are reported in place of a message.
pub fn decode_all(buf: &mut BytesMut) -> Vec<Result<OhapMessage>> {
    let mut out = Vec::new();
    loop {
        match decode(buf) {
            Ok(Some(message)) => out.push(Ok(message)),
            Ok(None) => break,
            Err(e) => out.push(Err(e)),
        }
    }
    out
}

fn read_body(message_type: MessageType, r: &mut FrameReader<'_>) -> Option<OhapMessage> {
    let message = match message_type {
        MessageType::Login => OhapMessage::Login {
            protocol_minor: r.int8()?,
            username: r.text()?,
            password: r.text()?,
        },
        MessageType::Logout => OhapMessage::Logout { reason: r.text()? },
        MessageType::Ping => OhapMessage::Ping { id: r.int32()? },
        MessageType::Pong => OhapMessage::Pong { id: r.int32()? },
        MessageType::DecimalSensor => OhapMessage::DecimalSensor(read_decimal_device(r)?),
        MessageType::DecimalActuator => OhapMessage::DecimalActuator(read_decimal_device(r)?),
        MessageType::BinarySensor => OhapMessage::BinarySensor(read_binary_device(r)?),
        MessageType::BinaryActuator => OhapMessage::BinaryActuator(read_binary_device(r)?),
        MessageType::Container => OhapMessage::Container(ContainerInfo {
            id: r.int32()?,
            parent_id: r.int32()?,
            name: r.text()?,
            description: r.text()?,
            internal: r.binary8()?,
        }),
        MessageType::DecimalValueChanged => OhapMessage::DecimalValueChanged {
            id: r.int32()?,
            value: r.decimal64()?,
        },
        MessageType::BinaryValueChanged => OhapMessage::BinaryValueChanged {
            id: r.int32()?,
            value: r.binary8()?,
        },
        MessageType::ItemRemoved => OhapMessage::ItemRemoved { id: r.int32()? },
        MessageType::ListeningStart => OhapMessage::ListeningStart { id: r.int32()? },
        MessageType::ListeningStop => OhapMessage::ListeningStop { id: r.int32()? },
    };
    Some(message)
}

fn read_decimal_device(r: &mut FrameReader<'_>) -> Option<DecimalDeviceInfo> {
    Some(DecimalDeviceInfo {
        id: r.int32()?,
        value: r.decimal64()?,
        parent_id: r.int32()?,
        name: r.text()?,
        description: r.text()?,
        internal: r.binary8()?,
        min: r.decimal64()?,
        max: r.decimal64()?,
        unit: r.text()?,
        unit_abbreviation: r.text()?,
    })
}

fn read_binary_device(r: &mut FrameReader<'_>) -> Option<BinaryDeviceInfo> {
    Some(BinaryDeviceInfo {
        id: r.int32()?,
        value: r.binary8()?,
        parent_id: r.int32()?,
        name: r.text()?,
        description: r.text()?,
        internal: r.binary8()?,
    })
}

/// Cursor over one frame body. Every read returns `None` when the buffer
/// runs out, which the caller treats as "wait for more bytes".
struct FrameReader<'a> {
    buf: &'a [u8],
    start_len: usize,
    /// First UTF-8 failure; the frame is still read to its end so it can be
    /// skipped as a whole.
    invalid_text: Option<String>,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            start_len: buf.len(),
            invalid_text: None,
        }
    }

    fn position(&self) -> usize {
        self.start_len - self.buf.remaining()
    }

    fn int8(&mut self) -> Option<u8> {
        (self.buf.remaining() >= 1).then(|| self.buf.get_u8())
    }

    fn int32(&mut self) -> Option<i32> {
        (self.buf.remaining() >= 4).then(|| self.buf.get_i32())
    }

    fn decimal64(&mut self) -> Option<f64> {
        (self.buf.remaining() >= 8).then(|| self.buf.get_f64())
    }

    fn binary8(&mut self) -> Option<bool> {
        self.int8().map(|b| b != 0)
    }

    fn text(&mut self) -> Option<String> {
        if self.buf.remaining() < 2 {
            return None;
        }
        let len = usize::from(u16::from_be_bytes([self.buf[0], self.buf[1]]));
        if self.buf.remaining() < 2 + len {
            return None;
        }
        self.buf.advance(2);
        let (bytes, rest) = self.buf.split_at(len);
        self.buf = rest;
        match std::str::from_utf8(bytes) {
            Ok(text) => Some(text.to_string()),
            Err(e) => {
                if self.invalid_text.is_none() {
                    self.invalid_text = Some(e.to_string());
                }
                Some(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_messages() -> Vec<OhapMessage> {
        vec![
            OhapMessage::login("alice", "secret"),
            OhapMessage::logout("bye"),
            OhapMessage::Ping { id: i32::MIN },
            OhapMessage::Pong { id: i32::MAX },
            OhapMessage::DecimalSensor(DecimalDeviceInfo {
                id: 4,
                value: 19.2,
                parent_id: 2,
                name: "Temperature".into(),
                description: "The temperature of the Room 1".into(),
                internal: false,
                min: -50.0,
                max: 50.0,
                unit: "Celsius Degrees".into(),
                unit_abbreviation: "C".into(),
            }),
            OhapMessage::DecimalActuator(DecimalDeviceInfo {
                id: 7,
                value: f64::MAX,
                parent_id: 0,
                name: String::new(),
                description: "ääkköset °C".into(),
                internal: true,
                min: f64::MIN,
                max: f64::INFINITY,
                unit: String::new(),
                unit_abbreviation: String::new(),
            }),
            OhapMessage::BinarySensor(BinaryDeviceInfo {
                id: 5,
                value: true,
                parent_id: 1,
                name: "Switch".into(),
                description: String::new(),
                internal: false,
            }),
            OhapMessage::BinaryActuator(BinaryDeviceInfo {
                id: -1,
                value: false,
                parent_id: i32::MAX,
                name: "Lamp".into(),
                description: "x".repeat(MAX_TEXT_LEN),
                internal: true,
            }),
            OhapMessage::Container(ContainerInfo {
                id: 1,
                parent_id: 0,
                name: "Room 1".into(),
                description: "Living room".into(),
                internal: false,
            }),
            OhapMessage::DecimalValueChanged {
                id: 7,
                value: -0.0,
            },
            OhapMessage::BinaryValueChanged { id: 5, value: true },
            OhapMessage::ItemRemoved { id: 3 },
            OhapMessage::ListeningStart { id: 0 },
            OhapMessage::ListeningStop { id: 1 },
        ]
    }

    #[test]
    fn test_roundtrip_every_message_type() {
        for message in sample_messages() {
            let mut buf = BytesMut::new();
            encode(&message, &mut buf).unwrap();
            let decoded = decode(&mut buf).unwrap();
            assert_eq!(decoded, Some(message));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_binary_value_changed_layout() {
        let bytes = encode_to_bytes(&OhapMessage::BinaryValueChanged { id: 5, value: true }).unwrap();
        assert_eq!(&bytes[..], &[0x0a, 0, 0, 0, 5, 1]);
    }

    #[test]
    fn test_login_layout() {
        let bytes = encode_to_bytes(&OhapMessage::login("ab", "c")).unwrap();
        assert_eq!(&bytes[..], &[0x00, 1, 0, 2, b'a', b'b', 0, 1, b'c']);
    }

    #[test]
    fn test_nonzero_binary8_decodes_as_true() {
        let mut buf = BytesMut::from(&[0x0a, 0, 0, 0, 9, 0x7f][..]);
        assert_eq!(
            decode(&mut buf).unwrap(),
            Some(OhapMessage::BinaryValueChanged { id: 9, value: true })
        );
    }

    #[test]
    fn test_incomplete_frame_consumes_nothing() {
        let full = encode_to_bytes(&sample_messages()[4]).unwrap();
        for cut in 0..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            assert_eq!(decode(&mut buf).unwrap(), None, "cut at {cut}");
            assert_eq!(buf.len(), cut);
        }
    }

    #[test]
    fn test_frames_split_across_reads() {
        let mut wire = BytesMut::new();
        encode(&OhapMessage::Ping { id: 1 }, &mut wire).unwrap();
        encode(&OhapMessage::ListeningStart { id: 2 }, &mut wire).unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire[..7]);
        let first = decode_all(&mut buf);
        assert_eq!(first.len(), 1);
        assert_eq!(buf.len(), 2);

        buf.extend_from_slice(&wire[7..]);
        let second = decode_all(&mut buf);
        assert_eq!(second.len(), 1);
        assert!(matches!(
            second[0],
            Ok(OhapMessage::ListeningStart { id: 2 })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_tag_skips_one_byte() {
        let mut buf = BytesMut::from(&[0x42, 0x02, 0, 0, 0, 7][..]);
        assert!(matches!(
            decode(&mut buf),
            Err(Error::UnknownMessageType(0x42))
        ));
        assert_eq!(decode(&mut buf).unwrap(), Some(OhapMessage::Ping { id: 7 }));
    }

    #[test]
    fn test_invalid_utf8_consumes_frame() {
        let mut buf = BytesMut::from(&[0x01, 0, 2, 0xff, 0xfe, 0x03, 0, 0, 0, 1][..]);
        assert!(matches!(decode(&mut buf), Err(Error::Protocol { .. })));
        assert_eq!(decode(&mut buf).unwrap(), Some(OhapMessage::Pong { id: 1 }));
    }

    #[test]
    fn test_text_too_long_leaves_buffer_untouched() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        let err = encode(&OhapMessage::logout("x".repeat(MAX_TEXT_LEN + 1)), &mut buf).unwrap_err();
        assert!(matches!(err, Error::TextTooLong { len } if len == MAX_TEXT_LEN + 1));
        assert_eq!(&buf[..], b"prefix");
    }
}
