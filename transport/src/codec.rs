use bytes::{Buf, BufMut, BytesMut};
use dht_logic::Message;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::SessionError;

/// One [`Message`] per frame: a 4-byte big-endian length prefix followed by
/// its JSON encoding. TCP gives no "one write = one read" guarantee, so the
/// wire format needs an explicit frame boundary around the JSON payload.
#[derive(Debug, Default)]
pub struct MessageCodec {
    max_frame_len: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self { max_frame_len: 16 * 1024 * 1024 }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = SessionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes(src[..4].try_into().unwrap()) as usize;
        if len > self.max_frame_len {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "frame exceeds max length",
            )));
        }

        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let frame = src.split_to(len);
        let message: Message = serde_json::from_slice(&frame)?;
        Ok(Some(message))
    }
}

impl<'a> Encoder<&'a Message> for MessageCodec {
    type Error = SessionError;

    fn encode(&mut self, item: &'a Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(item)?;
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dht_logic::Command;
    use serde_json::json;

    #[test]
    fn roundtrip_single_frame() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        let msg = Message::request(1, Command::Identify, json!({"key": "ab"}));
        codec.encode(&msg, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.id, 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_returns_none() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        let msg = Message::response(2, json!(null));
        codec.encode(&msg, &mut buf).unwrap();

        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn two_frames_in_one_buffer() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&Message::response(1, json!(1)), &mut buf).unwrap();
        codec.encode(&Message::response(2, json!(2)), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }
}
