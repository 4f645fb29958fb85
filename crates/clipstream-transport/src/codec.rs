//! Broker protocol frame codec
//!
//! Every frame is length-prefixed and starts with a one-byte opcode:
//!
//! ```text
//! +------------------+--------+-----------------------------+
//! | Length (4 bytes) | Opcode | Body                        |
//! +------------------+--------+-----------------------------+
//!
//! PUB  (1)  [u16 topic len][topic][payload]   client -> broker
//! SUB  (2)  [topic]                           client -> broker
//! MSG  (3)  [u64 id][payload]                 broker -> subscriber
//! OK   (4)                                    broker -> client
//! ERR  (5)  [utf-8 message]                   broker -> client
//! FIN  (6)  [u64 id]                          subscriber -> broker
//! ```
//!
//! The length covers the opcode and the body. All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Result, TransportError};

/// Maximum frame size (16MB)
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const OP_PUB: u8 = 1;
const OP_SUB: u8 = 2;
const OP_MSG: u8 = 3;
const OP_OK: u8 = 4;
const OP_ERR: u8 = 5;
const OP_FIN: u8 = 6;

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Publish { topic: String, payload: Bytes },
    Subscribe { topic: String },
    Message { id: u64, payload: Bytes },
    Ok,
    Error(String),
    Finish { id: u64 },
}

/// Length-prefixed [`Frame`] codec, shared by the broker and its clients.
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

fn read_text(body: Bytes, what: &str) -> Result<String> {
    String::from_utf8(body.to_vec())
        .map_err(|_| TransportError::Protocol(format!("{} is not valid UTF-8", what)))
}

fn read_id(body: &mut Bytes) -> Result<u64> {
    if body.len() < 8 {
        return Err(TransportError::Protocol("Message id truncated".to_string()));
    }
    Ok(body.get_u64())
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = (&src[..4]).get_u32() as usize;

        if length == 0 {
            return Err(TransportError::Protocol("Empty frame".to_string()));
        }
        if length > self.max_frame_size {
            return Err(TransportError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                length, self.max_frame_size
            )));
        }

        let total_length = 4 + length;
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let opcode = src.get_u8();
        let mut body = src.split_to(length - 1).freeze();

        let frame = match opcode {
            OP_PUB => {
                if body.len() < 2 {
                    return Err(TransportError::Protocol("Topic length truncated".to_string()));
                }
                let topic_len = body.get_u16() as usize;
                if body.len() < topic_len {
                    return Err(TransportError::Protocol("Topic truncated".to_string()));
                }
                let topic = read_text(body.split_to(topic_len), "topic")?;
                Frame::Publish {
                    topic,
                    payload: body,
                }
            }
            OP_SUB => Frame::Subscribe {
                topic: read_text(body, "topic")?,
            },
            OP_MSG => {
                let id = read_id(&mut body)?;
                Frame::Message { id, payload: body }
            }
            OP_OK => Frame::Ok,
            OP_ERR => Frame::Error(read_text(body, "error message")?),
            OP_FIN => Frame::Finish {
                id: read_id(&mut body)?,
            },
            other => {
                return Err(TransportError::Protocol(format!("Unknown opcode {}", other)));
            }
        };

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        match item {
            Frame::Publish { topic, payload } => {
                let topic_len = u16::try_from(topic.len()).map_err(|_| {
                    TransportError::Protocol(format!("Topic name too long: {} bytes", topic.len()))
                })?;
                body.put_u8(OP_PUB);
                body.put_u16(topic_len);
                body.extend_from_slice(topic.as_bytes());
                body.extend_from_slice(&payload);
            }
            Frame::Subscribe { topic } => {
                body.put_u8(OP_SUB);
                body.extend_from_slice(topic.as_bytes());
            }
            Frame::Message { id, payload } => {
                body.put_u8(OP_MSG);
                body.put_u64(id);
                body.extend_from_slice(&payload);
            }
            Frame::Ok => body.put_u8(OP_OK),
            Frame::Error(message) => {
                body.put_u8(OP_ERR);
                body.extend_from_slice(message.as_bytes());
            }
            Frame::Finish { id } => {
                body.put_u8(OP_FIN);
                body.put_u64(id);
            }
        }

        if body.len() > self.max_frame_size {
            return Err(TransportError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                body.len(),
                self.max_frame_size
            )));
        }

        dst.reserve(4 + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_publish_frame_layout() {
        let buf = encode(Frame::Publish {
            topic: "events".to_string(),
            payload: Bytes::from_static(b"SESS_START"),
        });
        // length + opcode + topic length + topic + payload
        assert_eq!(buf.len(), 4 + 1 + 2 + 6 + 10);
        assert_eq!(&buf[..4], &[0, 0, 0, 19]);
        assert_eq!(buf[4], OP_PUB);
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let full = encode(Frame::Message {
            id: 7,
            payload: Bytes::from_static(b"t WATCH 1 2|"),
        });

        let mut codec = FrameCodec::new();
        let mut partial = BytesMut::from(&full[..full.len() - 3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[full.len() - 3..]);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Message {
                id: 7,
                payload: Bytes::from_static(b"t WATCH 1 2|"),
            }
        );
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut buf = encode(Frame::Ok);
        buf.extend_from_slice(&encode(Frame::Finish { id: 42 }));
        buf.extend_from_slice(&encode(Frame::Error("nope".to_string())));

        let mut codec = FrameCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Ok));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Finish { id: 42 }));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Error("nope".to_string()))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_unknown_opcode_is_protocol_error() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 1, 99][..]);
        assert!(matches!(
            FrameCodec::new().decode(&mut buf),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_publish_is_protocol_error() {
        // Topic length claims 10 bytes but only 2 follow.
        let mut buf = BytesMut::from(&[0u8, 0, 0, 5, OP_PUB, 0, 10, b'a', b'b'][..]);
        assert!(matches!(
            FrameCodec::new().decode(&mut buf),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn test_frame_size_limit() {
        let mut codec = FrameCodec::with_max_frame_size(8);
        let mut buf = BytesMut::new();
        let result = codec.encode(
            Frame::Message {
                id: 1,
                payload: Bytes::from_static(b"too large"),
            },
            &mut buf,
        );
        assert!(matches!(result, Err(TransportError::Protocol(_))));

        let mut oversized = BytesMut::from(&[0u8, 0, 1, 0][..]);
        assert!(codec.decode(&mut oversized).is_err());
    }
}
