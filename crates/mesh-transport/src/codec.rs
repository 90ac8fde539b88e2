//! Multipart framing over a byte stream.
//!
//! ```text
//! u32 frame_count | (u32 len | bytes) * frame_count
//! ```
//!
//! All integers are big-endian. Limits apply to both directions.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::SocketConfig;
use crate::TransportError;

/// One multipart message: an ordered list of opaque frames.
pub type Multipart = Vec<Bytes>;

const HEADER_LEN: usize = 4;

/// Codec for [`Multipart`] messages with size and frame-count limits.
#[derive(Debug, Clone)]
pub struct MultipartCodec {
    max_message_size: usize,
    max_frames: usize,
}

impl MultipartCodec {
    pub fn new(max_message_size: usize, max_frames: usize) -> Self {
        Self {
            max_message_size,
            max_frames,
        }
    }

    pub fn from_config(config: &SocketConfig) -> Self {
        Self::new(config.max_message_size, config.max_frames)
    }

    /// Check an outgoing message against the limits without encoding it.
    pub fn validate(&self, frames: &[Bytes]) -> Result<(), TransportError> {
        self.check_frame_count(frames.len())?;
        let size: usize = frames.iter().map(Bytes::len).sum();
        if size > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }

    fn check_frame_count(&self, count: usize) -> Result<(), TransportError> {
        if count == 0 {
            return Err(TransportError::Protocol("empty multipart message".into()));
        }
        if count > self.max_frames {
            return Err(TransportError::TooManyFrames {
                count,
                max: self.max_frames,
            });
        }
        Ok(())
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

impl Decoder for MultipartCodec {
    type Item = Multipart;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Multipart>, TransportError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let count = read_u32(src, 0) as usize;
        self.check_frame_count(count)?;

        // Walk the length headers first; nothing is consumed until the
        // whole message is buffered.
        let mut offset = HEADER_LEN;
        let mut body = 0usize;
        for _ in 0..count {
            if src.len() < offset + HEADER_LEN {
                src.reserve(offset + HEADER_LEN - src.len());
                return Ok(None);
            }
            let len = read_u32(src, offset) as usize;
            body = body.saturating_add(len);
            if body > self.max_message_size {
                return Err(TransportError::MessageTooLarge {
                    size: body,
                    max: self.max_message_size,
                });
            }
            offset += HEADER_LEN;
            if src.len() < offset + len {
                src.reserve(offset + len - src.len());
                return Ok(None);
            }
            offset += len;
        }

        let mut buf = src.split_to(offset).freeze();
        buf.advance(HEADER_LEN);
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            let len = buf.get_u32() as usize;
            frames.push(buf.split_to(len));
        }
        Ok(Some(frames))
    }
}

impl Encoder<Multipart> for MultipartCodec {
    type Error = TransportError;

    fn encode(&mut self, frames: Multipart, dst: &mut BytesMut) -> Result<(), TransportError> {
        self.validate(&frames)?;
        let body: usize = frames.iter().map(Bytes::len).sum();
        dst.reserve(HEADER_LEN * (frames.len() + 1) + body);
        dst.put_u32(frames.len() as u32);
        for frame in &frames {
            dst.put_u32(frame.len() as u32);
            dst.extend_from_slice(frame);
        }
        Ok(())
    }
}
