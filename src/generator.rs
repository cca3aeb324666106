//! Frame header generation.
//!
//! The generator is pure with respect to the frame: header bytes are fully
//! determined by the frame's fields. Payload bytes are never touched here;
//! masked payloads must be pre-masked by the caller.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::buffer::BufferPool;
use crate::error::Result;
use crate::protocol::Frame;

/// Upper bound for a single frame header: 2 fixed bytes, 8 bytes of
/// extended payload length, 4 bytes of mask key.
pub const MAX_HEADER_LENGTH: usize = 2 + 8 + 4;

/// Renders frame headers into caller-supplied or pool-acquired buffers.
#[derive(Debug, Clone)]
pub struct Generator {
    pool: Arc<BufferPool>,
}

impl Generator {
    /// Create a generator backed by the given buffer pool.
    #[must_use]
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { pool }
    }

    /// The shared buffer pool backing this generator.
    #[must_use]
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Exact header length for `frame`.
    #[must_use]
    pub fn header_len(frame: &Frame) -> usize {
        let payload_len = frame.payload().len();
        let extended = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask = if frame.mask.is_some() { 4 } else { 0 };
        2 + extended + mask
    }

    /// Render the frame's header into a freshly acquired pool buffer.
    ///
    /// The returned buffer is owned by the caller and should go back to the
    /// pool once the bytes have been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`](crate::Error::PoolExhausted) if the
    /// pool refuses the acquisition.
    pub fn generate_header(&self, frame: &Frame) -> Result<BytesMut> {
        let mut buf = self.pool.acquire(MAX_HEADER_LENGTH)?;
        self.generate_header_into(frame, &mut buf);
        Ok(buf)
    }

    /// Append the frame's header to `dst`.
    pub fn generate_header_into(&self, frame: &Frame, dst: &mut BytesMut) {
        let mut byte0 = frame.opcode.as_u8();
        if frame.fin {
            byte0 |= 0x80;
        }
        if frame.rsv1 {
            byte0 |= 0x40;
        }
        if frame.rsv2 {
            byte0 |= 0x20;
        }
        if frame.rsv3 {
            byte0 |= 0x10;
        }
        dst.put_u8(byte0);

        let payload_len = frame.payload().len();
        let mask_bit = if frame.mask.is_some() { 0x80 } else { 0x00 };
        if payload_len <= 125 {
            dst.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= 65535 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(payload_len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(payload_len as u64);
        }

        if let Some(key) = frame.mask {
            dst.put_slice(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;
    use bytes::Bytes;

    fn generator() -> Generator {
        Generator::new(Arc::new(BufferPool::new()))
    }

    #[test]
    fn test_header_small_text_frame() {
        let frame = Frame::text("Hello");
        let header = generator().generate_header(&frame).unwrap();
        assert_eq!(&header[..], &[0x81, 0x05]);
    }

    #[test]
    fn test_header_empty_payload() {
        let frame = Frame::binary(Bytes::new());
        let header = generator().generate_header(&frame).unwrap();
        assert_eq!(&header[..], &[0x82, 0x00]);
    }

    #[test]
    fn test_header_extended_length_126() {
        let frame = Frame::binary(vec![0xab; 256]);
        let header = generator().generate_header(&frame).unwrap();
        assert_eq!(&header[..], &[0x82, 0x7e, 0x01, 0x00]);
    }

    #[test]
    fn test_header_extended_length_127() {
        let frame = Frame::binary(vec![0xcd; 65536]);
        let header = generator().generate_header(&frame).unwrap();
        assert_eq!(header[0], 0x82);
        assert_eq!(header[1], 0x7f);
        assert_eq!(&header[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn test_header_mask_key_emitted() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let frame = Frame::text("Hello").with_mask(mask);
        let header = generator().generate_header(&frame).unwrap();
        assert_eq!(header[0], 0x81);
        assert_eq!(header[1], 0x85); // mask bit + len 5
        assert_eq!(&header[2..6], &mask);
    }

    #[test]
    fn test_header_flags() {
        let mut frame = Frame::new(false, OpCode::Continuation, Bytes::from_static(b"x"));
        frame.rsv1 = true;
        let header = generator().generate_header(&frame).unwrap();
        // No FIN, RSV1, continuation opcode.
        assert_eq!(header[0], 0x40);
    }

    #[test]
    fn test_header_len_matches_rendered() {
        for payload_len in [0usize, 1, 125, 126, 65535, 65536] {
            for mask in [None, Some([1u8, 2, 3, 4])] {
                let mut frame = Frame::binary(vec![0u8; payload_len]);
                frame.mask = mask;
                let header = generator().generate_header(&frame).unwrap();
                assert_eq!(header.len(), Generator::header_len(&frame));
                assert!(header.len() <= MAX_HEADER_LENGTH);
            }
        }
    }

    #[test]
    fn test_generate_into_appends() {
        let gen = generator();
        let mut dst = BytesMut::new();
        gen.generate_header_into(&Frame::ping(Bytes::from_static(b"hi")), &mut dst);
        gen.generate_header_into(&Frame::pong(Bytes::from_static(b"hi")), &mut dst);
        assert_eq!(&dst[..], &[0x89, 0x02, 0x8a, 0x02]);
    }
}
