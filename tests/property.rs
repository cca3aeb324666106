//! Property-based tests for header generation.
//!
//! These fuzz the generator across payload-length classes, flag bits, and
//! mask keys, checking every rendered header against an independent
//! decoder.

use proptest::prelude::*;

use std::sync::Arc;
use wsflush::{BufferPool, Frame, Generator, OpCode, MAX_HEADER_LENGTH};

#[derive(Debug, PartialEq)]
struct DecodedHeader {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: u8,
    mask: Option<[u8; 4]>,
    payload_len: u64,
    header_len: usize,
}

/// Independent RFC 6455 header decoder, used only to check the generator.
fn decode_header(buf: &[u8]) -> DecodedHeader {
    assert!(buf.len() >= 2, "header shorter than the fixed two bytes");
    let byte0 = buf[0];
    let byte1 = buf[1];

    let masked = (byte1 & 0x80) != 0;
    let (payload_len, len_size) = match byte1 & 0x7F {
        len @ 0..=125 => (u64::from(len), 0),
        126 => (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 2),
        _ => (
            u64::from_be_bytes([
                buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
            ]),
            8,
        ),
    };

    let mask_offset = 2 + len_size;
    let mask = if masked {
        Some([
            buf[mask_offset],
            buf[mask_offset + 1],
            buf[mask_offset + 2],
            buf[mask_offset + 3],
        ])
    } else {
        None
    };

    DecodedHeader {
        fin: (byte0 & 0x80) != 0,
        rsv1: (byte0 & 0x40) != 0,
        rsv2: (byte0 & 0x20) != 0,
        rsv3: (byte0 & 0x10) != 0,
        opcode: byte0 & 0x0F,
        mask,
        payload_len,
        header_len: mask_offset + if masked { 4 } else { 0 },
    }
}

fn opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Continuation),
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Close),
        Just(OpCode::Ping),
        Just(OpCode::Pong),
    ]
}

proptest! {
    #[test]
    fn header_roundtrips_through_decoder(
        payload_len in 0usize..70_000,
        opcode in opcode_strategy(),
        fin in any::<bool>(),
        rsv1 in any::<bool>(),
        rsv2 in any::<bool>(),
        rsv3 in any::<bool>(),
        mask in proptest::option::of(any::<[u8; 4]>()),
    ) {
        let mut frame = Frame::new(fin, opcode, vec![0u8; payload_len]);
        frame.rsv1 = rsv1;
        frame.rsv2 = rsv2;
        frame.rsv3 = rsv3;
        frame.mask = mask;

        let generator = Generator::new(Arc::new(BufferPool::new()));
        let header = generator.generate_header(&frame).unwrap();

        prop_assert!(header.len() <= MAX_HEADER_LENGTH);
        prop_assert_eq!(header.len(), Generator::header_len(&frame));

        let decoded = decode_header(&header);
        prop_assert_eq!(decoded, DecodedHeader {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode: opcode.as_u8(),
            mask,
            payload_len: payload_len as u64,
            header_len: header.len(),
        });
    }

    #[test]
    fn length_class_is_minimal(payload_len in 0usize..70_000) {
        let frame = Frame::binary(vec![0u8; payload_len]);
        let generator = Generator::new(Arc::new(BufferPool::new()));
        let header = generator.generate_header(&frame).unwrap();

        let expected = if payload_len <= 125 {
            2
        } else if payload_len <= 65_535 {
            4
        } else {
            10
        };
        prop_assert_eq!(header.len(), expected);
    }

    #[test]
    fn wire_size_is_header_plus_payload(
        payload_len in 0usize..70_000,
        mask in proptest::option::of(any::<[u8; 4]>()),
    ) {
        let mut frame = Frame::binary(vec![0u8; payload_len]);
        frame.mask = mask;
        prop_assert_eq!(
            frame.wire_size(),
            Generator::header_len(&frame) + payload_len
        );
    }
}
