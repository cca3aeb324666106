//! WebSocket frame opcodes (RFC 6455), as far as the outgoing path needs
//! them.
//!
//! The flusher never decodes opcodes off the wire; it only reads them for
//! scheduling (PING priority, CLOSE latching) and hands them to the
//! generator for the header byte.

/// Opcode of an outgoing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    /// Continuation frame (0x0), following a non-final data frame.
    Continuation = 0x0,

    /// Text frame (0x1). Payload must be valid UTF-8.
    Text = 0x1,

    /// Binary frame (0x2).
    Binary = 0x2,

    /// Close frame (0x8). Submitting one closes the flusher.
    Close = 0x8,

    /// Ping frame (0x9). Jumps to the head of the submit queue.
    Ping = 0x9,

    /// Pong frame (0xA).
    Pong = 0xA,
}

impl OpCode {
    /// Raw wire value, as placed in the low nibble of the header's first
    /// byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a control frame opcode.
    ///
    /// Control frames: Close (0x8), Ping (0x9), Pong (0xA).
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_as_u8() {
        assert_eq!(OpCode::Continuation.as_u8(), 0x0);
        assert_eq!(OpCode::Text.as_u8(), 0x1);
        assert_eq!(OpCode::Binary.as_u8(), 0x2);
        assert_eq!(OpCode::Close.as_u8(), 0x8);
        assert_eq!(OpCode::Ping.as_u8(), 0x9);
        assert_eq!(OpCode::Pong.as_u8(), 0xA);
    }

    #[test]
    fn test_opcode_is_control() {
        assert!(!OpCode::Continuation.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
    }
}
