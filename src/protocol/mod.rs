//! WebSocket frame model for the outgoing path.

mod frame;
mod opcode;

pub use frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
pub use opcode::OpCode;
