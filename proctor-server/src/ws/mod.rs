//! WebSocket module

mod connection;
pub mod protocol;

pub use connection::ws_handler;
pub use protocol::{ClientMessage, ServerMessage, decode_frame};
