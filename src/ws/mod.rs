//! WebSocket session handling and wire protocol

pub mod handler;
pub mod protocol;
