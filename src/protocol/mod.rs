//! Wire protocol between the relay server and chat clients
//!
//! Each [`StreamEvent`](crate::messages::StreamEvent) travels as one
//! `data: <json>\n\n` frame over a long-lived HTTP response.

pub mod frame;

pub use frame::{encode, encode_bytes, FrameDecoder, DATA_PREFIX, FRAME_DELIMITER};
