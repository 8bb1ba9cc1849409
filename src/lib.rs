//! vidchat-rs: chat with a generative model about a video
//!
//! The crate has two halves that meet at an HTTP boundary:
//! - a stateless relay server ([`server`]) that streams model output as
//!   `data:` frames and proxies remote videos as base64
//! - a client library ([`session`], [`client`], [`protocol`]) that assembles
//!   requests, decodes the frame stream and keeps the transcript consistent

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod server;
pub mod services;
pub mod session;

// Re-exports for convenience
pub use error::{Result, VidChatError};
