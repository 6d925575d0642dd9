//! # Minefield Protocol
//!
//! The wire protocol shared by every tier of the minefield service, plus
//! the connection controller that drives it over TCP.
//!
//! This crate provides:
//! - [`frame`]: the 6-byte header, flags and the closed [`MessageType`]
//!   catalog
//! - [`codec`]: gameplay-plane messages (moves, boards, cell updates,
//!   game lifecycle)
//! - [`service`]: matchmaker↔launcher messages with correlation ids
//! - [`auth`]: registration, login and token handover messages
//! - [`controller`]: framed async I/O with bounded send queues, handler
//!   dispatch and automatic reconnection
//!
//! ## Example
//!
//! ```
//! use minefield_protocol::codec::{decode_text, encode_text};
//!
//! let frame = encode_text("hello, minefield");
//! assert_eq!(decode_text(&frame).unwrap(), "hello, minefield");
//! ```

pub mod auth;
pub mod codec;
pub mod controller;
pub mod error;
pub mod frame;
pub mod service;

pub use controller::{ConnectionController, Handler, SEND_QUEUE_CAPACITY};
pub use error::{CodecError, CodecResult, ControllerError, ProtocolError, ProtocolResult, SendError};
pub use frame::{encode_frame, Frame, FrameFlags, MessageType, HEADER_LEN, MAX_FRAME_PAYLOAD};
pub use service::{GameServerConnectInfo, GameServerInfo};
