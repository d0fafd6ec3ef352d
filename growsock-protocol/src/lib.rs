//! # growsock-protocol
//!
//! Wire protocol implementation for growsock.
//!
//! This crate provides:
//! - Variant argument lists (typed call-function arguments)
//! - Binary encoding and decoding of argument lists
//! - Tank packet envelopes with lazily produced extended data
//! - Game message framing and protocol constants

pub mod codec;
pub mod error;
pub mod message;
pub mod tank;
pub mod variant;

pub use codec::{DecodedArgument, DecodedVariant, Decoder, Encoder};
pub use error::ProtocolError;
pub use message::{GameMessage, GameMessageType};
pub use tank::{TankPacket, TankPacketType, TANK_HEADER_SIZE};
pub use variant::{ArgType, Argument, EncodingOptions, Variant, VariantBuilder};

/// Default port for the game server.
pub const DEFAULT_PORT: u16 = 17091;

/// Maximum number of arguments in one variant (single-byte count field).
pub const MAX_ARGUMENTS: usize = u8::MAX as usize;

/// Maximum extended data size carried by one tank packet (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;
