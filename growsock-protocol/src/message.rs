//! Game message framing.
//!
//! Every datagram starts with a 4-byte little-endian message type. Text
//! messages carry NUL-terminated text, tank packets a tank header.

use crate::error::ProtocolError;
use crate::tank::TankPacket;
use bytes::{BufMut, BytesMut};

/// Top-level game message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GameMessageType {
    ServerHello = 1,
    GenericText = 2,
    GameMessage = 3,
    TankPacket = 4,
}

impl TryFrom<u32> for GameMessageType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(GameMessageType::ServerHello),
            2 => Ok(GameMessageType::GenericText),
            3 => Ok(GameMessageType::GameMessage),
            4 => Ok(GameMessageType::TankPacket),
            _ => Err(ProtocolError::UnknownMessageType(value)),
        }
    }
}

/// A decoded game message.
#[derive(Debug, Clone)]
pub enum GameMessage {
    Hello,
    Text(String),
    Game(String),
    Tank(TankPacket),
}

impl GameMessage {
    /// The hello message sent to a peer right after it connects.
    pub fn hello() -> Self {
        GameMessage::Hello
    }

    pub fn message_type(&self) -> GameMessageType {
        match self {
            GameMessage::Hello => GameMessageType::ServerHello,
            GameMessage::Text(_) => GameMessageType::GenericText,
            GameMessage::Game(_) => GameMessageType::GameMessage,
            GameMessage::Tank(_) => GameMessageType::TankPacket,
        }
    }

    /// Encodes the message into a datagram.
    pub fn encode(&self) -> BytesMut {
        match self {
            GameMessage::Hello => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32_le(GameMessageType::ServerHello as u32);
                buf
            }
            GameMessage::Text(text) | GameMessage::Game(text) => {
                let mut buf = BytesMut::with_capacity(4 + text.len() + 1);
                buf.put_u32_le(self.message_type() as u32);
                buf.put_slice(text.as_bytes());
                buf.put_u8(0);
                buf
            }
            GameMessage::Tank(packet) => packet.encode(),
        }
    }

    /// Decodes a datagram.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 4 {
            return Err(ProtocolError::Truncated {
                needed: 4 - data.len(),
            });
        }

        let msg_type = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let body = &data[4..];

        match GameMessageType::try_from(msg_type)? {
            GameMessageType::ServerHello => Ok(GameMessage::Hello),
            GameMessageType::GenericText => Ok(GameMessage::Text(decode_text(body)?)),
            GameMessageType::GameMessage => Ok(GameMessage::Game(decode_text(body)?)),
            GameMessageType::TankPacket => Ok(GameMessage::Tank(TankPacket::decode_body(body)?)),
        }
    }
}

fn decode_text(body: &[u8]) -> Result<String, ProtocolError> {
    let end = body
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    std::str::from_utf8(&body[..end])
        .map(str::to_string)
        .map_err(|_| ProtocolError::InvalidUtf8)
}
