//! Tank packet envelope.
//!
//! A tank packet is a game message of type 4 carrying a fixed 56-byte header
//! and optional extended data:
//!
//! ```text
//! +----------+------+-------------+--------+--------+---------------+-------+
//! | msg type | kind | object_type | count1 | count2 | net_id        | ...   |
//! | 4 bytes  | u8   | u8          | u8     | u8     | i32           |       |
//! +----------+------+-------------+--------+--------+---------------+-------+
//! | target_net_id | state | reserved | info | pos x/y | speed x/y |         |
//! | i32           | u32   | 4 bytes  | i32  | 2 x f32 | 2 x f32   |         |
//! +---------------+-------+----------+------+---------+-----------+---------+
//! | reserved | punch x/y | data_len | extended data                        |
//! | 4 bytes  | 2 x i32   | u32      | data_len bytes                       |
//! +----------+-----------+----------+--------------------------------------+
//! ```
//!
//! All multi-byte fields are little-endian.

use crate::error::ProtocolError;
use crate::message::GameMessageType;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

/// Size of the tank header in bytes, excluding the 4-byte message type.
pub const TANK_HEADER_SIZE: usize = 56;

/// State flag marking that extended data follows the header.
pub const STATE_EXTENDED_DATA: u32 = 0x8;

/// Tank packet kinds used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TankPacketType {
    State = 0,
    CallFunction = 1,
    UpdateStatus = 2,
    TileChangeRequest = 3,
    SendMapData = 4,
    SendTileUpdateData = 5,
    SendTileUpdateDataMultiple = 6,
    TileActivateRequest = 7,
    TileApplyDamage = 8,
    SendInventoryState = 9,
    ItemActivateRequest = 10,
    ItemActivateObjectRequest = 11,
    SendItemDatabaseData = 16,
    SetCharacterState = 20,
    PingReply = 21,
    PingRequest = 22,
    AppIntegrityFail = 24,
    Disconnect = 26,
}

/// Lazily invoked producer of a packet's extended data.
pub type DataProducer = Arc<dyn Fn() -> Bytes + Send + Sync>;

/// A tank packet.
#[derive(Clone)]
pub struct TankPacket {
    pub kind: u8,
    pub object_type: u8,
    pub count1: u8,
    pub count2: u8,
    /// Routing identifier; -1 means unaddressed.
    pub net_id: i32,
    pub target_net_id: i32,
    pub state: u32,
    /// Info field (delay for call-function packets).
    pub info: i32,
    pub pos: (f32, f32),
    pub speed: (f32, f32),
    pub punch: (i32, i32),
    data: Option<DataProducer>,
}

impl fmt::Debug for TankPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TankPacket")
            .field("kind", &self.kind)
            .field("net_id", &self.net_id)
            .field("target_net_id", &self.target_net_id)
            .field("state", &self.state)
            .field("info", &self.info)
            .field("pos", &self.pos)
            .field("speed", &self.speed)
            .field("punch", &self.punch)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

impl TankPacket {
    /// Creates an empty tank packet of the given kind.
    pub fn new(kind: TankPacketType) -> Self {
        Self::with_kind(kind as u8)
    }

    /// Creates an empty tank packet from a raw kind byte.
    pub fn with_kind(kind: u8) -> Self {
        Self {
            kind,
            object_type: 0,
            count1: 0,
            count2: 0,
            net_id: 0,
            target_net_id: 0,
            state: STATE_EXTENDED_DATA,
            info: 0,
            pos: (0.0, 0.0),
            speed: (0.0, 0.0),
            punch: (0, 0),
            data: None,
        }
    }

    pub fn with_net_id(mut self, net_id: i32) -> Self {
        self.net_id = net_id;
        self
    }

    pub fn with_target_net_id(mut self, target_net_id: i32) -> Self {
        self.target_net_id = target_net_id;
        self
    }

    pub fn with_info(mut self, info: i32) -> Self {
        self.info = info;
        self
    }

    pub fn with_pos(mut self, x: f32, y: f32) -> Self {
        self.pos = (x, y);
        self
    }

    pub fn with_speed(mut self, x: f32, y: f32) -> Self {
        self.speed = (x, y);
        self
    }

    pub fn with_punch(mut self, x: i32, y: i32) -> Self {
        self.punch = (x, y);
        self
    }

    /// Sets a producer for the extended data, invoked on every encode.
    pub fn with_data<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Bytes + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(producer));
        self
    }

    /// Sets already materialized extended data.
    pub fn with_bytes(self, data: Bytes) -> Self {
        self.with_data(move || data.clone())
    }

    /// Returns whether the packet carries extended data.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Produces the extended data (empty if none is set).
    pub fn data(&self) -> Bytes {
        match &self.data {
            Some(producer) => producer(),
            None => Bytes::new(),
        }
    }

    /// Encodes the packet as a complete game message.
    pub fn encode(&self) -> BytesMut {
        let data = self.data();
        let mut buf = BytesMut::with_capacity(4 + TANK_HEADER_SIZE + data.len());

        // Game message type (4 bytes)
        buf.put_u32_le(GameMessageType::TankPacket as u32);

        buf.put_u8(self.kind);
        buf.put_u8(self.object_type);
        buf.put_u8(self.count1);
        buf.put_u8(self.count2);
        buf.put_i32_le(self.net_id);
        buf.put_i32_le(self.target_net_id);
        buf.put_u32_le(self.state);
        buf.put_u32_le(0);
        buf.put_i32_le(self.info);
        buf.put_f32_le(self.pos.0);
        buf.put_f32_le(self.pos.1);
        buf.put_f32_le(self.speed.0);
        buf.put_f32_le(self.speed.1);
        buf.put_u32_le(0);
        buf.put_i32_le(self.punch.0);
        buf.put_i32_le(self.punch.1);
        buf.put_u32_le(data.len() as u32);

        buf.put_slice(&data);
        buf
    }

    /// Decodes a complete game message holding a tank packet.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 4 {
            return Err(ProtocolError::Truncated {
                needed: 4 - data.len(),
            });
        }

        let mut buf = data;
        let msg_type = buf.get_u32_le();
        if msg_type != GameMessageType::TankPacket as u32 {
            return Err(ProtocolError::UnexpectedMessageType {
                expected: GameMessageType::TankPacket as u32,
                actual: msg_type,
            });
        }

        Self::decode_body(buf)
    }

    /// Decodes a tank header and extended data without the message type prefix.
    pub fn decode_body(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < TANK_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: TANK_HEADER_SIZE - buf.len(),
            });
        }

        let kind = buf.get_u8();
        let object_type = buf.get_u8();
        let count1 = buf.get_u8();
        let count2 = buf.get_u8();
        let net_id = buf.get_i32_le();
        let target_net_id = buf.get_i32_le();
        let state = buf.get_u32_le();
        buf.advance(4);
        let info = buf.get_i32_le();
        let pos = (buf.get_f32_le(), buf.get_f32_le());
        let speed = (buf.get_f32_le(), buf.get_f32_le());
        buf.advance(4);
        let punch = (buf.get_i32_le(), buf.get_i32_le());
        let data_len = buf.get_u32_le();

        if data_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: data_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let data_len = data_len as usize;
        if buf.len() < data_len {
            return Err(ProtocolError::Truncated {
                needed: data_len - buf.len(),
            });
        }

        let mut packet = Self {
            kind,
            object_type,
            count1,
            count2,
            net_id,
            target_net_id,
            state,
            info,
            pos,
            speed,
            punch,
            data: None,
        };
        if data_len > 0 {
            packet = packet.with_bytes(Bytes::copy_from_slice(&buf[..data_len]));
        }

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_header_layout() {
        let packet = TankPacket::new(TankPacketType::CallFunction)
            .with_net_id(-1)
            .with_info(250)
            .with_bytes(Bytes::from_static(b"\x00"));
        let encoded = packet.encode();

        assert_eq!(encoded.len(), 4 + TANK_HEADER_SIZE + 1);
        assert_eq!(&encoded[0..4], &4u32.to_le_bytes());
        assert_eq!(encoded[4], 1);
        assert_eq!(&encoded[8..12], &(-1i32).to_le_bytes());
        assert_eq!(&encoded[16..20], &STATE_EXTENDED_DATA.to_le_bytes());
        assert_eq!(&encoded[24..28], &250i32.to_le_bytes());
        assert_eq!(&encoded[56..60], &1u32.to_le_bytes());
        assert_eq!(encoded[60], 0);
    }

    #[test]
    fn test_roundtrip() {
        let packet = TankPacket::new(TankPacketType::State)
            .with_net_id(3)
            .with_target_net_id(9)
            .with_pos(32.0, 64.5)
            .with_speed(1.0, -1.0)
            .with_punch(10, 20)
            .with_bytes(Bytes::from_static(b"payload"));

        let decoded = TankPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.kind, TankPacketType::State as u8);
        assert_eq!(decoded.net_id, 3);
        assert_eq!(decoded.target_net_id, 9);
        assert_eq!(decoded.pos, (32.0, 64.5));
        assert_eq!(decoded.speed, (1.0, -1.0));
        assert_eq!(decoded.punch, (10, 20));
        assert_eq!(decoded.data(), Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_without_data() {
        let packet = TankPacket::new(TankPacketType::PingRequest);
        assert!(!packet.has_data());

        let encoded = packet.encode();
        assert_eq!(encoded.len(), 4 + TANK_HEADER_SIZE);

        let decoded = TankPacket::decode(&encoded).unwrap();
        assert!(!decoded.has_data());
        assert!(decoded.data().is_empty());
    }

    #[test]
    fn test_data_is_produced_on_encode() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let packet = TankPacket::new(TankPacketType::CallFunction).with_data(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Bytes::from_static(b"\x00")
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        packet.encode();
        packet.encode();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wrong_message_type() {
        let mut encoded = TankPacket::new(TankPacketType::State).encode();
        encoded[0] = 2;

        let result = TankPacket::decode(&encoded);
        assert_eq!(
            result.unwrap_err(),
            ProtocolError::UnexpectedMessageType {
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_truncated_header() {
        let encoded = TankPacket::new(TankPacketType::State).encode();
        let result = TankPacket::decode(&encoded[..20]);
        assert_eq!(
            result.unwrap_err(),
            ProtocolError::Truncated {
                needed: TANK_HEADER_SIZE - 16
            }
        );
    }

    #[test]
    fn test_truncated_data() {
        let encoded = TankPacket::new(TankPacketType::CallFunction)
            .with_bytes(Bytes::from_static(b"abcdef"))
            .encode();
        let result = TankPacket::decode(&encoded[..encoded.len() - 2]);
        assert_eq!(result.unwrap_err(), ProtocolError::Truncated { needed: 2 });
    }

    #[test]
    fn test_data_too_large() {
        let mut encoded = TankPacket::new(TankPacketType::CallFunction).encode();
        encoded[56..60].copy_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_le_bytes());

        let result = TankPacket::decode(&encoded);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_debug_hides_producer() {
        let packet = TankPacket::new(TankPacketType::CallFunction).with_bytes(Bytes::new());
        let debug = format!("{:?}", packet);
        assert!(debug.contains("has_data: true"));
    }
}
