//! Encoder and decoder for variant argument lists.

use crate::error::ProtocolError;
use crate::tank::{TankPacket, TankPacketType};
use crate::variant::{ArgType, Argument, Variant};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encodes variants into argument-list bytes and call-function packets.
pub struct Encoder;

impl Encoder {
    /// Encodes the argument list of a variant.
    ///
    /// A float vector without a wire tag still consumes its index byte but
    /// writes no tag or payload. Peers reading such a list lose alignment
    /// at that position.
    pub fn encode_variant(variant: &Variant) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::encoded_len(variant));

        // Count (1 byte); construction guarantees it fits.
        buf.put_u8(variant.len() as u8);

        let mut index: u8 = 0;
        for arg in variant.args() {
            buf.put_u8(index);
            index = index.wrapping_add(1);

            match arg {
                Argument::Text(text) => {
                    buf.put_u8(ArgType::String as u8);
                    buf.put_u32_le(text.len() as u32);
                    buf.put_slice(text.as_bytes());
                }
                Argument::SignedInt(value) => {
                    buf.put_u8(ArgType::SignedInt as u8);
                    buf.put_i32_le(*value);
                }
                Argument::UnsignedInt(value) => {
                    buf.put_u8(ArgType::UnsignedInt as u8);
                    buf.put_u32_le(*value);
                }
                Argument::FloatVector(values) => match ArgType::float_vector(values.len()) {
                    Some(tag) => {
                        buf.put_u8(tag as u8);
                        for value in values {
                            buf.put_f32_le(*value);
                        }
                    }
                    None => {
                        tracing::warn!(
                            index = index.wrapping_sub(1),
                            len = values.len(),
                            "float vector has no wire tag, argument left without payload"
                        );
                    }
                },
            }
        }

        buf.freeze()
    }

    /// Encodes a variant into a call-function tank packet.
    ///
    /// The packet's extended data is produced lazily from the encoded bytes.
    pub fn encode_packet(variant: &Variant) -> TankPacket {
        let options = variant.options();
        let data = Self::encode_variant(variant);

        TankPacket::new(TankPacketType::CallFunction)
            .with_net_id(options.net_id)
            .with_info(options.delay)
            .with_data(move || data.clone())
    }

    /// Returns the exact number of bytes `encode_variant` produces.
    pub fn encoded_len(variant: &Variant) -> usize {
        1 + variant
            .args()
            .iter()
            .map(|arg| {
                1 + match arg {
                    Argument::Text(text) => 1 + 4 + text.len(),
                    Argument::SignedInt(_) | Argument::UnsignedInt(_) => 1 + 4,
                    Argument::FloatVector(values) => match ArgType::float_vector(values.len()) {
                        Some(_) => 1 + 4 * values.len(),
                        None => 0,
                    },
                }
            })
            .sum::<usize>()
    }
}

/// One decoded argument together with the index byte that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedArgument {
    pub index: u8,
    pub value: Argument,
}

/// A decoded argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVariant {
    pub count: u8,
    pub args: Vec<DecodedArgument>,
}

impl DecodedVariant {
    /// Returns the argument values in wire order.
    pub fn values(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter().map(|arg| &arg.value)
    }

    /// Returns the function name (first argument) if it is text.
    pub fn function_name(&self) -> Option<&str> {
        match self.args.first().map(|arg| &arg.value) {
            Some(Argument::Text(name)) => Some(name),
            _ => None,
        }
    }
}

/// Decodes argument-list bytes.
pub struct Decoder;

impl Decoder {
    /// Decodes a complete argument list.
    ///
    /// The whole input must be consumed; leftover bytes are an error.
    pub fn decode_variant(data: &[u8]) -> Result<DecodedVariant, ProtocolError> {
        let mut buf = data;

        ensure(&buf, 1)?;
        let count = buf.get_u8();

        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ensure(&buf, 2)?;
            let index = buf.get_u8();
            let tag = ArgType::try_from(buf.get_u8())?;

            let value = match tag {
                ArgType::String => {
                    ensure(&buf, 4)?;
                    let len = buf.get_u32_le() as usize;
                    ensure(&buf, len)?;
                    let text = std::str::from_utf8(&buf[..len])
                        .map_err(|_| ProtocolError::InvalidUtf8)?
                        .to_string();
                    buf.advance(len);
                    Argument::Text(text)
                }
                ArgType::SignedInt => {
                    ensure(&buf, 4)?;
                    Argument::SignedInt(buf.get_i32_le())
                }
                ArgType::UnsignedInt => {
                    ensure(&buf, 4)?;
                    Argument::UnsignedInt(buf.get_u32_le())
                }
                ArgType::Float2 | ArgType::Float3 | ArgType::Float4 => {
                    let len = tag.float_len().unwrap_or_default();
                    ensure(&buf, 4 * len)?;
                    Argument::FloatVector((0..len).map(|_| buf.get_f32_le()).collect())
                }
            };

            args.push(DecodedArgument { index, value });
        }

        if !buf.is_empty() {
            return Err(ProtocolError::TrailingBytes(buf.len()));
        }

        Ok(DecodedVariant { count, args })
    }
}

fn ensure(buf: &[u8], len: usize) -> Result<(), ProtocolError> {
    if buf.len() < len {
        return Err(ProtocolError::Truncated {
            needed: len - buf.len(),
        });
    }
    Ok(())
}
