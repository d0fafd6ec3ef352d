//! Variant argument lists.
//!
//! A variant is the ordered, typed argument list carried by a call-function
//! tank packet. Each argument is tagged with an [`ArgType`] on the wire:
//!
//! ```text
//! +-------+-------+------+---------------------+-------+------+---------+
//! | count | index | tag  | payload             | index | tag  | ...     |
//! | 1 byte| 1 byte|1 byte| see ArgType         | 1 byte|1 byte|         |
//! +-------+-------+------+---------------------+-------+------+---------+
//! ```

use crate::error::ProtocolError;
use crate::tank::TankPacket;
use crate::MAX_ARGUMENTS;

/// Argument type tags understood by the game client.
///
/// These values are part of the peer protocol and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgType {
    /// Length-prefixed UTF-8 text.
    String = 2,
    /// Two 32-bit floats.
    Float2 = 3,
    /// Three 32-bit floats.
    Float3 = 4,
    /// Unsigned 32-bit integer.
    UnsignedInt = 5,
    /// Four 32-bit floats.
    ///
    /// The client's tag table has no confirmed value for this type; 6 is the
    /// unused slot between `UnsignedInt` and `SignedInt`. Check it against
    /// the client before sending 4-float vectors.
    Float4 = 6,
    /// Signed 32-bit integer.
    SignedInt = 9,
}

impl ArgType {
    /// Returns the float vector tag for a vector of `len` elements.
    pub fn float_vector(len: usize) -> Option<Self> {
        match len {
            2 => Some(ArgType::Float2),
            3 => Some(ArgType::Float3),
            4 => Some(ArgType::Float4),
            _ => None,
        }
    }

    /// Returns the element count for float vector tags.
    pub fn float_len(&self) -> Option<usize> {
        match self {
            ArgType::Float2 => Some(2),
            ArgType::Float3 => Some(3),
            ArgType::Float4 => Some(4),
            _ => None,
        }
    }
}

impl TryFrom<u8> for ArgType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(ArgType::String),
            3 => Ok(ArgType::Float2),
            4 => Ok(ArgType::Float3),
            5 => Ok(ArgType::UnsignedInt),
            6 => Ok(ArgType::Float4),
            9 => Ok(ArgType::SignedInt),
            _ => Err(ProtocolError::UnknownArgType(value)),
        }
    }
}

/// One argument of a variant.
///
/// The `From` conversions pick the integer variant by sign. Constructing a
/// variant directly keeps the caller's choice: `SignedInt(5)` is written with
/// the signed tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Text(String),
    SignedInt(i32),
    UnsignedInt(u32),
    /// Float vector. Only 2, 3 or 4 elements have a wire tag; other lengths
    /// encode as a bare index byte.
    FloatVector(Vec<f32>),
}

impl Argument {
    /// Returns the wire tag for this argument, or `None` if it has no encoding.
    pub fn arg_type(&self) -> Option<ArgType> {
        match self {
            Argument::Text(_) => Some(ArgType::String),
            Argument::SignedInt(_) => Some(ArgType::SignedInt),
            Argument::UnsignedInt(_) => Some(ArgType::UnsignedInt),
            Argument::FloatVector(v) => ArgType::float_vector(v.len()),
        }
    }

    /// Returns whether this argument encodes a type tag and payload.
    pub fn is_encodable(&self) -> bool {
        self.arg_type().is_some()
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Text(value.to_string())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::Text(value)
    }
}

impl From<&String> for Argument {
    fn from(value: &String) -> Self {
        Argument::Text(value.clone())
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        if value < 0 {
            Argument::SignedInt(value)
        } else {
            Argument::UnsignedInt(value as u32)
        }
    }
}

/// Values outside 32 bits wrap modulo 2^32, matching a 32-bit integer store.
impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        if value < 0 {
            Argument::SignedInt(value as i32)
        } else {
            Argument::UnsignedInt(value as u32)
        }
    }
}

impl From<u32> for Argument {
    fn from(value: u32) -> Self {
        Argument::UnsignedInt(value)
    }
}

impl From<Vec<f32>> for Argument {
    fn from(value: Vec<f32>) -> Self {
        Argument::FloatVector(value)
    }
}

impl From<&[f32]> for Argument {
    fn from(value: &[f32]) -> Self {
        Argument::FloatVector(value.to_vec())
    }
}

impl<const N: usize> From<[f32; N]> for Argument {
    fn from(value: [f32; N]) -> Self {
        Argument::FloatVector(value.to_vec())
    }
}

/// Envelope options for a variant packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingOptions {
    /// Routing identifier of the target object; -1 means unaddressed.
    pub net_id: i32,
    /// Info field of the envelope, the execution delay in milliseconds.
    pub delay: i32,
}

impl EncodingOptions {
    pub fn new(net_id: i32, delay: i32) -> Self {
        Self { net_id, delay }
    }
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            net_id: -1,
            delay: 0,
        }
    }
}

/// An immutable, ordered argument list with its envelope options.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    options: EncodingOptions,
    args: Vec<Argument>,
}

impl Variant {
    /// Creates a variant with explicit options.
    pub fn new<I, A>(options: EncodingOptions, args: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Argument>,
    {
        let args: Vec<Argument> = args.into_iter().map(Into::into).collect();
        if args.len() > MAX_ARGUMENTS {
            return Err(ProtocolError::TooManyArguments {
                count: args.len(),
                max: MAX_ARGUMENTS,
            });
        }
        Ok(Self { options, args })
    }

    /// Creates a variant from bare values with default options.
    pub fn from_args<I, A>(args: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Argument>,
    {
        Self::new(EncodingOptions::default(), args)
    }

    /// Returns a builder for mixed-type argument lists.
    pub fn builder() -> VariantBuilder {
        VariantBuilder::default()
    }

    pub fn options(&self) -> EncodingOptions {
        self.options
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Returns the function name (first argument) if it is text.
    pub fn function_name(&self) -> Option<&str> {
        match self.args.first() {
            Some(Argument::Text(name)) => Some(name),
            _ => None,
        }
    }

    /// Encodes this variant into a call-function tank packet.
    pub fn to_packet(&self) -> TankPacket {
        crate::codec::Encoder::encode_packet(self)
    }
}

/// Builder for [`Variant`].
#[derive(Debug, Clone, Default)]
pub struct VariantBuilder {
    options: EncodingOptions,
    args: Vec<Argument>,
}

impl VariantBuilder {
    pub fn net_id(mut self, net_id: i32) -> Self {
        self.options.net_id = net_id;
        self
    }

    pub fn delay(mut self, delay: i32) -> Self {
        self.options.delay = delay;
        self
    }

    pub fn options(mut self, options: EncodingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn arg(mut self, arg: impl Into<Argument>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Argument>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builds the variant, rejecting lists that do not fit the count byte.
    pub fn build(self) -> Result<Variant, ProtocolError> {
        Variant::new(self.options, self.args)
    }
}
