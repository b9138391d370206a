//! Protocol messages and the wire codec.

pub mod codec;
pub mod message;

pub use codec::{Codec, LanCodec};
pub use message::{Message, MessageKind, Payload, SERVICE_UDP};
