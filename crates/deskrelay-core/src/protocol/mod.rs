//! Protocol module containing the event catalogue and the JSON frame codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_inbound, encode_outbound, ProtocolError};
pub use messages::*;
