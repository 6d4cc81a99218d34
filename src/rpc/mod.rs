//! JSON-RPC 2.0 envelope codec: the other external collaborator `Node`
//! depends on, kept as a narrow module so the wire format stays in one
//! place.

pub mod codec;

pub use codec::{decode_response, encode_request, RpcEnvelope};
