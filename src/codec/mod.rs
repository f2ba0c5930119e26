//! Codec module - the BSON value tree and its binary encoding.
//!
//! This module provides the document layer the framer is built on:
//!
//! - [`Value`] / [`Document`] - the native tagged value tree, with key
//!   order preserved exactly (order is part of the wire contract)
//! - [`BsonCodec`] - pure binary encode/decode
//! - [`extended`] - extended JSON rendering for diagnostics

mod bson;
mod decimal128;
mod document;
mod value;

pub mod extended;

pub use bson::BsonCodec;
pub use decimal128::Decimal128;
pub use document::Document;
pub use value::{tag, Binary, ObjectId, Regex, Timestamp, Value};
