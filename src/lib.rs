//! # docwire-client
//!
//! Minimal OP_MSG wire-protocol client for document databases.
//!
//! Opens a raw TCP stream, frames commands as binary messages, and decodes
//! the structured reply - no full driver dependency. Meant for diagnostic
//! scripts, test harnesses, and lightweight tooling that needs direct
//! protocol access.
//!
//! ## Architecture
//!
//! - **codec**: the BSON value tree and its binary encoding
//! - **protocol**: message framing, reassembly, checksums
//! - **correlate**: request id allocation and reply matching
//! - **client**: connection lifecycle and request execution
//!
//! ## Example
//!
//! ```ignore
//! use docwire_client::{doc, Connection, Section};
//!
//! #[tokio::main]
//! async fn main() -> docwire_client::Result<()> {
//!     let conn = Connection::connect("127.0.0.1", 27017).await?;
//!     let reply = conn
//!         .execute_op_msg(&[Section::Body(doc! {
//!             "count" => "profiles",
//!             "$db" => "juanportal",
//!         })])
//!         .await?;
//!     println!("{}", reply);
//!     conn.close().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod correlate;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{Connection, ConnectionConfig, ConnectionState};
pub use codec::{Binary, BsonCodec, Decimal128, Document, ObjectId, Regex, Timestamp, Value};
pub use error::{DocwireError, Result};
pub use protocol::{Section, WireMessage};
