//! Object identity for the gitvault storage engine.
//!
//! Every stored object is addressed by the SHA-1 of its canonical form
//! `"<type> <size>\0<payload>"`. This crate provides the 20-byte
//! [`ObjectId`], hex encoding/decoding, a streaming [`hasher::Hasher`]
//! with collision detection, and the fan-out table used by pack indices.

mod error;
pub mod fanout;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use oid::ObjectId;
