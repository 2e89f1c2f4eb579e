//! Protocol Buffer messages exchanged between a leader and its followers.
//!
//! The message layouts mirror `replication.proto` and are encoded with
//! [`prost`], which lets the gRPC transport use tonic's prost codec.

mod replication;

pub use replication::*;
