// src/snapshot.rs

//! The snapshot blob sent to a follower after `FULLRESYNC`. Its internal
//! format is explicitly out of scope (spec.md §1); this crate only needs a
//! fixed byte string known to valid clients as a valid empty snapshot.

use bytes::Bytes;

/// `"REDIS0009"` followed by the `0xFF` EOF marker: the canonical minimal
/// empty-database snapshot byte string used by real client implementations
/// that speak this handshake.
const EMPTY_SNAPSHOT_HEX: &str = "524544495330303039ff";

/// Decodes the fixed empty-snapshot blob. `hex::decode` only fails on
/// malformed input, and `EMPTY_SNAPSHOT_HEX` is a compile-time constant, so
/// this cannot fail in practice — callers may `expect` it.
pub fn empty_snapshot() -> Bytes {
    Bytes::from(hex::decode(EMPTY_SNAPSHOT_HEX).expect("EMPTY_SNAPSHOT_HEX is valid hex"))
}
