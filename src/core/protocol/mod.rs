// src/core/protocol/mod.rs

//! The wire protocol: a self-delimiting, typed, framed representation used
//! for every message in both directions.

mod frame;

pub use frame::{parse_rdb_header, DecodedFrame, Frame, FrameCodec};
