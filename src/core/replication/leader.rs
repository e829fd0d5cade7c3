// src/core/replication/leader.rs

//! Pure helpers for the leader side of replication. The stateful parts —
//! replica registration and propagation fan-out — live on `ServerState`
//! (`register_replica`, `propagate`) since they need the accepted socket's
//! write sink, which only `core::connection::handler` has at hand.

use crate::core::protocol::Frame;

/// Builds the `+FULLRESYNC <replid> 0` reply sent in response to `PSYNC`.
/// This store only ever performs a full resync (spec.md §1 Non-goals
/// exclude partial resync), and every follower baselines its offset at 0
/// right after consuming the snapshot — so the trailing offset here is
/// always the literal `0`, never the leader's live `master_repl_offset`.
pub fn full_resync_reply(master_replid: &str) -> Frame {
    Frame::simple(format!("FULLRESYNC {master_replid} 0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_resync_reply_has_expected_shape() {
        let frame = full_resync_reply("abc123");
        assert_eq!(frame, Frame::simple("FULLRESYNC abc123 0"));
    }
}
