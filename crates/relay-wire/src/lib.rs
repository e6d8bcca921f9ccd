//! # relay-wire
//!
//! The wire format shared by every role, plus the pure-logic pieces of the
//! sender's and requester's reliability engines that don't touch a socket.
//!
//! ## Crate structure
//!
//! - [`wire`] — outer/inner header encode/decode
//! - [`inflight`] — sender's per-`seq_num` retransmission bookkeeping
//! - [`chunkmap`] — requester's reassembly map
//! - [`stats`] — per-sender statistics

pub mod chunkmap;
pub mod inflight;
pub mod stats;
pub mod wire;
