//! # In-flight table
//!
//! Tracks DATA packets the sender has transmitted and is waiting on an ACK
//! for. Keyed directly by `seq_num` — unlike a slab pool there's no separate
//! handle indirection, since `seq_num` is already a dense, externally visible
//! key shared with the wire protocol.

use std::collections::HashMap;
use std::net::SocketAddrV4;

use bytes::Bytes;

/// A DATA packet awaiting acknowledgement is abandoned after this many
/// transmission attempts (the original send counts as attempt 1).
pub const MAX_ATTEMPTS: u8 = 6;

/// One outstanding DATA transmission.
#[derive(Debug, Clone)]
pub struct InFlightRecord {
    pub packet_bytes: Bytes,
    pub sent_time_ms: u64,
    pub attempts: u8,
    pub dest: SocketAddrV4,
}

/// The set of DATA packets a sender session is waiting to have acknowledged.
#[derive(Debug, Default)]
pub struct InFlightTable {
    records: HashMap<u32, InFlightRecord>,
}

/// Outcome of a timeout scan over the in-flight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// The record should be re-sent; its `attempts` counter has already been
    /// incremented and `sent_time_ms` reset to the value given.
    Retransmit,
    /// The record hit [`MAX_ATTEMPTS`] and has been removed from the table.
    Exhausted,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first transmission of a DATA packet.
    pub fn insert(&mut self, seq_num: u32, packet_bytes: Bytes, sent_time_ms: u64, dest: SocketAddrV4) {
        self.records.insert(
            seq_num,
            InFlightRecord {
                packet_bytes,
                sent_time_ms,
                attempts: 1,
                dest,
            },
        );
    }

    /// Remove the record for `seq_num` on ACK receipt. Returns whether a
    /// record was actually present (a duplicate/late ACK is a no-op).
    pub fn ack(&mut self, seq_num: u32) -> bool {
        self.records.remove(&seq_num).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Scan every record for timeout expiry. For each `seq_num` whose
    /// `sent_time_ms` is more than `timeout_ms` old as of `now_ms`, invoke
    /// `on_timeout` with the current record and `now_ms`: if it returns
    /// `true` the record is treated as having been re-sent (attempts
    /// incremented, timer reset); otherwise the record is abandoned.
    ///
    /// Returns the `(seq_num, outcome)` pairs produced this scan, in
    /// unspecified order, so callers can pace retransmissions and log
    /// exhaustion.
    pub fn scan_timeouts(
        &mut self,
        now_ms: u64,
        timeout_ms: u64,
        mut retransmit: impl FnMut(u32, &InFlightRecord) -> bool,
    ) -> Vec<(u32, TimeoutOutcome)> {
        let expired: Vec<u32> = self
            .records
            .iter()
            .filter(|(_, record)| now_ms.saturating_sub(record.sent_time_ms) > timeout_ms)
            .map(|(seq, _)| *seq)
            .collect();

        let mut outcomes = Vec::with_capacity(expired.len());
        for seq_num in expired {
            let attempts = self.records.get(&seq_num).map(|r| r.attempts).unwrap_or(0);
            if attempts >= MAX_ATTEMPTS {
                self.records.remove(&seq_num);
                outcomes.push((seq_num, TimeoutOutcome::Exhausted));
                continue;
            }

            let record = self.records.get(&seq_num).expect("checked above");
            if retransmit(seq_num, record) {
                let record = self.records.get_mut(&seq_num).expect("checked above");
                record.attempts += 1;
                record.sent_time_ms = now_ms;
                outcomes.push((seq_num, TimeoutOutcome::Retransmit));
            }
        }
        outcomes
    }
}
