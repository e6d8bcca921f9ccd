//! Requester-side reassembly map.
//!
//! Keyed by `(chunk_index, seq_num)` so that duplicate DATA packets (from a
//! sender's retransmissions) simply overwrite the same slot with identical
//! bytes, and the final file is produced by draining the map in ascending
//! key order.

use std::collections::BTreeMap;

use bytes::Bytes;

#[derive(Debug, Default)]
pub struct ChunkMap {
    payloads: BTreeMap<(u32, u32), Bytes>,
}

impl ChunkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunk_index: u32, seq_num: u32, payload: Bytes) {
        self.payloads.insert((chunk_index, seq_num), payload);
    }

    /// Concatenate all stored payloads in ascending `(chunk_index, seq_num)`
    /// order.
    pub fn reassemble(&self) -> Vec<u8> {
        let total: usize = self.payloads.values().map(|p| p.len()).sum();
        let mut out = Vec::with_capacity(total);
        for payload in self.payloads.values() {
            out.extend_from_slice(payload);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}
