//! Requester-side per-sender statistics.

use std::net::SocketAddrV4;

use serde::Serialize;

/// Statistics accumulated while fetching one chunk from one sender.
#[derive(Debug, Clone, Serialize)]
pub struct SenderStats {
    pub address: SocketAddrV4,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub duration_ms: u64,
}

impl SenderStats {
    pub fn new(address: SocketAddrV4) -> Self {
        SenderStats {
            address,
            packets_received: 0,
            bytes_received: 0,
            duration_ms: 0,
        }
    }

    /// Average packets/second over `duration_ms`, rounded to the nearest
    /// integer. Zero duration yields zero rather than dividing by zero.
    pub fn average_packets_per_second(&self) -> u64 {
        if self.duration_ms == 0 {
            return 0;
        }
        let seconds = self.duration_ms as f64 / 1000.0;
        (self.packets_received as f64 / seconds).round() as u64
    }
}
