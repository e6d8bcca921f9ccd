//! Three strict-priority FIFOs plus a single delay-hold slot.

use std::collections::VecDeque;
use std::net::SocketAddrV4;

use relay_wire::wire::Packet;

/// A packet waiting to be released, carrying the per-link delay, loss
/// probability, and forwarding-table next hop it was enqueued with. The
/// packet's own header is never rewritten; `next_hop` is the send target
/// the forwarder uses once the packet is released.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub packet: Packet,
    pub next_hop: SocketAddrV4,
    pub delay_ms: u32,
    pub loss_prob: u8,
}

struct DelaySlot {
    queued: QueuedPacket,
    hold_start_ms: u64,
}

/// Strict-priority queue with one packet held in a delay slot at a time.
///
/// Q1 always drains before Q2, which always drains before Q3. Within a
/// queue, FIFO. Only one packet is ever "in flight through the delay" —
/// a higher-priority arrival never preempts an already-held packet.
pub struct PriorityDelayQueue {
    queues: [VecDeque<QueuedPacket>; 3],
    capacity: usize,
    slot: Option<DelaySlot>,
}

/// Why a packet offered to the queue was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull {
    /// 1-based priority level of the queue that was full.
    pub priority: u8,
}

impl PriorityDelayQueue {
    pub fn new(capacity: usize) -> Self {
        PriorityDelayQueue {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            capacity,
            slot: None,
        }
    }

    /// Offer `packet` to the queue matching its priority. Returns
    /// `Err(QueueFull)` without enqueuing when that queue is already at
    /// capacity.
    pub fn offer(&mut self, queued: QueuedPacket) -> Result<(), QueueFull> {
        let idx = queued.packet.priority.index();
        if self.queues[idx].len() >= self.capacity {
            return Err(QueueFull {
                priority: queued.packet.priority.as_u8(),
            });
        }
        self.queues[idx].push_back(queued);
        Ok(())
    }

    /// Advance the delay slot. If empty, promote the next packet (highest
    /// non-empty priority first) and start its hold timer. If the held
    /// packet's delay has elapsed, release it.
    pub fn tick(&mut self, now_ms: u64) -> Option<QueuedPacket> {
        if self.slot.is_none() {
            if let Some(queued) = self.pop_highest_priority() {
                self.slot = Some(DelaySlot {
                    queued,
                    hold_start_ms: now_ms,
                });
            }
        }

        if let Some(slot) = &self.slot {
            if now_ms.saturating_sub(slot.hold_start_ms) >= slot.queued.delay_ms as u64 {
                return self.slot.take().map(|s| s.queued);
            }
        }

        None
    }

    fn pop_highest_priority(&mut self) -> Option<QueuedPacket> {
        for queue in &mut self.queues {
            if let Some(queued) = queue.pop_front() {
                return Some(queued);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_wire::wire::{Endpoint, PacketType, Priority};
    use std::net::Ipv4Addr;

    fn next_hop_addr() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(2, 2, 2, 2), 2)
    }

    fn packet(priority: Priority, seq: u32) -> Packet {
        Packet {
            priority,
            src: Endpoint::new(Ipv4Addr::new(1, 1, 1, 1), 1),
            dest: Endpoint::new(Ipv4Addr::new(2, 2, 2, 2), 2),
            packet_type: PacketType::Data,
            seq_num: seq,
            length: 0,
            payload: bytes::Bytes::new(),
        }
    }

    fn queued(priority: Priority, seq: u32, delay_ms: u32) -> QueuedPacket {
        QueuedPacket {
            packet: packet(priority, seq),
            next_hop: next_hop_addr(),
            delay_ms,
            loss_prob: 0,
        }
    }

    #[test]
    fn higher_priority_drains_first() {
        let mut q = PriorityDelayQueue::new(4);
        q.offer(queued(Priority::Three, 1, 0)).unwrap();
        q.offer(queued(Priority::One, 2, 0)).unwrap();

        let first = q.tick(0).unwrap();
        assert_eq!(first.packet.seq_num, 2);
    }

    #[test]
    fn fifo_within_one_priority() {
        let mut q = PriorityDelayQueue::new(4);
        q.offer(queued(Priority::One, 1, 0)).unwrap();
        q.offer(queued(Priority::One, 2, 0)).unwrap();

        assert_eq!(q.tick(0).unwrap().packet.seq_num, 1);
        assert_eq!(q.tick(0).unwrap().packet.seq_num, 2);
    }

    #[test]
    fn overflow_is_rejected_without_dropping_existing_entries() {
        let mut q = PriorityDelayQueue::new(1);
        q.offer(queued(Priority::Two, 1, 0)).unwrap();
        let err = q.offer(queued(Priority::Two, 2, 0)).unwrap_err();
        assert_eq!(err, QueueFull { priority: 2 });
    }

    #[test]
    fn delay_holds_packet_until_deadline() {
        let mut q = PriorityDelayQueue::new(4);
        q.offer(queued(Priority::One, 1, 100)).unwrap();

        assert!(q.tick(0).is_none()); // enters slot, hold_start=0
        assert!(q.tick(50).is_none()); // not yet elapsed
        let released = q.tick(100).unwrap();
        assert_eq!(released.packet.seq_num, 1);
    }

    #[test]
    fn occupied_slot_blocks_higher_priority_arrival() {
        let mut q = PriorityDelayQueue::new(4);
        q.offer(queued(Priority::Three, 1, 100)).unwrap();
        assert!(q.tick(0).is_none()); // priority-3 packet enters the slot

        q.offer(queued(Priority::One, 2, 0)).unwrap();
        // Slot is occupied by the priority-3 packet; the new priority-1
        // arrival must wait even though it outranks it.
        assert!(q.tick(50).is_none());
        let released = q.tick(100).unwrap();
        assert_eq!(released.packet.seq_num, 1);
    }

    #[test]
    fn zero_delay_releases_immediately() {
        let mut q = PriorityDelayQueue::new(4);
        q.offer(queued(Priority::One, 1, 0)).unwrap();
        assert_eq!(q.tick(0).unwrap().packet.seq_num, 1);
    }
}
