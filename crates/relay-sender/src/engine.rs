//! Windowed reliable-transport sender engine.
//!
//! `IDLE` is the caller awaiting the initial REQUEST; everything below
//! starts from `SENDING`.

use std::fs::File;
use std::io::Read;
use std::net::{SocketAddrV4, UdpSocket};
use std::time::Duration;

use bytes::Bytes;
use quanta::Clock;

use relay_wire::inflight::{InFlightTable, TimeoutOutcome};
use relay_wire::wire::{Endpoint, Packet, PacketType, Priority, MAX_PACKET_LEN};

pub struct SessionParams {
    pub requester: Endpoint,
    pub own: Endpoint,
    /// The emulator's UDP address: every packet this session sends goes
    /// here first regardless of the final `dest` encoded in its header.
    pub relay_addr: SocketAddrV4,
    pub priority: Priority,
    pub window_len: u32,
    pub payload_bytes: u32,
    pub start_seq: u32,
    pub rate_pps: u32,
    pub timeout_ms: u64,
}

/// Runs one sender session end to end: windowed transmit, ack/retransmit,
/// END emission. Blocks the calling thread for the session's duration.
pub fn run_session(socket: &UdpSocket, mut file: File, params: SessionParams) -> std::io::Result<()> {
    let clock = Clock::new();
    let epoch = clock.now();
    let pace_interval = Duration::from_secs_f64(1.0 / params.rate_pps as f64);

    let mut seq_num = params.start_seq;
    let mut inflight = InFlightTable::new();
    let mut file_exhausted = false;
    let mut read_buf = vec![0u8; params.payload_bytes as usize];

    loop {
        // SENDING: fill up to one window's worth of DATA packets.
        let mut sent_this_window = 0u32;
        while sent_this_window < params.window_len && !file_exhausted {
            let n = read_chunk(&mut file, &mut read_buf)?;
            if n == 0 {
                file_exhausted = true;
                break;
            }

            let packet = Packet {
                priority: params.priority,
                src: params.own,
                dest: params.requester,
                packet_type: PacketType::Data,
                seq_num,
                length: n as u32,
                payload: Bytes::copy_from_slice(&read_buf[..n]),
            };
            let encoded = packet.encode();
            print_packet_block(&packet, &now_string());
            socket.send_to(&encoded, params.relay_addr)?;

            let sent_time_ms = clock.now().duration_since(epoch).as_millis() as u64;
            inflight.insert(seq_num, encoded, sent_time_ms, params.relay_addr);

            pace(&clock, epoch, sent_time_ms, pace_interval);

            seq_num += 1;
            sent_this_window += 1;
        }

        if inflight.is_empty() && file_exhausted {
            break;
        }

        // AWAIT_ACKS: drain until every packet from this window is acked or
        // abandoned to attempt exhaustion.
        socket.set_nonblocking(true)?;
        let mut ack_buf = vec![0u8; MAX_PACKET_LEN];
        while !inflight.is_empty() {
            match socket.recv_from(&mut ack_buf) {
                Ok((len, _from)) => {
                    if let Ok(packet) = Packet::decode(&ack_buf[..len]) {
                        if packet.packet_type == PacketType::Ack {
                            inflight.ack(packet.seq_num);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }

            let now_ms = clock.now().duration_since(epoch).as_millis() as u64;
            let outcomes = inflight.scan_timeouts(now_ms, params.timeout_ms, |_seq, record| {
                let _ = socket.send_to(&record.packet_bytes, record.dest);
                pace(&clock, epoch, now_ms, pace_interval);
                true
            });
            for (seq, outcome) in outcomes {
                if outcome == TimeoutOutcome::Exhausted {
                    println!(
                        "Packet {seq} abandoned after {} attempts without acknowledgement",
                        relay_wire::inflight::MAX_ATTEMPTS
                    );
                }
            }
        }

        if file_exhausted {
            break;
        }
    }

    // FINALIZE
    let end_packet = Packet {
        priority: params.priority,
        src: params.own,
        dest: params.requester,
        packet_type: PacketType::End,
        seq_num,
        length: 0,
        payload: Bytes::new(),
    };
    print_packet_block(&end_packet, &now_string());
    socket.send_to(&end_packet.encode(), params.relay_addr)?;

    Ok(())
}

fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn pace(clock: &Clock, epoch: quanta::Instant, sent_time_ms: u64, interval: Duration) {
    let deadline_ms = sent_time_ms + interval.as_millis() as u64;
    while (clock.now().duration_since(epoch).as_millis() as u64) < deadline_ms {
        std::hint::spin_loop();
    }
}

fn now_string() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

fn print_packet_block(packet: &Packet, send_time: &str) {
    let label = match packet.packet_type {
        PacketType::Data => "DATA",
        PacketType::End => "END",
        _ => "?",
    };
    let preview = String::from_utf8_lossy(&packet.payload[..packet.payload.len().min(4)]);
    println!("{label} Packet");
    println!("send time:       {send_time}");
    println!(
        "requester addr:  {}:{}",
        packet.dest.ip, packet.dest.port
    );
    println!("sequence:        {}", packet.seq_num);
    println!("length:          {}", packet.length);
    println!("payload:         {preview}");
    println!();
}
