//! Single-threaded, non-blocking store-and-forward node: receive, classify
//! by the static forwarding table, hold in a priority-delay queue, apply
//! probabilistic loss, forward.

mod queue;
mod signal;

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use quanta::Clock;
use rand::Rng;
use tracing_subscriber::EnvFilter;

use relay_common::endpoint::HostnameResolver;
use relay_common::forwarding::ForwardingTable;
use relay_common::losslog::{LossEvent, LossLog};
use relay_wire::wire::{Packet, PacketType, MAX_PACKET_LEN};

use queue::{PriorityDelayQueue, QueuedPacket};

/// Single-threaded non-blocking packet forwarder with per-link delay,
/// bounded priority queues, and probabilistic loss injection.
#[derive(Parser, Debug)]
#[command(name = "relay-emulator")]
struct Cli {
    /// Port to listen for packets on.
    #[arg(short = 'p', value_parser = clap::value_parser!(u16).range(2050..=65535))]
    port: u16,

    /// Capacity of each priority queue.
    #[arg(short = 'q')]
    queue_size: usize,

    /// Path to the static forwarding-table file.
    #[arg(short = 'f')]
    forwarding_file: String,

    /// Path to the loss-event log file (truncated at startup).
    #[arg(short = 'l')]
    log_file: String,

    /// Debug mode: verbose per-packet tracing.
    #[arg(short = 'd', default_value_t = false)]
    debug: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();

    let mut resolver = HostnameResolver::new();
    let forwarding = ForwardingTable::load(&cli.forwarding_file, &mut resolver, cli.port)
        .with_context(|| format!("failed to load forwarding table from {}", cli.forwarding_file))?;
    tracing::info!(entries = forwarding.len(), port = cli.port, "forwarding table loaded");

    let mut loss_log = LossLog::create(&cli.log_file)
        .with_context(|| format!("failed to open loss log {}", cli.log_file))?;

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cli.port))
        .with_context(|| format!("failed to bind emulator socket to port {}", cli.port))?;
    socket
        .set_nonblocking(true)
        .context("failed to set emulator socket non-blocking")?;

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    {
        let running = running.clone();
        signal::on_shutdown(move || {
            tracing::info!("shutting down");
            running.store(false, Ordering::Relaxed);
        });
    }

    let clock = Clock::new();
    let start = clock.now();
    let mut rng = rand::rng();
    let mut queue = PriorityDelayQueue::new(cli.queue_size);
    let mut recv_buf = vec![0u8; MAX_PACKET_LEN];

    while running.load(Ordering::Relaxed) {
        let now_ms = clock.now().duration_since(start).as_millis() as u64;

        match socket.recv_from(&mut recv_buf) {
            Ok((len, _from)) => {
                handle_incoming(
                    &recv_buf[..len],
                    &forwarding,
                    &mut queue,
                    &mut loss_log,
                    cli.debug,
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e).context("fatal error receiving on emulator socket"),
        }

        if let Some(released) = queue.tick(now_ms) {
            forward_or_drop(&released, &socket, &mut loss_log, &mut rng, cli.debug);
        }
    }

    Ok(())
}

fn handle_incoming(
    bytes: &[u8],
    forwarding: &ForwardingTable,
    queue: &mut PriorityDelayQueue,
    loss_log: &mut LossLog,
    debug: bool,
) {
    let packet = match Packet::decode(bytes) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed packet");
            return;
        }
    };

    let Some(entry) = forwarding.lookup(packet.dest.ip, packet.dest.port) else {
        record_loss(
            loss_log,
            LossEvent {
                reason: "No forwarding entry found",
                src_ip: packet.src.ip,
                src_port: packet.src.port,
                dest_ip: packet.dest.ip,
                dest_port: packet.dest.port,
                priority: packet.priority.as_u8(),
                payload_size: packet.outer_length(),
            },
        );
        return;
    };

    if debug {
        tracing::debug!(?packet, next_hop = %entry.next_hop_ip, "routed packet");
    }

    let priority = packet.priority.as_u8();
    let outer_length = packet.outer_length();
    let src = packet.src;
    let dest = packet.dest;

    let queued = QueuedPacket {
        packet,
        next_hop: SocketAddrV4::new(entry.next_hop_ip, entry.next_hop_port),
        delay_ms: entry.delay_ms,
        loss_prob: entry.loss_prob,
    };

    if queue.offer(queued).is_err() {
        record_loss(
            loss_log,
            LossEvent {
                reason: &format!("Priority queue {priority} was full"),
                src_ip: src.ip,
                src_port: src.port,
                dest_ip: dest.ip,
                dest_port: dest.port,
                priority,
                payload_size: outer_length,
            },
        );
    }
}

fn forward_or_drop(
    queued: &QueuedPacket,
    socket: &UdpSocket,
    loss_log: &mut LossLog,
    rng: &mut impl Rng,
    debug: bool,
) {
    let packet = &queued.packet;

    let dropped = packet.packet_type != PacketType::End
        && queued.loss_prob > 0
        && rng.random_range(1..=100) <= queued.loss_prob;

    if dropped {
        record_loss(
            loss_log,
            LossEvent {
                reason: "Loss event occurred",
                src_ip: packet.src.ip,
                src_port: packet.src.port,
                dest_ip: packet.dest.ip,
                dest_port: packet.dest.port,
                priority: packet.priority.as_u8(),
                payload_size: packet.outer_length(),
            },
        );
        return;
    }

    let encoded = packet.encode();
    if let Err(e) = socket.send_to(&encoded, queued.next_hop) {
        tracing::warn!(error = %e, next_hop = %queued.next_hop, "failed to forward packet");
    } else if debug {
        tracing::debug!(next_hop = %queued.next_hop, seq = packet.seq_num, "forwarded packet");
    }
}

/// Writes one loss-log line and mirrors it as a `tracing::debug!` event, so
/// an operator running with `RUST_LOG=relay_emulator=debug` sees drops live
/// without tailing the log file.
fn record_loss(loss_log: &mut LossLog, event: LossEvent<'_>) {
    tracing::debug!(
        reason = event.reason,
        src = %format!("{}:{}", event.src_ip, event.src_port),
        dest = %format!("{}:{}", event.dest_ip, event.dest_port),
        priority = event.priority,
        size = event.payload_size,
        "packet dropped"
    );
    if let Err(e) = loss_log.record(event) {
        tracing::warn!(error = %e, "failed to write loss log entry");
    }
}
