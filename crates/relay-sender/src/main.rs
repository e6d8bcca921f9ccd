//! Blocks on the initial chunk REQUEST, then runs a windowed reliable
//! transmit/ack/retransmit session and a final END emission.

mod engine;

use std::fs::File;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relay_wire::wire::{Endpoint, MAX_PACKET_LEN, Packet, PacketType, Priority};

use engine::SessionParams;

/// Chunk-holding sender: serves one file chunk to the requester that asks
/// for it, over the overlay.
#[derive(Parser, Debug)]
#[command(name = "relay-sender")]
struct Cli {
    /// Port this sender listens on.
    #[arg(short = 'p', value_parser = clap::value_parser!(u16).range(2050..=65535))]
    port: u16,

    /// Requester port to send DATA/END packets to.
    #[arg(short = 'g', value_parser = clap::value_parser!(u16).range(2050..=65535))]
    requester_port: u16,

    /// Transmission rate in packets per second.
    #[arg(short = 'r')]
    rate_pps: u32,

    /// Starting sequence number for the first DATA packet.
    #[arg(short = 'q', default_value_t = 0)]
    start_seq: u32,

    /// Payload size in bytes per DATA packet.
    #[arg(short = 'l')]
    payload_bytes: u32,

    /// Hostname or address of the emulator this sender talks through.
    #[arg(short = 'f')]
    emulator_host: String,

    /// Emulator port.
    #[arg(short = 'e', value_parser = clap::value_parser!(u16).range(2050..=65535))]
    emulator_port: u16,

    /// Priority applied to all DATA/END packets from this sender.
    #[arg(short = 'i', value_parser = clap::value_parser!(u8).range(1..=3))]
    priority: u8,

    /// Retransmission timeout in milliseconds.
    #[arg(short = 't')]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cli.port))
        .with_context(|| format!("failed to bind sender socket to port {}", cli.port))?;
    tracing::info!(port = cli.port, "sender listening for a chunk request");

    let mut recv_buf = vec![0u8; MAX_PACKET_LEN];
    let (len, _from) = socket
        .recv_from(&mut recv_buf)
        .context("failed waiting for the initial chunk request")?;
    let request = Packet::decode(&recv_buf[..len]).context("received a malformed chunk request")?;
    if request.packet_type != PacketType::Request {
        anyhow::bail!("expected a REQUEST packet, got {:?}", request.packet_type);
    }

    let filename = String::from_utf8(request.payload.to_vec())
        .context("chunk request filename payload was not valid UTF-8")?;
    tracing::info!(filename = %filename, window = request.length, "chunk requested");

    let file = File::open(&filename).with_context(|| format!("failed to open chunk file {filename}"))?;

    // The overlay preserves the outer header end to end, so the requester's
    // real host is `request.src.ip`; its reply port is pinned by `-g` rather
    // than trusted from the packet, matching how the peer ports are fixed up
    // front across this whole system.
    let requester = Endpoint::new(request.src.ip, cli.requester_port);
    let own = Endpoint::new(
        resolve_self(&cli.emulator_host, cli.emulator_port)?,
        cli.port,
    );

    // DATA/END are always sent to the emulator's UDP endpoint; the packet's
    // outer header separately encodes the true requester endpoint as `dest`.
    let relay_addr = resolve_relay_addr(&cli.emulator_host, cli.emulator_port)?;

    let params = SessionParams {
        requester,
        own,
        relay_addr,
        priority: Priority::try_from(cli.priority).expect("clap range already validated 1..=3"),
        window_len: request.length,
        payload_bytes: cli.payload_bytes,
        start_seq: cli.start_seq,
        rate_pps: cli.rate_pps,
        timeout_ms: cli.timeout_ms,
    };

    engine::run_session(&socket, file, params).context("sender session failed")?;

    tracing::info!("session complete");
    Ok(())
}

fn resolve_relay_addr(emulator_host: &str, emulator_port: u16) -> Result<SocketAddrV4> {
    use std::net::ToSocketAddrs;
    (emulator_host, emulator_port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve emulator host {emulator_host}"))?
        .find_map(|addr| match addr {
            std::net::SocketAddr::V4(v4) => Some(v4),
            std::net::SocketAddr::V6(_) => None,
        })
        .with_context(|| format!("emulator host {emulator_host} has no IPv4 address"))
}

fn resolve_self(emulator_host: &str, emulator_port: u16) -> Result<Ipv4Addr> {
    // Outbound-connect trick to learn which local interface address the
    // kernel would route packets to the emulator through.
    let relay_addr = resolve_relay_addr(emulator_host, emulator_port)?;
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    probe.connect(relay_addr)?;
    match probe.local_addr()?.ip() {
        std::net::IpAddr::V4(ip) => Ok(ip),
        std::net::IpAddr::V6(_) => anyhow::bail!("sender requires an IPv4 local address"),
    }
}
