//! Looks up a requested file's chunk table, fetches each chunk in order
//! from its holding sender, and writes the reassembled file to disk.

mod engine;

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relay_common::endpoint::HostnameResolver;
use relay_common::tracker::load_file_table;
use relay_wire::wire::{Endpoint, Priority};

use engine::{FetchParams, RECV_TIMEOUT};

/// Fetches a file chunk-by-chunk from the senders named in a tracker file.
#[derive(Parser, Debug)]
#[command(name = "relay-requester")]
struct Cli {
    /// Port this requester listens on.
    #[arg(short = 'p', value_parser = clap::value_parser!(u16).range(2050..=65535))]
    port: u16,

    /// Name of the file to request, and the path data is written to.
    #[arg(short = 'o')]
    filename: String,

    /// Hostname or address of the emulator this requester talks through.
    #[arg(short = 'f')]
    emulator_host: String,

    /// Emulator port.
    #[arg(short = 'e', value_parser = clap::value_parser!(u16).range(2050..=65535))]
    emulator_port: u16,

    /// Window size advertised in each REQUEST packet.
    #[arg(short = 'w')]
    window_len: u32,

    /// Debug mode: verbose per-packet tracing.
    #[arg(short = 'd', default_value_t = false)]
    debug: bool,
}

/// Fixed name of the tracker file, read from the current working directory.
const TRACKER_FILE: &str = "tracker.txt";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();

    let mut resolver = HostnameResolver::new();
    let table = load_file_table(TRACKER_FILE, &mut resolver, &cli.filename)
        .with_context(|| format!("failed to load tracker entry for {}", cli.filename))?;
    tracing::info!(chunks = table.chunk_count(), filename = %cli.filename, "tracker loaded");

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cli.port))
        .with_context(|| format!("failed to bind requester socket to port {}", cli.port))?;
    socket
        .set_read_timeout(Some(RECV_TIMEOUT))
        .context("failed to set requester receive timeout")?;

    let relay_addr = resolve_relay_addr(&cli.emulator_host, cli.emulator_port)?;
    let own = Endpoint::new(resolve_self(relay_addr)?, cli.port);

    let params = FetchParams {
        own,
        relay_addr,
        filename: cli.filename.clone(),
        window_len: cli.window_len,
        priority: Priority::One,
        debug: cli.debug,
    };

    let outcome = engine::fetch_all(&socket, &table, &params)?;

    std::fs::write(&cli.filename, outcome.chunk_map.reassemble())
        .with_context(|| format!("failed to write reassembled file {}", cli.filename))?;

    println!("\nfetch summary");
    let mut total_packets = 0u64;
    let mut total_bytes = 0u64;
    for s in &outcome.stats_by_sender {
        println!(
            "  {}: {} packets, {} bytes, {} pps, {} ms",
            s.address,
            s.packets_received,
            s.bytes_received,
            s.average_packets_per_second(),
            s.duration_ms
        );
        total_packets += s.packets_received;
        total_bytes += s.bytes_received;
    }
    println!("  total: {total_packets} packets, {total_bytes} bytes");

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

fn resolve_self(relay_addr: SocketAddrV4) -> Result<Ipv4Addr> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    probe.connect(relay_addr)?;
    match probe.local_addr()?.ip() {
        std::net::IpAddr::V4(ip) => Ok(ip),
        std::net::IpAddr::V6(_) => anyhow::bail!("requester requires an IPv4 local address"),
    }
}
