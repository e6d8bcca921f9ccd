//! Sequential per-chunk fetch: one REQUEST/ACK exchange per chunk, in
//! tracker order, accumulating into a single reassembly map.

use std::collections::HashMap;
use std::net::{SocketAddrV4, UdpSocket};
use std::time::Duration;

use bytes::Bytes;
use quanta::Clock;

use relay_common::tracker::FileTable;
use relay_wire::chunkmap::ChunkMap;
use relay_wire::stats::SenderStats;
use relay_wire::wire::{Endpoint, Packet, PacketType, Priority, MAX_PACKET_LEN};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(20);

/// A chunk-holding sender didn't emit a single packet for 20 seconds straight.
#[derive(Debug, thiserror::Error)]
#[error("Detected lost packet after {timeout} seconds waiting on chunk {chunk_index} from {sender}", timeout = RECV_TIMEOUT.as_secs())]
pub struct ChunkTimedOut {
    pub chunk_index: u32,
    pub sender: SocketAddrV4,
}

pub struct FetchParams {
    pub own: Endpoint,
    pub relay_addr: SocketAddrV4,
    pub filename: String,
    pub window_len: u32,
    pub priority: Priority,
    pub debug: bool,
}

pub struct FetchOutcome {
    pub chunk_map: ChunkMap,
    pub stats_by_sender: Vec<SenderStats>,
}

/// Fetches every chunk in `table`, in order, and returns the assembled
/// payload map plus per-sender statistics.
pub fn fetch_all(socket: &UdpSocket, table: &FileTable, params: &FetchParams) -> Result<FetchOutcome, ChunkTimedOut> {
    let clock = Clock::new();
    let mut chunk_map = ChunkMap::new();
    let mut stats: HashMap<SocketAddrV4, SenderStats> = HashMap::new();

    for chunk_index in 1..=table.chunk_count() {
        let location = table.chunk(chunk_index).expect("index within chunk_count");
        let sender_addr = SocketAddrV4::new(location.sender_ip, location.sender_port);

        let request = Packet {
            priority: params.priority,
            src: params.own,
            dest: Endpoint::new(location.sender_ip, location.sender_port),
            packet_type: PacketType::Request,
            seq_num: 0,
            length: params.window_len,
            payload: Bytes::copy_from_slice(params.filename.as_bytes()),
        };
        let _ = socket.send_to(&request.encode(), params.relay_addr);

        let entry = stats
            .entry(sender_addr)
            .or_insert_with(|| SenderStats::new(sender_addr));
        let chunk_start = clock.now();

        let mut recv_buf = vec![0u8; MAX_PACKET_LEN];
        loop {
            match socket.recv_from(&mut recv_buf) {
                Ok((len, _from)) => {
                    let Ok(packet) = Packet::decode(&recv_buf[..len]) else {
                        continue;
                    };

                    if packet.dest != params.own {
                        continue;
                    }

                    if params.debug {
                        tracing::debug!(?packet, "received packet");
                    }

                    match packet.packet_type {
                        PacketType::Data => {
                            chunk_map.insert(chunk_index, packet.seq_num, packet.payload.clone());
                            entry.packets_received += 1;
                            entry.bytes_received += packet.payload.len() as u64;

                            let ack = Packet {
                                priority: params.priority,
                                src: params.own,
                                dest: Endpoint::new(location.sender_ip, location.sender_port),
                                packet_type: PacketType::Ack,
                                seq_num: packet.seq_num,
                                length: 0,
                                payload: Bytes::new(),
                            };
                            let _ = socket.send_to(&ack.encode(), params.relay_addr);
                        }
                        PacketType::End => {
                            entry.duration_ms += clock.now().duration_since(chunk_start).as_millis() as u64;
                            break;
                        }
                        _ => continue,
                    }
                }
                Err(_) => {
                    return Err(ChunkTimedOut {
                        chunk_index,
                        sender: sender_addr,
                    });
                }
            }
        }

        println!(
            "chunk {chunk_index}/{} complete from {sender_addr} ({} packets, {} bytes)",
            table.chunk_count(),
            entry.packets_received,
            entry.bytes_received
        );
    }

    Ok(FetchOutcome {
        chunk_map,
        stats_by_sender: stats.into_values().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;

    use relay_common::endpoint::HostnameResolver;
    use relay_common::tracker::load_file_table;

    fn write_tracker(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "relay-requester-engine-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    /// A single-chunk fetch against a peer that replies DATA, DATA, END; the
    /// relay hop is collapsed since both sockets are on loopback.
    #[test]
    fn fetch_all_reassembles_one_chunk_and_collects_stats() {
        let sender_socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        sender_socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let sender_port = sender_socket.local_addr().unwrap().port();

        let tracker_path = write_tracker(&format!("file.txt 1 127.0.0.1 {sender_port}\n"));
        let mut resolver = HostnameResolver::new();
        let table = load_file_table(&tracker_path, &mut resolver, "file.txt").unwrap();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; MAX_PACKET_LEN];
            let (len, from) = sender_socket.recv_from(&mut buf).unwrap();
            let request = Packet::decode(&buf[..len]).unwrap();
            assert_eq!(request.packet_type, PacketType::Request);

            for (seq, chunk) in [(0u32, &b"HELLO"[..]), (1u32, &b" YOU"[..])] {
                let data = Packet {
                    priority: Priority::One,
                    src: request.dest,
                    dest: request.src,
                    packet_type: PacketType::Data,
                    seq_num: seq,
                    length: chunk.len() as u32,
                    payload: Bytes::copy_from_slice(chunk),
                };
                sender_socket.send_to(&data.encode(), from).unwrap();

                let mut ack_buf = [0u8; MAX_PACKET_LEN];
                let (alen, _) = sender_socket.recv_from(&mut ack_buf).unwrap();
                let ack = Packet::decode(&ack_buf[..alen]).unwrap();
                assert_eq!(ack.packet_type, PacketType::Ack);
                assert_eq!(ack.seq_num, seq);
            }

            let end = Packet {
                priority: Priority::One,
                src: request.dest,
                dest: request.src,
                packet_type: PacketType::End,
                seq_num: 2,
                length: 0,
                payload: Bytes::new(),
            };
            sender_socket.send_to(&end.encode(), from).unwrap();
        });

        let requester_socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        requester_socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let params = FetchParams {
            own: Endpoint::new(Ipv4Addr::LOCALHOST, requester_socket.local_addr().unwrap().port()),
            relay_addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, sender_port),
            filename: "file.txt".to_string(),
            window_len: 2,
            priority: Priority::One,
            debug: false,
        };

        let outcome = fetch_all(&requester_socket, &table, &params).unwrap();
        responder.join().unwrap();

        assert_eq!(outcome.chunk_map.reassemble(), b"HELLO YOU".to_vec());
        assert_eq!(outcome.stats_by_sender.len(), 1);
        assert_eq!(outcome.stats_by_sender[0].packets_received, 2);

        let _ = std::fs::remove_file(tracker_path);
    }

    #[test]
    fn fetch_all_reports_timeout_with_chunk_and_sender() {
        let unresponsive_port = {
            let probe = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            probe.local_addr().unwrap().port()
        }; // dropped: nobody is listening on this port now

        let tracker_path = write_tracker(&format!("file.txt 1 127.0.0.1 {unresponsive_port}\n"));
        let mut resolver = HostnameResolver::new();
        let table = load_file_table(&tracker_path, &mut resolver, "file.txt").unwrap();

        let requester_socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        requester_socket
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let params = FetchParams {
            own: Endpoint::new(Ipv4Addr::LOCALHOST, requester_socket.local_addr().unwrap().port()),
            relay_addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, unresponsive_port),
            filename: "file.txt".to_string(),
            window_len: 2,
            priority: Priority::One,
            debug: false,
        };

        let err = fetch_all(&requester_socket, &table, &params).unwrap_err();
        assert_eq!(err.chunk_index, 1);

        let _ = std::fs::remove_file(tracker_path);
    }
}
