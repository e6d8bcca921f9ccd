//! Static forwarding table, loaded once at startup.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use thiserror::Error;

use crate::endpoint::{HostnameResolver, ResolveError};

#[derive(Debug, Error)]
pub enum ForwardingTableError {
    #[error("failed to read forwarding table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("forwarding table {path} line {line}: expected 8 columns, found {found}")]
    MalformedLine { path: String, line: usize, found: usize },
    #[error("forwarding table {path} line {line}: invalid integer column: {source}")]
    InvalidInteger {
        path: String,
        line: usize,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("forwarding table {path} line {line}: {source}")]
    Resolve {
        path: String,
        line: usize,
        #[source]
        source: ResolveError,
    },
}

/// One static routing rule: `emu` is this process's own listen address;
/// `dest` is the final destination the rule matches on; `next_hop` is where
/// a matching packet is actually forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingEntry {
    pub emu_ip: Ipv4Addr,
    pub emu_port: u16,
    pub dest_ip: Ipv4Addr,
    pub dest_port: u16,
    pub next_hop_ip: Ipv4Addr,
    pub next_hop_port: u16,
    pub delay_ms: u32,
    pub loss_prob: u8,
}

#[derive(Debug, Default)]
pub struct ForwardingTable {
    entries: Vec<ForwardingEntry>,
}

impl ForwardingTable {
    /// Load entries from `path`, keeping only the rows whose `(emu_host,
    /// emu_port)` resolves to `own_port` on this host. A missing file is
    /// reported as [`ForwardingTableError::Io`], which callers should treat
    /// as a fatal startup error.
    pub fn load(
        path: impl AsRef<Path>,
        resolver: &mut HostnameResolver,
        own_port: u16,
    ) -> Result<Self, ForwardingTableError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();

        let contents = fs::read_to_string(path_ref).map_err(|source| ForwardingTableError::Io {
            path: path_display.clone(),
            source,
        })?;

        let mut entries = Vec::new();
        for (idx, raw_line) in contents.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let cols: Vec<&str> = trimmed.split_whitespace().collect();
            if cols.len() != 8 {
                return Err(ForwardingTableError::MalformedLine {
                    path: path_display,
                    line,
                    found: cols.len(),
                });
            }

            let emu_port: u16 = parse_col(&path_display, line, cols[1])?;
            if emu_port != own_port {
                continue;
            }

            let emu_ip = resolver
                .resolve(cols[0])
                .map_err(|source| ForwardingTableError::Resolve {
                    path: path_display.clone(),
                    line,
                    source,
                })?;

            let dest_ip = resolver
                .resolve(cols[2])
                .map_err(|source| ForwardingTableError::Resolve {
                    path: path_display.clone(),
                    line,
                    source,
                })?;
            let dest_port: u16 = parse_col(&path_display, line, cols[3])?;

            let next_hop_ip = resolver
                .resolve(cols[4])
                .map_err(|source| ForwardingTableError::Resolve {
                    path: path_display.clone(),
                    line,
                    source,
                })?;
            let next_hop_port: u16 = parse_col(&path_display, line, cols[5])?;

            let delay_ms: u32 = parse_col(&path_display, line, cols[6])?;
            let loss_prob: u8 = parse_col(&path_display, line, cols[7])?;

            entries.push(ForwardingEntry {
                emu_ip,
                emu_port,
                dest_ip,
                dest_port,
                next_hop_ip,
                next_hop_port,
                delay_ms,
                loss_prob,
            });
        }

        Ok(ForwardingTable { entries })
    }

    /// Linear scan by `(dest_ip, dest_port)`, matching the original's
    /// by-column lookup.
    pub fn lookup(&self, dest_ip: Ipv4Addr, dest_port: u16) -> Option<&ForwardingEntry> {
        self.entries
            .iter()
            .find(|e| e.dest_ip == dest_ip && e.dest_port == dest_port)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_col<T: std::str::FromStr<Err = std::num::ParseIntError>>(
    path: &str,
    line: usize,
    col: &str,
) -> Result<T, ForwardingTableError> {
    col.parse().map_err(|source| ForwardingTableError::InvalidInteger {
        path: path.to_string(),
        line,
        source,
    })
}
