//! Authoritative answers from a static record table.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::dns::{self, DnsQuery};

/// Static name to IPv4 address mapping. Names are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    records: FxHashMap<String, Ipv4Addr>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table served when no records file is given.
    pub fn defaults() -> Self {
        [
            ("google.com", Ipv4Addr::new(8, 8, 8, 8)),
            ("ya.ru", Ipv4Addr::new(87, 250, 250, 242)),
            ("malicious.com", Ipv4Addr::new(1, 2, 3, 4)),
            ("ads.com", Ipv4Addr::new(5, 6, 7, 8)),
            ("tracker.com", Ipv4Addr::new(9, 10, 11, 12)),
            ("good-site.com", Ipv4Addr::new(192, 168, 30, 10)),
        ]
        .into_iter()
        .map(|(name, ip)| (name.to_string(), ip))
        .collect()
    }

    /// Load `<name> <ipv4>` lines from `path`.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Parse `<name> <ipv4>` lines; `#` comments and blank lines are ignored,
    /// malformed lines are skipped.
    pub fn parse(contents: &str) -> Self {
        contents
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let mut parts = line.split_whitespace();
                let record = match (parts.next(), parts.next(), parts.next()) {
                    (Some(name), Some(ip), None) => ip.parse().ok().map(|ip| (name.to_string(), ip)),
                    _ => None,
                };
                if record.is_none() {
                    warn!(line = idx + 1, "skipping malformed record");
                }
                record
            })
            .collect()
    }

    pub fn insert(&mut self, name: &str, ip: Ipv4Addr) {
        self.records.insert(normalize(name), ip);
    }

    pub fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        self.records.get(&normalize(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(String, Ipv4Addr)> for RecordTable {
    fn from_iter<I: IntoIterator<Item = (String, Ipv4Addr)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (name, ip) in iter {
            table.insert(&name, ip);
        }
        table
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Build the response to `query`, parsed from `message`.
///
/// Known names get a single A record, anything else NXDOMAIN. The question
/// is echoed verbatim.
pub fn answer(query: &DnsQuery, message: &[u8], table: &RecordTable) -> Vec<u8> {
    let question = query.question_bytes(message);
    match table.lookup(&query.name) {
        Some(ip) => {
            debug!(domain = %query.name, %ip, "answering");
            dns::encode_response(query.id, question, ip)
        }
        None => {
            debug!(domain = %query.name, "not found");
            dns::encode_nxdomain(query.id, question)
        }
    }
}

/// Decode a received datagram and build the reply, if it deserves one.
///
/// Undecodable messages, responses and queries for the root name get no
/// reply.
pub fn handle_datagram(message: &[u8], table: &RecordTable) -> Option<Vec<u8>> {
    let query = match DnsQuery::parse(message) {
        Ok(query) => query,
        Err(e) => {
            debug!(error = %e, "dropping undecodable query");
            return None;
        }
    };
    if query.is_response() {
        return None;
    }
    if query.name.is_empty() {
        debug!("ignoring query for the root name");
        return None;
    }
    Some(answer(&query, message, table))
}
