//! Per-packet verdicts.
//!
//! Handles the decision pipeline for one queued packet:
//! 1. Classify (IP/UDP headers, DNS port, QR bit)
//! 2. Requests: decode, deduplicate, evaluate rules, remember blocked names
//! 3. Responses: drop if any answer names a domain blocked at request time
//!
//! The queue transport handles the I/O, the dispatcher only decides.
//! Anything that cannot be inspected is accepted.

use tracing::{debug, info};

use crate::correlation::{CorrelationStore, RequestKey};
use crate::dns::{self, DecodeError, DnsQuery};
use crate::filter::{Action, Request, RuleSet};
use crate::packet::{DNS_PORT, Datagram};
use crate::stats::{Stats, StatsSnapshot};

/// Decision handed back to the packet queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
}

/// Why a packet got its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not DNS over UDP port 53, or too short to carry a DNS header.
    PassThrough,
    /// DNS traffic whose message could not be decoded.
    Undecodable(DecodeError),
    /// A request already adjudicated within the dedup window.
    Duplicate,
    /// A request matched by a pass rule.
    Allowed,
    /// A request no rule applied to.
    Unmatched,
    /// A request matched by a drop rule.
    Blocked,
    ResponseAccepted,
    /// A response resolving a name blocked at request time.
    ResponseBlocked,
}

impl Outcome {
    pub fn verdict(self) -> Verdict {
        match self {
            Outcome::Blocked | Outcome::ResponseBlocked => Verdict::Drop,
            _ => Verdict::Accept,
        }
    }
}

/// Filter state and the per-packet entry point.
///
/// Owns the rules and the correlation store; every mutation goes through
/// `&mut self`, so a dispatcher has exactly one writer.
pub struct Dispatcher {
    rules: RuleSet,
    store: CorrelationStore,
    stats: Stats,
}

impl Dispatcher {
    pub fn new(rules: RuleSet, store: CorrelationStore) -> Self {
        Self {
            rules,
            store,
            stats: Stats::new(),
        }
    }

    /// Decide the fate of one raw IP packet.
    pub fn process(&mut self, packet: &[u8]) -> Verdict {
        self.inspect(packet).verdict()
    }

    /// Like [`process`](Self::process), but reports why.
    pub fn inspect(&mut self, packet: &[u8]) -> Outcome {
        let outcome = match Datagram::parse(packet) {
            Some(datagram) => self.classify(&datagram),
            None => Outcome::PassThrough,
        };
        self.stats.record(&outcome);
        outcome
    }

    fn classify(&mut self, datagram: &Datagram<'_>) -> Outcome {
        let Some(flags) = dns::peek_flags(datagram.payload) else {
            return Outcome::PassThrough;
        };

        if !dns::is_response_flags(flags) && datagram.destination_port == DNS_PORT {
            self.process_request(datagram)
        } else if dns::is_response_flags(flags) && datagram.source_port == DNS_PORT {
            self.process_response(datagram)
        } else {
            Outcome::PassThrough
        }
    }

    fn process_request(&mut self, datagram: &Datagram<'_>) -> Outcome {
        let query = match DnsQuery::parse(datagram.payload) {
            Ok(query) => query,
            Err(e) => {
                debug!(error = %e, source = %datagram.source, "undecodable DNS request, accepting");
                return Outcome::Undecodable(e);
            }
        };

        let key = RequestKey::new(datagram.source, &query.name, query.qtype);
        if self.store.is_duplicate_and_record(key) {
            debug!(domain = %query.name, source = %datagram.source, "repeated request, accepting");
            return Outcome::Duplicate;
        }

        let request = Request {
            query: &query,
            source: datagram.source,
            destination: datagram.destination,
        };
        let qtype = dns::type_description(query.qtype);

        match self.rules.first_match(&request) {
            Some(rule) if rule.action() == Action::Drop => {
                self.store.record_blocked(&query.name);
                info!(domain = %query.name, %qtype, source = %datagram.source, %rule, "blocked request");
                Outcome::Blocked
            }
            Some(rule) => {
                debug!(domain = %query.name, %qtype, source = %datagram.source, %rule, "allowed request");
                Outcome::Allowed
            }
            None => {
                debug!(domain = %query.name, %qtype, source = %datagram.source, "no rule matched, accepting");
                Outcome::Unmatched
            }
        }
    }

    fn process_response(&mut self, datagram: &Datagram<'_>) -> Outcome {
        let payload = datagram.payload;
        let answers_start = match dns::answers_start(payload) {
            Ok(offset) => offset,
            Err(e) => {
                debug!(error = %e, source = %datagram.source, "undecodable DNS response, accepting");
                return Outcome::Undecodable(e);
            }
        };

        let blocked = dns::decode_answers(payload, answers_start)
            .find(|answer| self.store.is_blocked(&answer.name));

        match blocked {
            Some(answer) => {
                info!(domain = %answer.name, destination = %datagram.destination, "blocked response");
                Outcome::ResponseBlocked
            }
            None => {
                debug!(destination = %datagram.destination, "accepted response");
                Outcome::ResponseAccepted
            }
        }
    }

    /// Whether responses naming `name` are currently being dropped.
    pub fn is_blocked(&self, name: &str) -> bool {
        self.store.is_blocked(name)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn store(&self) -> &CorrelationStore {
        &self.store
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}
