//! Packet sources for the filter and the responder.
//!
//! The filter reads queued packets from netfilter and hands back verdicts;
//! the responder serves DNS over a plain UDP socket.

pub mod nfqueue;
pub mod udp;

/// Largest DNS message the responder accepts over UDP (RFC 1035).
pub const MAX_DNS_PACKET_SIZE: usize = 512;
