//! Tollgate - DNS filtering for netfilter queues.
//!
//! The filter inspects queued DNS packets, drops requests matched by drop
//! rules, and drops later responses that resolve a blocked name. A small
//! authoritative responder answers from a static record table.

pub mod authority;
pub mod correlation;
pub mod dispatcher;
pub mod dns;
pub mod error;
pub mod filter;
pub mod packet;
pub mod service;
pub mod stats;
pub mod transport;

pub use dispatcher::{Dispatcher, Outcome, Verdict};
pub use error::{Error, Result};
