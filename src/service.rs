//! Service orchestration.
//!
//! Builds the filter and the responder from their configuration and runs
//! them on their transports.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use tracing::{info, warn};

use crate::authority::RecordTable;
use crate::correlation::CorrelationStore;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::filter::loader;
use crate::transport::nfqueue::QueueTransport;
use crate::transport::udp::UdpTransport;

/// Configuration for the packet filter.
pub struct FilterConfig {
    /// Netfilter queue number to bind.
    pub queue_num: u16,
    /// Rules file; the built-in rules are used if it cannot be read.
    pub rules_path: PathBuf,
    /// Number of recent requests remembered for deduplication.
    pub dedup_capacity: usize,
    /// Number of blocked names remembered for response filtering.
    pub blocked_capacity: usize,
    /// How often to log statistics.
    pub stats_interval: Duration,
}

/// Build the dispatcher described by `config`.
pub fn build_dispatcher(config: &FilterConfig) -> Dispatcher {
    let rules = loader::load(&config.rules_path);
    let store = CorrelationStore::with_capacities(config.dedup_capacity, config.blocked_capacity);
    Dispatcher::new(rules, store)
}

/// Run the packet filter. Blocks the calling thread.
pub fn run_filter(config: FilterConfig) -> Result<()> {
    let mut dispatcher = build_dispatcher(&config);
    info!(
        rules = dispatcher.rules().len(),
        queue = config.queue_num,
        rules_path = %config.rules_path.display(),
        "DNS filter starting"
    );
    for rule in dispatcher.rules().iter() {
        info!(%rule, "rule");
    }

    let transport = QueueTransport::bind(config.queue_num)?;
    transport.run(&mut dispatcher, config.stats_interval)
}

/// Configuration for the authoritative responder.
pub struct ServerConfig {
    /// Local address to bind (e.g., 0.0.0.0:53)
    pub bind_addr: SocketAddr,
    /// Records file; the built-in table is used when absent or unreadable.
    pub records_path: Option<PathBuf>,
}

/// Load the record table described by `config`.
pub fn load_records(config: &ServerConfig) -> RecordTable {
    let Some(path) = &config.records_path else {
        return RecordTable::defaults();
    };
    match RecordTable::load(path) {
        Ok(table) => table,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "records file unreadable, using defaults");
            RecordTable::defaults()
        }
    }
}

/// Run the responder until interrupted.
///
/// Must be called inside a `LocalSet`.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let table = Rc::new(load_records(&config));
    let udp = UdpTransport::bind(config.bind_addr).await?;

    info!(
        addr = %udp.local_addr()?,
        records = table.len(),
        "DNS responder listening"
    );

    let task = udp.start(table);
    tokio::signal::ctrl_c().await?;
    task.abort();
    info!("DNS responder stopped");

    Ok(())
}
