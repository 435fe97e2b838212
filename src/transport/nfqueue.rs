//! Netfilter queue transport for the filter.
//!
//! Packets are read one at a time; each gets exactly one verdict before the
//! next is read. Payloads are never modified.

use std::thread;
use std::time::{Duration, Instant};

use nfq::Queue;
use tracing::{info, warn};

use crate::dispatcher::{Dispatcher, Verdict};
use crate::error::{Error, Result};

impl From<Verdict> for nfq::Verdict {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Accept => nfq::Verdict::Accept,
            Verdict::Drop => nfq::Verdict::Drop,
        }
    }
}

/// Consecutive receive failures tolerated before the loop gives up.
const MAX_RECV_FAILURES: u32 = 50;
const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Delay schedule for repeated receive failures.
///
/// Doubles from `RECV_BACKOFF_MIN` up to `RECV_BACKOFF_MAX`; any successful
/// receive starts over.
#[derive(Debug, Default)]
struct RecvBackoff {
    failures: u32,
}

impl RecvBackoff {
    /// Register a failure. `None` once the failure budget is spent.
    fn on_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= MAX_RECV_FAILURES {
            return None;
        }
        let delay = RECV_BACKOFF_MIN.saturating_mul(1 << (self.failures - 1).min(16));
        Some(delay.min(RECV_BACKOFF_MAX))
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// A bound netfilter queue.
pub struct QueueTransport {
    queue: Queue,
    queue_num: u16,
}

impl QueueTransport {
    /// Open a netlink socket and bind it to `queue_num`.
    ///
    /// The queue is put in fail-open mode so the kernel accepts packets
    /// instead of dropping them when the queue overflows.
    pub fn bind(queue_num: u16) -> Result<Self> {
        let queue_err = |source| Error::Queue { queue_num, source };

        let mut queue = Queue::open().map_err(queue_err)?;
        queue.bind(queue_num).map_err(queue_err)?;
        queue.set_fail_open(queue_num, true).map_err(queue_err)?;

        Ok(Self { queue, queue_num })
    }

    /// Run the verdict loop forever.
    ///
    /// Verdict errors are logged and the loop continues. Receive errors
    /// back off exponentially; a long run of them ends the loop with
    /// [`Error::Queue`]. Statistics are logged every `stats_interval`.
    pub fn run(mut self, dispatcher: &mut Dispatcher, stats_interval: Duration) -> Result<()> {
        info!(queue = self.queue_num, "filter running");
        let mut last_report = Instant::now();
        let mut backoff = RecvBackoff::default();

        loop {
            let mut msg = match self.queue.recv() {
                Ok(msg) => {
                    backoff.reset();
                    msg
                }
                Err(e) => match backoff.on_failure() {
                    Some(delay) => {
                        warn!(error = %e, retry_ms = delay.as_millis() as u64, "queue recv error");
                        thread::sleep(delay);
                        continue;
                    }
                    None => {
                        return Err(Error::Queue {
                            queue_num: self.queue_num,
                            source: e,
                        });
                    }
                },
            };

            let verdict = dispatcher.process(msg.get_payload());
            msg.set_verdict(verdict.into());

            if let Err(e) = self.queue.verdict(msg) {
                warn!(error = %e, "queue verdict error");
            }

            if last_report.elapsed() >= stats_interval {
                report(dispatcher, last_report.elapsed());
                last_report = Instant::now();
            }
        }
    }
}

fn report(dispatcher: &Dispatcher, elapsed: Duration) {
    let stats = dispatcher.stats_snapshot_and_reset();
    let store = dispatcher.store();
    info!(
        window_secs = elapsed.as_secs(),
        packets = stats.packets,
        dropped = stats.dropped(),
        passthrough = stats.passthrough,
        undecodable = stats.undecodable,
        duplicates = stats.duplicates,
        allowed = stats.requests_allowed,
        unmatched = stats.requests_unmatched,
        blocked_requests = stats.requests_blocked,
        accepted_responses = stats.responses_accepted,
        blocked_responses = stats.responses_blocked,
        dedup_entries = store.seen_len(),
        blocked_names = store.blocked_len(),
        "stats"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut backoff = RecvBackoff::default();

        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(20)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(40)));
        for _ in 3..10 {
            backoff.on_failure();
        }
        assert_eq!(backoff.on_failure(), Some(RECV_BACKOFF_MAX));
    }

    #[test]
    fn backoff_gives_up_after_repeated_failures() {
        let mut backoff = RecvBackoff::default();

        for _ in 1..MAX_RECV_FAILURES {
            assert!(backoff.on_failure().is_some());
        }
        assert_eq!(backoff.on_failure(), None);
    }

    #[test]
    fn success_resets_backoff() {
        let mut backoff = RecvBackoff::default();
        for _ in 0..5 {
            backoff.on_failure();
        }

        backoff.reset();

        assert_eq!(backoff.on_failure(), Some(RECV_BACKOFF_MIN));
    }

    #[test]
    fn verdicts_map_onto_queue_verdicts() {
        assert!(matches!(nfq::Verdict::from(Verdict::Accept), nfq::Verdict::Accept));
        assert!(matches!(nfq::Verdict::from(Verdict::Drop), nfq::Verdict::Drop));
    }
}
