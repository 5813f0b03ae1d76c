use super::backoff::{RetryDecision, RetryPolicy, RetryState};
use super::clock::Clock;
use super::dispatcher::{DispatchReport, Dispatcher};
use super::sequencer::sequence;
use super::{is_shutdown, shutdown_requested, ShutdownRx};
use crate::error::{RelayError, SourceError};
use crate::feed::types::{Cursor, Item};
use crate::feed::ItemSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timer plus single-flight guard. Pure: the caller supplies `now`.
#[derive(Debug, Clone)]
pub struct Schedule {
    interval: Duration,
    next_due: Option<Instant>,
    in_flight: bool,
}

/// Proof that a cycle was started; hand it back to `Schedule::finish`.
#[derive(Debug)]
pub struct CycleTicket {
    started_at: Instant,
}

impl Schedule {
    /// The first cycle is due immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
            in_flight: false,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.in_flight && self.next_due.map_or(true, |due| now >= due)
    }

    pub fn try_begin(&mut self, now: Instant) -> Option<CycleTicket> {
        if !self.is_due(now) {
            return None;
        }
        self.in_flight = true;
        Some(CycleTicket { started_at: now })
    }

    /// Next run is one interval after the cycle started, or right away if
    /// the cycle overran the interval.
    pub fn finish(&mut self, ticket: CycleTicket, now: Instant) {
        self.in_flight = false;
        self.next_due = Some((ticket.started_at + self.interval).max(now));
    }

    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due
            .map(|due| due.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

/// One source feeding one sink, with its own cursor.
pub struct Route {
    pub key: String,
    pub source: Box<dyn ItemSource>,
    pub dispatcher: Dispatcher,
}

#[derive(Debug)]
pub struct RouteReport {
    pub key: String,
    pub fetched: usize,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub routes: Vec<RouteReport>,
    /// Routes that failed this cycle and will be retried next cycle.
    pub failed: Vec<(String, String)>,
    pub interrupted: bool,
}

impl CycleReport {
    pub fn delivered(&self) -> usize {
        self.routes.iter().map(|r| r.dispatch.delivered.len()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.routes.iter().map(|r| r.dispatch.skipped.len()).sum()
    }
}

pub struct Poller {
    routes: Vec<Route>,
    schedule: Schedule,
    clock: Arc<dyn Clock>,
    source_policy: RetryPolicy,
    request_timeout: Duration,
}

impl Poller {
    pub fn new(
        routes: Vec<Route>,
        interval: Duration,
        clock: Arc<dyn Clock>,
        source_policy: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            routes,
            schedule: Schedule::new(interval),
            clock,
            source_policy,
            request_timeout,
        }
    }

    /// Poll until shutdown. Returns early only on a fatal error.
    pub async fn run(&mut self, mut shutdown: ShutdownRx) -> Result<(), RelayError> {
        tracing::info!(routes = self.routes.len(), "poller started");
        loop {
            if is_shutdown(&shutdown) {
                break;
            }

            let now = self.clock.now();
            let ticket = match self.schedule.try_begin(now) {
                Some(ticket) => ticket,
                None => {
                    let wait = self.schedule.time_until_due(now);
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = self.clock.sleep(wait) => {}
                    }
                    continue;
                }
            };

            let result = self.run_cycle(&mut shutdown).await;
            self.schedule.finish(ticket, self.clock.now());

            match result {
                Ok(report) => {
                    tracing::info!(
                        delivered = report.delivered(),
                        skipped = report.skipped(),
                        failed_routes = report.failed.len(),
                        "cycle finished"
                    );
                    if report.interrupted {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "cycle aborted, stopping poller");
                    return Err(e);
                }
            }
        }
        tracing::info!("poller stopped");
        Ok(())
    }

    /// One pass over every route: load cursor, fetch, sequence, dispatch.
    /// Only fatal errors are returned; anything else is recorded per route.
    pub async fn run_cycle(&mut self, shutdown: &mut ShutdownRx) -> Result<CycleReport, RelayError> {
        let mut report = CycleReport::default();
        let clock = self.clock.clone();
        let policy = self.source_policy;
        let timeout = self.request_timeout;

        for route in &mut self.routes {
            if is_shutdown(shutdown) {
                report.interrupted = true;
                break;
            }

            let cursor = route.dispatcher.load_cursor()?;
            let batch = match fetch(route.source.as_mut(), &cursor, clock.as_ref(), policy, timeout, shutdown).await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    report.interrupted = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(route = %route.key, source = %route.source.name(), error = %e, "fetch failed");
                    report.failed.push((route.key.clone(), e.to_string()));
                    continue;
                }
            };

            let fetched = batch.len();
            let items = sequence(batch, &cursor);
            tracing::debug!(route = %route.key, fetched, new = items.len(), "batch sequenced");

            match route.dispatcher.dispatch(items, shutdown).await {
                Ok(dispatch) => {
                    let interrupted = dispatch.interrupted;
                    report.routes.push(RouteReport {
                        key: route.key.clone(),
                        fetched,
                        dispatch,
                    });
                    if interrupted {
                        report.interrupted = true;
                        break;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(route = %route.key, sink = %route.dispatcher.sink_name(), error = %e, "dispatch halted");
                    report.failed.push((route.key.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

/// Fetch with bounded retries. `Ok(None)` means shutdown was requested
/// while backing off.
async fn fetch(
    source: &mut dyn ItemSource,
    cursor: &Cursor,
    clock: &dyn Clock,
    policy: RetryPolicy,
    timeout: Duration,
    shutdown: &mut ShutdownRx,
) -> Result<Option<Vec<Item>>, RelayError> {
    let mut retry = RetryState::new(policy);
    loop {
        let attempt = retry.begin_attempt();
        let result = match tokio::time::timeout(timeout, source.list_items(cursor)).await {
            Ok(r) => r,
            Err(_) => Err(SourceError::transient(format!(
                "fetch timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        let (reason, hint) = match result {
            Ok(items) => return Ok(Some(items)),
            Err(SourceError::Permanent(reason)) => return Err(RelayError::Source(reason)),
            Err(SourceError::Transient { reason, retry_after }) => (reason, retry_after),
        };

        match retry.record_failure(clock.now(), hint) {
            RetryDecision::GiveUp => return Err(RelayError::TransientSource(reason)),
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    source = %source.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "fetch failed, retrying"
                );
                let wait = retry.time_until_ready(clock.now());
                tokio::select! {
                    biased;
                    _ = shutdown_requested(shutdown) => return Ok(None),
                    _ = clock.sleep(wait) => {}
                }
            }
        }
    }
}
