use super::backoff::{RetryDecision, RetryPolicy, RetryState};
use super::clock::Clock;
use super::cursor::CursorStore;
use super::format::MessageFormat;
use super::{is_shutdown, shutdown_requested, ShutdownRx};
use crate::error::{PersistenceError, RelayError, SinkError};
use crate::feed::types::{Cursor, Item, ItemId};
use crate::sink::Sink;
use std::sync::Arc;
use std::time::Duration;

/// Final result for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    /// Permanent failure, or transient failures past the retry budget.
    Skipped { attempts: u32, reason: String },
}

/// Reasons to stop a batch before every item has a final outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchHalt {
    Shutdown,
    Unauthorized(String),
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<ItemId>,
    pub skipped: Vec<(ItemId, String)>,
    /// Shutdown arrived before the batch was finished.
    pub interrupted: bool,
}

/// Delivers items to one sink strictly in order, one in flight, and moves
/// the route's cursor after each final outcome.
pub struct Dispatcher {
    sink: Box<dyn Sink>,
    store: Box<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    format: MessageFormat,
    request_timeout: Duration,
    cursor: Cursor,
}

impl Dispatcher {
    pub fn new(
        sink: Box<dyn Sink>,
        store: Box<dyn CursorStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        format: MessageFormat,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            store,
            clock,
            policy,
            format,
            request_timeout,
            cursor: Cursor::default(),
        }
    }

    /// Re-read the cursor from the store. Called at the start of each cycle.
    pub fn load_cursor(&mut self) -> Result<Cursor, PersistenceError> {
        let cursor = self.store.load()?;
        self.cursor = cursor.clone();
        Ok(cursor)
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn sink_name(&self) -> String {
        self.sink.name()
    }

    /// Deliver a single item, retrying transient failures with backoff.
    pub async fn deliver(
        &self,
        item: &Item,
        shutdown: &mut ShutdownRx,
    ) -> Result<DeliveryOutcome, DispatchHalt> {
        let text = self.format.render(item);
        let chars = text.chars().count();
        let limit = self.sink.max_message_chars();
        if chars > limit {
            return Ok(DeliveryOutcome::Skipped {
                attempts: 0,
                reason: format!("message is {} characters, sink limit is {}", chars, limit),
            });
        }

        let mut retry = RetryState::new(self.policy);
        loop {
            let attempt = retry.begin_attempt();
            let result = match tokio::time::timeout(self.request_timeout, self.sink.post_message(&text)).await {
                Ok(r) => r,
                Err(_) => Err(SinkError::transient(format!(
                    "post timed out after {}ms",
                    self.request_timeout.as_millis()
                ))),
            };

            let (reason, hint) = match result {
                Ok(()) => return Ok(DeliveryOutcome::Delivered { attempts: attempt }),
                Err(SinkError::Permanent(reason)) => {
                    return Ok(DeliveryOutcome::Skipped { attempts: attempt, reason })
                }
                Err(SinkError::Unauthorized(reason)) => return Err(DispatchHalt::Unauthorized(reason)),
                Err(SinkError::Transient { reason, retry_after }) => (reason, retry_after),
            };

            match retry.record_failure(self.clock.now(), hint) {
                RetryDecision::GiveUp => {
                    let err = RelayError::TransientSink(reason);
                    return Ok(DeliveryOutcome::Skipped {
                        attempts: attempt,
                        reason: format!("gave up after {} attempts: {}", attempt, err),
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        item_id = %item.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "delivery failed, retrying"
                    );
                    if is_shutdown(shutdown) {
                        return Err(DispatchHalt::Shutdown);
                    }
                    let wait = retry.time_until_ready(self.clock.now());
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(shutdown) => return Err(DispatchHalt::Shutdown),
                        _ = self.clock.sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Deliver a sequenced batch. Stops early on shutdown (cursor stays at
    /// the last final outcome) or on rejected credentials (cursor untouched).
    pub async fn dispatch(
        &mut self,
        items: Vec<Item>,
        shutdown: &mut ShutdownRx,
    ) -> Result<DispatchReport, RelayError> {
        let mut report = DispatchReport::default();

        for item in items {
            if is_shutdown(shutdown) {
                report.interrupted = true;
                break;
            }

            match self.deliver(&item, shutdown).await {
                Ok(DeliveryOutcome::Delivered { attempts }) => {
                    self.advance(&item)?;
                    tracing::info!(item_id = %item.id, author = %item.author, attempts, "item delivered");
                    report.delivered.push(item.id);
                }
                Ok(DeliveryOutcome::Skipped { attempts, reason }) => {
                    // Advance anyway: a poison item must not block the route.
                    self.advance(&item)?;
                    let err = RelayError::PermanentDelivery {
                        item_id: item.id.to_string(),
                        reason: reason.clone(),
                    };
                    tracing::error!(sink = %self.sink.name(), attempts, error = %err, "item skipped");
                    report.skipped.push((item.id, reason));
                }
                Err(DispatchHalt::Shutdown) => {
                    report.interrupted = true;
                    break;
                }
                Err(DispatchHalt::Unauthorized(reason)) => {
                    return Err(RelayError::Unauthorized(reason));
                }
            }
        }

        Ok(report)
    }

    /// Move the cursor to `item`. Never moves it backwards.
    fn advance(&mut self, item: &Item) -> Result<(), PersistenceError> {
        let next = Cursor::at(item);
        if next <= self.cursor {
            tracing::warn!(item_id = %item.id, "item is not after the cursor, cursor left unchanged");
            return Ok(());
        }
        self.store.save(&next)?;
        self.cursor = next;
        Ok(())
    }
}
