//! `RequestValve`: per-endpoint admission control and adaptive log-range
//! learning. One valve belongs to exactly one [`crate::safe_node::SafeNode`].

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::config::EthEndpoint;
use crate::error::ErrorKind;
use crate::types::{DataSize, LogSegment, NodeResponse, Timespan, Timestamp, UInt, UInt64};

const SAFE_BLOCK_FRESHNESS: Timespan = Timespan::from_secs(6);
const UPWARD_LOCK_DURATION: Timespan = Timespan::from_secs(60);
const INITIAL_LOG_RANGE: u64 = 10;

#[derive(Debug, Default)]
struct ValveState {
    tokens: u64,
    refilled_at: Option<Timestamp>,
    lock_until: Option<Timestamp>,
    lock_cause: Option<ErrorKind>,
    latest_block: Option<UInt64>,
    latest_block_at: Option<Timestamp>,
    log_range: u64,
    upward_lock_until: Option<Timestamp>,
}

#[derive(Debug)]
pub struct RequestValve {
    endpoint: EthEndpoint,
    clock: Arc<dyn Clock>,
    state: Mutex<ValveState>,
}

impl RequestValve {
    pub fn new(endpoint: EthEndpoint, clock: Arc<dyn Clock>) -> Self {
        let tokens = endpoint.quota.batch_limit.get();
        Self {
            endpoint,
            clock,
            state: Mutex::new(ValveState {
                tokens,
                refilled_at: None,
                lock_until: None,
                lock_cause: None,
                latest_block: None,
                latest_block_at: None,
                log_range: INITIAL_LOG_RANGE,
                upward_lock_until: None,
            }),
        }
    }

    fn refill(&self, state: &mut ValveState, now: Timestamp) {
        let due = match state.refilled_at {
            None => true,
            Some(at) => now.as_millis() >= at.saturating_add(self.endpoint.quota.batch_timespan).as_millis(),
        };
        if due {
            state.tokens = self.endpoint.quota.batch_limit.get();
            state.refilled_at = Some(now);
        }
    }

    /// Admits a request of `quantity` tokens, optionally gated on
    /// `block` staying within the safe range.
    pub async fn open(&self, quantity: UInt, block: Option<UInt64>) -> Result<(), ErrorKind> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if let Some(until) = state.lock_until {
            if until > now {
                return Err(state
                    .lock_cause
                    .clone()
                    .unwrap_or(ErrorKind::Overloading { explicit: false }));
            }
        }

        if let Some(target) = block {
            if let (Some(latest_at), Some(latest)) = (state.latest_block_at, state.latest_block) {
                let fresh = now.as_millis() < latest_at.saturating_add(SAFE_BLOCK_FRESHNESS).as_millis();
                if fresh {
                    let safe = safe_block_from(latest, self.endpoint.log_safe_gap);
                    if let Some(safe) = safe {
                        if target > safe {
                            return Err(ErrorKind::UnsafeBlock);
                        }
                    } else {
                        return Err(ErrorKind::UnsafeBlock);
                    }
                }
            }
        }

        self.refill(&mut state, now);
        if state.tokens < quantity.get() {
            return Err(ErrorKind::RequestQuota);
        }
        state.tokens -= quantity.get();
        Ok(())
    }

    pub async fn give_back_quota(&self, quantity: UInt) {
        let mut state = self.state.lock().await;
        let cap = self.endpoint.quota.batch_limit.get();
        state.tokens = (state.tokens + quantity.get()).min(cap);
    }

    /// Records the outcome of a failed call. Locks the endpoint for
    /// recognized failure kinds; a lock already in effect keeps its
    /// original deadline.
    pub async fn report_error(&self, err: &ErrorKind) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if let Some(duration_ms) = err.lock_duration_ms() {
            if state.lock_until.map(|u| u <= now).unwrap_or(true) {
                state.lock_until = Some(now.saturating_add(Timespan::from_millis(duration_ms)));
                state.lock_cause = Some(err.clone());
            }
        }
        if matches!(err, ErrorKind::Overloading { .. }) {
            drop(state);
            self.down_log_range().await;
        }
    }

    pub async fn set_latest_block(&self, latest: UInt64) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.latest_block = Some(latest);
        state.latest_block_at = Some(now);
    }

    pub async fn safe_block_number(&self) -> Option<UInt64> {
        let state = self.state.lock().await;
        let latest = state.latest_block?;
        safe_block_from(latest, self.endpoint.log_safe_gap)
    }

    /// Re-estimates the log range from the size/time/count borders
    /// observed on a completed `eth_getLogs` call, never increasing the
    /// range while an upward-lock from a recent halving is armed.
    pub async fn update_log_range(&self, response: &NodeResponse<LogSegment>) {
        let now = self.clock.now();
        let segment = &response.data;
        let span = segment
            .to_block
            .get()
            .saturating_sub(segment.from_block.get())
            .saturating_add(1)
            .max(1);
        let size_per_block = (response.size.as_bytes() / span).max(1);
        let time_per_block = (response.elapsed.as_millis() / span).max(1);
        let count_per_block = ((segment.logs.len() as u64) / span).max(1);

        let range_by_size = (self.endpoint.log_size_border.as_bytes() / size_per_block).max(1);
        let range_by_time = (self.endpoint.log_time_border.as_millis() / time_per_block).max(1);
        let range_by_count = (self.endpoint.log_quantity_border.get() / count_per_block).max(1);
        let new_range = range_by_size
            .min(range_by_time)
            .min(range_by_count)
            .min(self.endpoint.log_range_boundary.get());

        let mut state = self.state.lock().await;
        if new_range > state.log_range {
            if let Some(until) = state.upward_lock_until {
                if until > now {
                    return;
                }
            }
        }
        state.log_range = new_range.max(1);
    }

    pub async fn down_log_range(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.log_range = (state.log_range / 2).max(1);
        state.upward_lock_until = Some(now.saturating_add(UPWARD_LOCK_DURATION));
    }

    pub async fn log_range(&self) -> UInt64 {
        let state = self.state.lock().await;
        UInt64::new(state.log_range).unwrap_or(UInt64::new(1).unwrap())
    }

    pub fn endpoint(&self) -> &EthEndpoint {
        &self.endpoint
    }
}

fn safe_block_from(latest: UInt64, log_safe_gap: UInt64) -> Option<UInt64> {
    if latest.get() >= log_safe_gap.get() {
        Some(UInt64::new(latest.get() - log_safe_gap.get()).unwrap())
    } else {
        None
    }
}
