//! Adaptive abuse filter: sliding-window rate limiting plus temporary bans.
//!
//! # Responsibilities
//! - Admit or reject each request by client identity
//! - Count error responses per client and ban repeat offenders
//! - Expire bans lazily on lookup and periodically via the sweep task
//!
//! # Client states
//! ```text
//! trusted  always admitted, never tracked
//! normal   activity tracked; request or error threshold → banned
//! banned   rejected until expiry; first lookup after expiry → normal (fresh record)
//! ```
//!
//! # Design Decisions
//! - One mutex guards both the activity and ban maps, so a transition
//!   (drop record + write ban) is never observed half done. Contention is
//!   a single short critical section per request.
//! - The trusted set is immutable after construction and read without locking
//! - Time comes from `tokio::time::Instant` so tests can pause the clock

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::AbuseFilterConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::security::headers::ClientId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbuseFilterError {
    #[error("abuse filter {0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Outcome of [`AbuseFilter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Trusted,
    Normal,
    Banned,
}

/// Point-in-time view of the filter's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    pub tracked_clients: usize,
    pub active_bans: usize,
}

#[derive(Debug, Clone, Copy)]
enum BanReason {
    RequestLimit,
    ErrorLimit,
}

impl BanReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::RequestLimit => "request_limit",
            Self::ErrorLimit => "error_limit",
        }
    }
}

#[derive(Debug, Default)]
struct ActivityRecord {
    requests: VecDeque<Instant>,
    errors: u32,
}

#[derive(Debug, Default)]
struct FilterState {
    activity: HashMap<ClientId, ActivityRecord>,
    bans: HashMap<ClientId, Instant>,
}

impl FilterState {
    /// True while `client` holds an unexpired ban. An expired ban is
    /// removed together with any activity left behind.
    fn is_banned(&mut self, client: &ClientId, now: Instant) -> bool {
        match self.bans.get(client) {
            Some(&expiry) if now < expiry => true,
            Some(_) => {
                self.bans.remove(client);
                self.activity.remove(client);
                false
            }
            None => false,
        }
    }

    fn ban(&mut self, client: &ClientId, until: Instant) {
        self.activity.remove(client);
        self.bans.insert(client.clone(), until);
    }
}

#[derive(Debug)]
pub struct AbuseFilter {
    trusted: HashSet<String>,
    request_limit: usize,
    error_limit: u32,
    window: Duration,
    ban_duration: Duration,
    cleanup_interval: Duration,
    state: Mutex<FilterState>,
}

impl AbuseFilter {
    pub fn new(config: &AbuseFilterConfig) -> Result<Self, AbuseFilterError> {
        if config.request_limit == 0 {
            return Err(AbuseFilterError::NotPositive("request_limit"));
        }
        if config.error_limit == 0 {
            return Err(AbuseFilterError::NotPositive("error_limit"));
        }
        if config.window_secs == 0 {
            return Err(AbuseFilterError::NotPositive("window_secs"));
        }
        if config.ban_secs == 0 {
            return Err(AbuseFilterError::NotPositive("ban_secs"));
        }
        if config.cleanup_interval_secs == 0 {
            return Err(AbuseFilterError::NotPositive("cleanup_interval_secs"));
        }

        Ok(Self {
            trusted: config.trusted_clients.iter().cloned().collect(),
            request_limit: config.request_limit as usize,
            error_limit: config.error_limit,
            window: config.window(),
            ban_duration: config.ban_duration(),
            cleanup_interval: config.cleanup_interval(),
            state: Mutex::new(FilterState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FilterState> {
        // Every critical section leaves the maps consistent, so a panic
        // elsewhere while holding the lock does not corrupt them.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_trusted(&self, client: &ClientId) -> bool {
        self.trusted.contains(client.as_str())
    }

    pub fn check(&self, client: &ClientId) -> Verdict {
        self.check_at(client, Instant::now())
    }

    /// Decide whether `client` may proceed at `now`.
    ///
    /// The request that reaches `request_limit` is still admitted; the ban
    /// it triggers applies from the next request on.
    pub fn check_at(&self, client: &ClientId, now: Instant) -> Verdict {
        if self.is_trusted(client) {
            tracing::debug!(client = %client, "Trusted client admitted");
            metrics::record_abuse_decision("trusted");
            return Verdict::Admit;
        }

        let tripped = {
            let mut state = self.lock();
            if state.is_banned(client, now) {
                drop(state);
                tracing::warn!(client = %client, "Request rejected: client is banned");
                metrics::record_abuse_decision("reject");
                return Verdict::Reject;
            }

            let record = state.activity.entry(client.clone()).or_default();
            if let Some(cutoff) = now.checked_sub(self.window) {
                while record.requests.front().is_some_and(|&t| t <= cutoff) {
                    record.requests.pop_front();
                }
            }
            record.requests.push_back(now);

            let count = record.requests.len();
            if count >= self.request_limit {
                state.ban(client, now + self.ban_duration);
                Some(count)
            } else {
                None
            }
        };

        if let Some(count) = tripped {
            self.log_ban(client, BanReason::RequestLimit, count);
        }
        tracing::debug!(client = %client, "Request admitted");
        metrics::record_abuse_decision("admit");
        Verdict::Admit
    }

    pub fn record_outcome(&self, client: &ClientId, status: StatusCode) {
        self.record_outcome_at(client, status, Instant::now());
    }

    /// Feed the status of an admitted request back into the filter.
    ///
    /// Only statuses >= 400 count. Outcomes for trusted or currently banned
    /// clients are ignored.
    pub fn record_outcome_at(&self, client: &ClientId, status: StatusCode, now: Instant) {
        if status.as_u16() < 400 || self.is_trusted(client) {
            return;
        }

        let tripped = {
            let mut state = self.lock();
            if state.is_banned(client, now) {
                return;
            }

            let record = state.activity.entry(client.clone()).or_default();
            record.errors += 1;
            let errors = record.errors;
            if errors >= self.error_limit {
                state.ban(client, now + self.ban_duration);
                Some(errors as usize)
            } else {
                None
            }
        };

        if let Some(errors) = tripped {
            self.log_ban(client, BanReason::ErrorLimit, errors);
        }
    }

    fn log_ban(&self, client: &ClientId, reason: BanReason, count: usize) {
        tracing::warn!(
            client = %client,
            reason = reason.as_str(),
            count,
            ban_secs = self.ban_duration.as_secs(),
            "Client banned"
        );
        metrics::record_ban(reason.as_str());
    }

    pub fn client_state(&self, client: &ClientId) -> ClientState {
        self.client_state_at(client, Instant::now())
    }

    pub fn client_state_at(&self, client: &ClientId, now: Instant) -> ClientState {
        if self.is_trusted(client) {
            return ClientState::Trusted;
        }
        match self.lock().bans.get(client) {
            Some(&expiry) if now < expiry => ClientState::Banned,
            _ => ClientState::Normal,
        }
    }

    pub fn stats(&self) -> FilterStats {
        let state = self.lock();
        FilterStats {
            tracked_clients: state.activity.len(),
            active_bans: state.bans.len(),
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop expired bans and error-free activity records idle for a full
    /// window. Records carrying errors survive, so the error count is never
    /// reset by the sweep. Returns the number of entries removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let cutoff = now.checked_sub(self.window);
        let mut state = self.lock();

        let bans_before = state.bans.len();
        state.bans.retain(|_, expiry| now < *expiry);
        let expired_bans = bans_before - state.bans.len();

        let records_before = state.activity.len();
        state.activity.retain(|_, record| {
            if record.errors > 0 {
                return true;
            }
            match (record.requests.back(), cutoff) {
                (Some(&newest), Some(cutoff)) => newest > cutoff,
                (Some(_), None) => true,
                (None, _) => false,
            }
        });
        let idle_records = records_before - state.activity.len();
        drop(state);

        if expired_bans + idle_records > 0 {
            tracing::debug!(expired_bans, idle_records, "Abuse filter sweep");
        }
        expired_bans + idle_records
    }

    /// Sweep every `cleanup_interval` until `shutdown` fires.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: Shutdown) {
        let period = self.cleanup_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        let stopped = shutdown.wait();
        tokio::pin!(stopped);

        tracing::info!(interval_secs = period.as_secs(), "Abuse filter sweep starting");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = &mut stopped => {
                    tracing::info!("Abuse filter sweep received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_sweeper(shutdown))
    }
}
