use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::clock::Clock;

// Bucket shared by every request we could not attribute to a client
pub const UNKNOWN_CLIENT: &str = "unknown";

const MS_PER_HOUR: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * MS_PER_HOUR;

// limits applied by the admission controller, fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    pub max_requests_per_window: u32,
    pub window_ms: u64,
    pub daily_spend_cap: f64,
    pub estimated_cost_per_query: f64,
    // length of the global spend window
    pub spend_window_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 20,
            window_ms: DAY_MS,
            daily_spend_cap: 50.0,
            estimated_cost_per_query: 0.15,
            spend_window_ms: DAY_MS,
        }
    }
}

// Rolling window for one client key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientWindow {
    pub count: u32,
    pub window_end: u64,
}

impl ClientWindow {
    fn open(now: u64, window_ms: u64) -> Self {
        Self {
            count: 0,
            window_end: now.saturating_add(window_ms),
        }
    }

    fn is_expired(&self, now: u64) -> bool {
        now >= self.window_end
    }
}

// Process-wide spend. Kept as a query count so the total is always an exact
// multiple of the per-query estimate.
#[derive(Debug)]
struct GlobalSpend {
    recorded_queries: u64,
    window_end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    GlobalCapReached,
    PerClientLimitReached { resets_in_hours: u64 },
}

// outcome of a check; denials are plain values the caller reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Denied { kind: DenialKind, reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn remaining(&self) -> u32 {
        match self {
            Decision::Allowed { remaining } => *remaining,
            Decision::Denied { .. } => 0,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { reason, .. } => Some(reason),
        }
    }

    pub fn denial_kind(&self) -> Option<DenialKind> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { kind, .. } => Some(*kind),
        }
    }
}

// Per-client request windows plus one global spend accumulator. State is
// per instance only, and expired state is rolled over lazily at the start
// of each operation rather than by a timer.
pub struct AdmissionController {
    config: AdmissionConfig,
    clock: Arc<dyn Clock>,
    windows: DashMap<String, ClientWindow>,
    spend: Mutex<GlobalSpend>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        let spend = GlobalSpend {
            recorded_queries: 0,
            window_end: now.saturating_add(config.spend_window_ms),
        };
        Self {
            config,
            clock,
            windows: DashMap::new(),
            spend: Mutex::new(spend),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    // every admitted call consumes quota, this is a debit and not a query
    pub fn check(&self, client_key: Option<&str>) -> Decision {
        let now = self.clock.now_ms();

        {
            let mut spend = self.lock_spend();
            self.roll_over(&mut spend, now);
            if self.total_of(&spend) >= self.config.daily_spend_cap {
                return Decision::Denied {
                    kind: DenialKind::GlobalCapReached,
                    reason: "The service has reached its daily usage limit. Please try again tomorrow."
                        .to_string(),
                };
            }
        }

        let key = normalize_key(client_key);
        let max = self.config.max_requests_per_window;

        // entry guard holds the shard lock for the whole read-modify-write
        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| ClientWindow::open(now, 0));

        if window.is_expired(now) {
            *window = ClientWindow::open(now, self.config.window_ms);
        }

        if window.count >= max {
            let resets_in_hours = (window.window_end - now).div_ceil(MS_PER_HOUR);
            return Decision::Denied {
                kind: DenialKind::PerClientLimitReached { resets_in_hours },
                reason: format!(
                    "You've reached the limit of {} questions per window. This resets in {} hours.",
                    max, resets_in_hours
                ),
            };
        }

        window.count += 1;
        Decision::Allowed {
            remaining: max - window.count,
        }
    }

    // once per successful upstream call, never for a failed one
    pub fn record_spend(&self) {
        let now = self.clock.now_ms();
        let mut spend = self.lock_spend();
        self.roll_over(&mut spend, now);
        spend.recorded_queries += 1;
        debug!(
            total = self.total_of(&spend),
            cap = self.config.daily_spend_cap,
            "recorded spend"
        );
    }

    pub fn total_spend(&self) -> f64 {
        let now = self.clock.now_ms();
        let mut spend = self.lock_spend();
        self.roll_over(&mut spend, now);
        self.total_of(&spend)
    }

    // number of client windows currently held in memory
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    #[cfg(test)]
    fn window_for(&self, key: &str) -> Option<ClientWindow> {
        self.windows.get(key).map(|w| *w)
    }

    fn total_of(&self, spend: &GlobalSpend) -> f64 {
        spend.recorded_queries as f64 * self.config.estimated_cost_per_query
    }

    fn roll_over(&self, spend: &mut GlobalSpend, now: u64) {
        if now < spend.window_end {
            return;
        }
        debug!(previous_total = self.total_of(spend), "spend window rolled over");
        spend.recorded_queries = 0;
        spend.window_end = now.saturating_add(self.config.spend_window_ms);

        // expired windows behave exactly like missing ones, so dropping them
        // here bounds the map without changing any decision
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now));
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            info!(evicted, "evicted expired client windows");
        }
    }

    fn lock_spend(&self) -> MutexGuard<'_, GlobalSpend> {
        // the guarded data is two integers, a panic cannot leave it torn
        self.spend.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn normalize_key(client_key: Option<&str>) -> &str {
    match client_key.map(str::trim) {
        Some(key) if !key.is_empty() => key,
        _ => UNKNOWN_CLIENT,
    }
}
