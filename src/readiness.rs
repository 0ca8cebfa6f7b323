//! Polling fixtures until they report ready.

use std::thread;
use std::time::{Duration, Instant};

use itkit_core::constants::{
    DEFAULT_CONTAINER_POLL_MAX, DEFAULT_CONTAINER_POLL_MIN, DEFAULT_CONTAINER_POLL_START,
    DEFAULT_CONTAINER_READY_TIMEOUT,
};

/// Something that can be asked whether it is ready yet.
pub trait Readiness {
    fn name(&self) -> &str;

    /// May refresh internal state, hence `&mut`.
    fn is_ready(&mut self) -> bool;
}

/// Bounds for `wait_for_ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Overall budget.
    pub max_wait: Duration,
    /// Longest single sleep between checks.
    pub max_poll: Duration,
    /// First sleep, raised to `min_poll` if smaller.
    pub start_poll: Duration,
    pub min_poll: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_CONTAINER_READY_TIMEOUT,
            max_poll: DEFAULT_CONTAINER_POLL_MAX,
            start_poll: DEFAULT_CONTAINER_POLL_START,
            min_poll: DEFAULT_CONTAINER_POLL_MIN,
        }
    }
}

impl PollConfig {
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_max_poll(mut self, max_poll: Duration) -> Self {
        self.max_poll = max_poll;
        self
    }

    pub fn with_start_poll(mut self, start_poll: Duration) -> Self {
        self.start_poll = start_poll;
        self
    }

    pub fn with_min_poll(mut self, min_poll: Duration) -> Self {
        self.min_poll = min_poll;
        self
    }
}

/// Doubling sleep intervals, capped at `max_poll`. Never ends.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            next: config.start_poll.max(config.min_poll),
            max: config.max_poll,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next.min(self.max);
        self.next = current.saturating_mul(2);
        Some(current)
    }
}

fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}

/// Wait until every item is ready or `config.max_wait` elapses.
///
/// Returns the names of the items that never became ready; an empty list means success. `verbose > 0` prints the
/// start, slow checks, and the outcome; `verbose > 1` also prints every wait.
#[tracing::instrument(skip_all, fields(items = items.len()))]
pub fn wait_for_ready(
    items: &mut [&mut dyn Readiness],
    config: &PollConfig,
    message: Option<&str>,
    verbose: u8,
) -> Vec<String> {
    let reason = match message {
        Some(message) => message.to_string(),
        None => format!("{} containers to be ready", items.len()),
    };
    if verbose > 0 {
        println!("Waiting for up to {} seconds for {}", secs(config.max_wait), reason);
    }

    let mut backoff = Backoff::new(config);
    let start = Instant::now();
    let deadline = start + config.max_wait;
    let mut unready: Vec<usize> = (0..items.len()).collect();
    let mut now = start;

    while now <= deadline {
        unready.retain(|&i| !items[i].is_ready());
        let check = now.elapsed();
        if check > Duration::from_secs(1) && verbose > 0 {
            println!("Checking took {} seconds", secs(check));
        }
        if unready.is_empty() {
            break;
        }

        let poll = backoff.next().unwrap_or(config.max_poll);
        if verbose > 1 {
            println!("Waiting {} seconds before checking on {} containers", secs(poll), unready.len());
        }
        thread::sleep(poll);
        now = Instant::now();
    }

    let waited = start.elapsed();
    if !unready.is_empty() {
        let names: Vec<String> = unready.iter().map(|&i| items[i].name().to_string()).collect();
        tracing::debug!(unready = ?names, "gave up waiting");
        if verbose > 0 {
            println!(
                "Waited {} for {} -- still had unready: {}",
                secs(waited),
                reason,
                names.join(", ")
            );
        }
        return names;
    }

    if verbose > 0 && waited > config.max_wait / 2 {
        println!(
            "Took {} of {} for {} -- consider increasing timeout",
            secs(waited),
            secs(config.max_wait),
            reason
        );
    }
    Vec::new()
}
