//! Scheduling primitives for the sweep
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore (the admission gate)
//! - Randomized pre-request delays and client identity rotation
//! - Ordered commit of task outcomes and boundary tracking

use crate::config::NetworkConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Identity sent when the configured pool is empty
const FALLBACK_USER_AGENT: &str = concat!("sumi-sweep/", env!("CARGO_PKG_VERSION"));

/// Admission gate shared by every network request of a session
///
/// The gate couples:
/// - A counting semaphore bounding requests in flight
/// - The randomized delay applied before each request
/// - The pool of client identities requests draw from
#[derive(Debug, Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
    min_delay: Duration,
    max_delay: Duration,
    user_agents: Arc<[String]>,
}

impl Gate {
    /// Creates a gate sized from the network configuration
    pub fn new(config: &NetworkConfig) -> Self {
        let min_delay = Duration::from_secs_f64(config.min_delay.max(0.0));
        let max_delay = Duration::from_secs_f64(config.max_delay.max(0.0)).max(min_delay);

        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1) as usize)),
            min_delay,
            max_delay,
            user_agents: config
                .user_agents
                .iter()
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Waits for a slot
    ///
    /// # Returns
    ///
    /// * `Some(permit)` - The slot, released when the permit is dropped
    /// * `None` - The gate was closed; no further requests may start
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    /// Closes the gate, failing every pending and future `acquire`
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Draws a delay uniformly from the configured range
    pub fn random_delay(&self) -> Duration {
        let spread = self.max_delay.saturating_sub(self.min_delay);
        self.min_delay + spread.mul_f64(fastrand::f64())
    }

    /// Sleeps for a randomized delay
    pub async fn pause(&self) {
        let delay = self.random_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Draws a client identity from the pool
    pub fn user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return FALLBACK_USER_AGENT;
        }
        &self.user_agents[fastrand::usize(..self.user_agents.len())]
    }
}

/// Commits task outcomes in ascending ID order
///
/// Outcomes arrive in completion order. An outcome is released only once
/// every lower issued ID has resolved, so a boundary discovered late can
/// still discard higher outcomes before they reach the output.
#[derive(Debug)]
pub struct CommitQueue<T> {
    /// Issued IDs whose outcome has not arrived yet
    unresolved: BTreeSet<u64>,

    /// Outcomes waiting for lower IDs to resolve
    ready: BTreeMap<u64, T>,

    /// Lowest boundary ID seen
    boundary: Option<u64>,
}

impl<T> Default for CommitQueue<T> {
    fn default() -> Self {
        Self {
            unresolved: BTreeSet::new(),
            ready: BTreeMap::new(),
            boundary: None,
        }
    }
}

impl<T> CommitQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest boundary ID seen so far
    pub fn boundary(&self) -> Option<u64> {
        self.boundary
    }

    /// Returns true if work for `id` may still be issued
    pub fn admits(&self, id: u64) -> bool {
        self.boundary.map_or(true, |b| id <= b)
    }

    /// Marks `id` as issued
    pub fn issue(&mut self, id: u64) {
        self.unresolved.insert(id);
    }

    /// Returns true if `id` is issued and still waiting for its outcome
    pub fn is_pending(&self, id: u64) -> bool {
        self.unresolved.contains(&id)
    }

    /// Forgets an issued ID whose task was cancelled
    pub fn cancel(&mut self, id: u64) {
        self.unresolved.remove(&id);
    }

    /// Records a boundary at `id`
    ///
    /// Buffered outcomes above the boundary are dropped.
    ///
    /// # Returns
    ///
    /// Issued IDs above the boundary that are still unresolved; the caller
    /// must cancel their tasks. Empty if a lower boundary was already known.
    pub fn record_boundary(&mut self, id: u64) -> Vec<u64> {
        if self.boundary.is_some_and(|b| b <= id) {
            return Vec::new();
        }
        self.boundary = Some(id);

        let Some(next) = id.checked_add(1) else {
            return Vec::new();
        };

        let dropped = self.ready.split_off(&next);
        if !dropped.is_empty() {
            tracing::debug!(
                "Discarding {} buffered outcomes above boundary {}",
                dropped.len(),
                id
            );
        }

        let above = self.unresolved.split_off(&next);
        above.into_iter().collect()
    }

    /// Accepts the outcome for `id` and returns every outcome now committable,
    /// in ascending ID order
    pub fn resolve(&mut self, id: u64, outcome: T) -> Vec<(u64, T)> {
        if !self.unresolved.remove(&id) {
            return self.drain();
        }
        if self.admits(id) {
            self.ready.insert(id, outcome);
        }
        self.drain()
    }

    /// Releases outcomes with no unresolved lower ID
    fn drain(&mut self) -> Vec<(u64, T)> {
        let floor = self.unresolved.first().copied();
        let mut released = Vec::new();

        while let Some(entry) = self.ready.first_entry() {
            if floor.is_some_and(|f| *entry.key() > f) {
                break;
            }
            let (id, outcome) = entry.remove_entry();
            released.push((id, outcome));
        }

        released
    }

    /// Abandons every unresolved ID and releases all buffered outcomes
    ///
    /// Used when the session stops issuing work: outcomes already received
    /// are kept, the ones still in flight are not waited for.
    pub fn flush(&mut self) -> Vec<(u64, T)> {
        self.unresolved.clear();
        self.drain()
    }

    /// Number of outcomes buffered behind an unresolved lower ID
    pub fn buffered(&self) -> usize {
        self.ready.len()
    }

    /// Issued IDs not yet committed: still running or buffered
    ///
    /// Bounding this bounds how far the output lags behind the work done
    /// while a low ID is stuck in a cooldown.
    pub fn outstanding(&self) -> usize {
        self.unresolved.len() + self.ready.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(concurrency: u32, min: f64, max: f64) -> NetworkConfig {
        NetworkConfig {
            concurrency,
            min_delay: min,
            max_delay: max,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_random_delay_within_bounds() {
        let gate = Gate::new(&network(1, 0.5, 1.5));
        for _ in 0..200 {
            let delay = gate.random_delay();
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_zero_delay_range() {
        let gate = Gate::new(&network(1, 0.0, 0.0));
        assert_eq!(gate.random_delay(), Duration::ZERO);
    }

    #[test]
    fn test_user_agent_from_pool() {
        let config = network(1, 0.0, 0.0);
        let gate = Gate::new(&config);
        for _ in 0..20 {
            let drawn = gate.user_agent();
            assert!(config.user_agents.iter().any(|ua| ua == drawn));
        }
    }

    #[test]
    fn test_empty_pool_falls_back() {
        let mut config = network(1, 0.0, 0.0);
        config.user_agents.clear();
        let gate = Gate::new(&config);
        assert!(gate.user_agent().starts_with("sumi-sweep/"));
    }

    #[tokio::test]
    async fn test_gate_limits_concurrency() {
        let gate = Gate::new(&network(2, 0.0, 0.0));
        let a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        drop(a);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_gate_refuses() {
        let gate = Gate::new(&network(2, 0.0, 0.0));
        gate.close();
        assert!(gate.is_closed());
        assert!(gate.acquire().await.is_none());
    }

    #[test]
    fn test_outcomes_released_in_order() {
        let mut queue = CommitQueue::new();
        for id in 1..=3 {
            queue.issue(id);
        }

        assert!(queue.resolve(3, "c").is_empty());
        assert!(queue.resolve(2, "b").is_empty());
        assert_eq!(queue.buffered(), 2);

        let released = queue.resolve(1, "a");
        assert_eq!(released, vec![(1, "a"), (2, "b"), (3, "c")]);
        assert_eq!(queue.buffered(), 0);
    }

    #[test]
    fn test_boundary_discards_higher_outcomes() {
        let mut queue = CommitQueue::new();
        for id in 498..=503 {
            queue.issue(id);
        }

        // 502 finishes before the boundary at 500 is known
        assert!(queue.resolve(502, "late").is_empty());

        let to_cancel = queue.record_boundary(500);
        assert_eq!(to_cancel, vec![501, 503]);
        for id in to_cancel {
            queue.cancel(id);
        }

        assert!(!queue.admits(501));
        assert!(queue.admits(500));

        assert!(queue.resolve(500, "boundary").is_empty());
        assert_eq!(queue.resolve(499, "x"), Vec::<(u64, &str)>::new());
        let released = queue.resolve(498, "y");
        assert_eq!(released, vec![(498, "y"), (499, "x"), (500, "boundary")]);
    }

    #[test]
    fn test_higher_boundary_is_ignored() {
        let mut queue: CommitQueue<()> = CommitQueue::new();
        queue.issue(10);
        queue.issue(20);
        queue.record_boundary(10);
        assert!(queue.record_boundary(15).is_empty());
        assert_eq!(queue.boundary(), Some(10));
    }

    #[test]
    fn test_outcome_for_cancelled_id_is_ignored() {
        let mut queue = CommitQueue::new();
        queue.issue(1);
        queue.issue(2);
        queue.cancel(2);
        assert!(!queue.is_pending(2));

        assert_eq!(queue.resolve(2, "stale"), Vec::<(u64, &str)>::new());
        assert_eq!(queue.resolve(1, "a"), vec![(1, "a")]);
    }

    #[test]
    fn test_outstanding_counts_running_and_buffered() {
        let mut queue = CommitQueue::new();
        for id in 1..=4 {
            queue.issue(id);
        }
        assert_eq!(queue.outstanding(), 4);

        // 1 is stuck; the others wait behind it
        queue.resolve(2, "b");
        queue.resolve(3, "c");
        assert_eq!(queue.outstanding(), 4);
        assert_eq!(queue.buffered(), 2);

        assert_eq!(queue.resolve(1, "a").len(), 3);
        assert_eq!(queue.outstanding(), 1);
    }

    #[test]
    fn test_boundary_at_max_id() {
        let mut queue = CommitQueue::new();
        queue.issue(u64::MAX - 1);
        queue.issue(u64::MAX);

        assert!(queue.record_boundary(u64::MAX).is_empty());
        assert!(queue.is_pending(u64::MAX));
        assert!(queue.admits(u64::MAX));

        assert!(queue.resolve(u64::MAX, "end").is_empty());
        assert_eq!(
            queue.resolve(u64::MAX - 1, "x"),
            vec![(u64::MAX - 1, "x"), (u64::MAX, "end")]
        );
    }

    #[test]
    fn test_flush_releases_buffered() {
        let mut queue = CommitQueue::new();
        for id in 1..=3 {
            queue.issue(id);
        }
        queue.resolve(2, "b");
        queue.resolve(3, "c");

        assert_eq!(queue.flush(), vec![(2, "b"), (3, "c")]);
        assert!(!queue.is_pending(1));
    }
}
