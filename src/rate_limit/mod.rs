//! In-memory login throttling.
//!
//! Failed attempts are counted per key (normalized email) inside a sliding
//! window. State lives in the process and is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Failures allowed inside the window before further attempts are refused.
    pub max_failures: usize,
    pub window: Duration,
    /// Tracked keys above which recording a failure first drops stale keys.
    pub prune_above: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::from_secs(15 * 60),
            prune_above: 10_000,
        }
    }
}

#[derive(Clone, Default)]
pub struct LoginThrottle {
    failures: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    config: ThrottleConfig,
}

impl LoginThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            failures: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Whether another attempt for `email` is allowed right now.
    pub async fn check(&self, email: &str) -> bool {
        let failures = self.failures.read().await;
        match failures.get(&Self::key(email)) {
            Some(times) => {
                times.iter().filter(|t| t.elapsed() < self.config.window).count()
                    < self.config.max_failures
            }
            None => true,
        }
    }

    pub async fn record_failure(&self, email: &str) {
        let window = self.config.window;
        let mut failures = self.failures.write().await;
        if failures.len() >= self.config.prune_above {
            prune_map(&mut failures, window);
        }
        let entry = failures.entry(Self::key(email)).or_default();
        entry.retain(|t| t.elapsed() < window);
        entry.push(Instant::now());
    }

    pub async fn reset(&self, email: &str) {
        self.failures.write().await.remove(&Self::key(email));
    }

    /// Drop keys whose failures have all aged out.
    pub async fn prune(&self) {
        prune_map(&mut *self.failures.write().await, self.config.window);
    }

    /// Number of keys currently tracked.
    pub async fn tracked(&self) -> usize {
        self.failures.read().await.len()
    }
}

fn prune_map(failures: &mut HashMap<String, Vec<Instant>>, window: Duration) {
    failures.retain(|_, times| {
        times.retain(|t| t.elapsed() < window);
        !times.is_empty()
    });
}
