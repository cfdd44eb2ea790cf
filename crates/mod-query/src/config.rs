use std::time::Duration;

use crate::retry::RetryPolicy;

/// Largest page the provider accepts on a list call.
pub const PROVIDER_PAGE_CAP: usize = 500;
/// Upper bound on concurrent detail fetches for one page.
pub const MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub page_size: usize,
    pub concurrency: usize,
    /// Soft deadline for one fetch; `None` waits for every detail call.
    pub deadline: Option<Duration>,
    pub retry: RetryPolicy,
    pub default_max_results: usize,
    pub max_results_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            concurrency: MAX_CONCURRENCY,
            deadline: Some(Duration::from_secs(60)),
            retry: RetryPolicy::default(),
            default_max_results: 20,
            max_results_cap: 500,
        }
    }
}

impl EngineConfig {
    /// Clamps values into the ranges the provider and fetcher accept.
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.clamp(1, PROVIDER_PAGE_CAP);
        self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        self.max_results_cap = self.max_results_cap.max(1);
        self.default_max_results = self.default_max_results.clamp(1, self.max_results_cap);
        self
    }

    pub fn resolve_max_results(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_max_results
        } else {
            requested.min(self.max_results_cap)
        }
    }
}
