//! Per-attempt route selection

use std::str::FromStr;

use crate::error::RelayError;

/// Where a single attempt sends its request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No proxy
    Direct,
    /// Uniformly random proxy from the snapshot
    RandomProxy,
    /// Proxy from the working set, random if that set is empty
    WorkingProxy,
}

/// Ordering of the route rules across an attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Direct first, then random proxies for every later attempt. The
    /// working set is never consulted.
    Legacy,
    /// Direct first, random proxies through the first half of the budget,
    /// known-good proxies for the back half.
    #[default]
    PreferWorking,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::PreferWorking => "prefer_working",
        }
    }

    /// Route for zero-based `attempt` out of `max_attempts`
    pub fn route(&self, attempt: u32, max_attempts: u32) -> Route {
        if attempt == 0 {
            return Route::Direct;
        }

        match self {
            Self::Legacy => Route::RandomProxy,
            // attempt > max / 2 without truncating odd budgets
            Self::PreferWorking if u64::from(attempt) * 2 > u64::from(max_attempts) => {
                Route::WorkingProxy
            }
            Self::PreferWorking => Route::RandomProxy,
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" | "random" => Ok(Self::Legacy),
            "prefer_working" | "prefer-working" | "preferworking" | "working" => {
                Ok(Self::PreferWorking)
            }
            other => Err(RelayError::InvalidConfig(format!(
                "unknown selection policy: {}",
                other
            ))),
        }
    }
}
