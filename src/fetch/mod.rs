//! Resilient inventory fetching
//!
//! A fetch walks a fixed attempt budget. Each attempt picks a route
//! (direct, random pool proxy, or known-good proxy), performs one HTTP
//! call, and turns the response into an `AttemptOutcome` that decides
//! both the pool mutation and whether the loop goes on.

mod fetcher;
mod outcome;
mod page_size;
mod selection;
mod transport;

pub use fetcher::ResilientFetcher;
pub use outcome::{AttemptOutcome, Disposition, PoolAction};
pub use page_size::PageSizeTable;
pub use selection::{Route, SelectionPolicy};
pub use transport::{HttpTransport, InventoryTransport, RawResponse};
