//! Upstream proxy provider
//!
//! Pulls the full list of leased proxies page by page. A transport or
//! decode failure on any page fails the whole refresh; partial lists are
//! never returned.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{RelayError, Result};
use crate::models::{Proxy, ProxyListPage};

/// Produces the current set of leased proxies
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Fetch every leased proxy, deduplicated by connection string
    async fn fetch_all(&self) -> Result<HashSet<Proxy>>;
}

/// Upper bound on list pages per refresh
pub const MAX_PAGES: u32 = 1000;

/// Webshare-style paginated list API (`?page=n`, `{"results": [...]}`)
pub struct WebshareSource {
    client: Client,
    list_url: Url,
    api_key: String,
    max_pages: u32,
}

impl WebshareSource {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("inventory-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            list_url: config.list_url.clone(),
            api_key: config.api_key.clone(),
            max_pages: MAX_PAGES,
        })
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn page_url(&self, page: u32) -> Url {
        let mut url = self.list_url.clone();
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    async fn fetch_page(&self, page: u32) -> Result<ProxyListPage> {
        let url = self.page_url(page);
        debug!(page, "Requesting proxy list page");

        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Token {}", self.api_key))
            .send()
            .await
            .map_err(|e| RelayError::ProxySource(format!("page {}: {}", page, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::ProxySource(format!(
                "page {} returned status {}",
                page, status
            )));
        }

        response
            .json::<ProxyListPage>()
            .await
            .map_err(|e| RelayError::ProxySource(format!("page {} decode failed: {}", page, e)))
    }
}

#[async_trait]
impl ProxySource for WebshareSource {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<HashSet<Proxy>> {
        let mut proxies = HashSet::new();
        let mut page = 1;

        loop {
            if page > self.max_pages {
                return Err(RelayError::ProxySource(format!(
                    "proxy list did not end within {} pages",
                    self.max_pages
                )));
            }

            let body = self.fetch_page(page).await?;
            if body.is_last() {
                break;
            }

            for record in body.results.unwrap_or_default() {
                match record.to_proxy() {
                    Ok(proxy) => {
                        proxies.insert(proxy);
                    }
                    Err(e) => warn!(page, "Skipping proxy record: {}", e),
                }
            }

            page += 1;
        }

        info!("Fetched {} proxies over {} pages", proxies.len(), page - 1);
        Ok(proxies)
    }
}


/// Scripted sources for pool and fetcher tests
#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::ProxySource;
    use crate::error::{RelayError, Result};
    use crate::models::Proxy;

    /// Replays one scripted result per call; the last entry repeats
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Option<Vec<&'static str>>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        /// `None` entries fail the refresh
        pub(crate) fn new(script: Vec<Option<Vec<&'static str>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn fixed(proxies: Vec<&'static str>) -> Self {
            Self::new(vec![Some(proxies)])
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProxySource for ScriptedSource {
        async fn fetch_all(&self) -> Result<HashSet<Proxy>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let next = {
                let mut script = self.script.lock();
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                }
            };

            match next.flatten() {
                Some(list) => Ok(list.into_iter().map(Proxy::new).collect()),
                None => Err(RelayError::ProxySource("scripted failure".into())),
            }
        }
    }
}
