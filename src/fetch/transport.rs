//! HTTP transport for inventory calls
//!
//! Each proxy gets its own `reqwest::Client` since reqwest binds proxies at
//! client construction. Clients are cached per connection string and
//! dropped when the pool evicts the proxy or a refresh leaves it out.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::StatusCode;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::models::Proxy;

/// Status and body of one completed HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Issues a single GET, optionally through a proxy
#[async_trait]
pub trait InventoryTransport: Send + Sync {
    /// Errors are transport failures; any HTTP status is an `Ok`
    async fn get(&self, url: &Url, proxy: Option<&Proxy>) -> Result<RawResponse>;

    /// Release resources held for a proxy that will not be used again
    fn forget(&self, _proxy: &Proxy) {}

    /// Release resources for every proxy `keep` rejects
    fn retain(&self, _keep: &(dyn Fn(&Proxy) -> bool + Sync)) {}
}

/// reqwest-backed transport
pub struct HttpTransport {
    direct: Client,
    proxied: DashMap<Proxy, Client>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let direct = Self::builder(timeout).no_proxy().build()?;

        Ok(Self {
            direct,
            proxied: DashMap::new(),
            timeout,
        })
    }

    fn builder(timeout: Duration) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
    }

    fn client_for(&self, proxy: Option<&Proxy>) -> Result<Client> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = Self::builder(self.timeout)
            .proxy(reqwest::Proxy::all(proxy.as_str())?)
            .build()?;
        self.proxied.insert(proxy.clone(), client.clone());
        debug!(proxy = %proxy, cached = self.proxied.len(), "Built proxied client");

        Ok(client)
    }

    /// Number of cached proxied clients
    pub fn cached_clients(&self) -> usize {
        self.proxied.len()
    }
}

#[async_trait]
impl InventoryTransport for HttpTransport {
    async fn get(&self, url: &Url, proxy: Option<&Proxy>) -> Result<RawResponse> {
        let client = self.client_for(proxy)?;
        let response = client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        Ok(RawResponse { status, body })
    }

    fn forget(&self, proxy: &Proxy) {
        self.proxied.remove(proxy);
    }

    fn retain(&self, keep: &(dyn Fn(&Proxy) -> bool + Sync)) {
        let before = self.proxied.len();
        self.proxied.retain(|proxy, _| keep(proxy));
        let dropped = before.saturating_sub(self.proxied.len());
        if dropped > 0 {
            debug!(dropped, cached = self.proxied.len(), "Dropped clients for retired proxies");
        }
    }
}
