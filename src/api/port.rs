//! Listen port selection
//!
//! The preferred port is used when it can be bound. Otherwise the first
//! bindable port in 3000..=9999 is taken, skipping reserved ports.

use std::io::ErrorKind;

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::{RelayError, Result};

const FALLBACK_RANGE: std::ops::RangeInclusive<u16> = 3000..=9999;
const RESERVED_PORTS: [u16; 2] = [5000, 7000];

/// Ports to try, preferred first
pub fn candidate_ports(preferred: u16) -> impl Iterator<Item = u16> {
    std::iter::once(preferred).chain(
        FALLBACK_RANGE.filter(move |p| *p != preferred && !RESERVED_PORTS.contains(p)),
    )
}

/// Bind the first available candidate port on `host`
pub async fn bind_available(host: &str, preferred: u16) -> Result<TcpListener> {
    for port in candidate_ports(preferred) {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                if port != preferred {
                    info!("Port {} is in use, listening on {} instead", preferred, port);
                }
                return Ok(listener);
            }
            Err(e) if matches!(e.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied) => {
                debug!(port, "Port unavailable: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(RelayError::InvalidConfig("No available port found".into()))
}
