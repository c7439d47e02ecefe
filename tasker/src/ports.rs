//! Free port discovery for the proxy, its UI and the bundler dev server.

use std::net::IpAddr;

use tasker_core::PortSet;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::settings::PortSettings;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("Invalid port range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },

    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Only {found} of {wanted} free ports found in {start}-{end} on {ip}")]
    Exhausted {
        start: u16,
        end: u16,
        ip: IpAddr,
        found: usize,
        wanted: usize,
    },
}

/// Operator-supplied ports, by slot: `[local, ui]`.
///
/// Parsed from the `local:ui` form where either side may be missing
/// (`"3000:3001"`, `"3000:"`, `":3001"`, `"3000"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortOverrides(Vec<Option<u16>>);

impl PortOverrides {
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == ':')
            .collect();
        if cleaned.is_empty() {
            return Self::default();
        }
        Self(
            cleaned
                .split(':')
                .map(|part| part.parse::<u16>().ok().filter(|port| *port != 0))
                .collect(),
        )
    }

    pub fn slot(&self, index: usize) -> Option<u16> {
        self.0.get(index).copied().flatten()
    }

    fn values(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().flatten().copied()
    }
}

/// Return `count` ports in `[start, end]` that can currently be bound on `ip`,
/// skipping any port listed in `exclude`.
pub async fn find_free_ports(
    start: u16,
    end: u16,
    ip: IpAddr,
    count: usize,
    exclude: &[u16],
) -> Result<Vec<u16>, PortError> {
    if start > end {
        return Err(PortError::InvalidRange { start, end });
    }

    let mut found = Vec::with_capacity(count);
    for port in start..=end {
        if found.len() == count {
            break;
        }
        if exclude.contains(&port) {
            continue;
        }
        if TcpListener::bind((ip, port)).await.is_ok() {
            found.push(port);
        }
    }

    if found.len() < count {
        return Err(PortError::Exhausted {
            start,
            end,
            ip,
            found: found.len(),
            wanted: count,
        });
    }
    Ok(found)
}

/// Discover the port set and apply operator overrides positionally.
pub async fn allocate(
    settings: &PortSettings,
    overrides: &PortOverrides,
) -> Result<PortSet, PortError> {
    let ip: IpAddr = settings
        .ip
        .parse()
        .map_err(|_| PortError::InvalidAddress(settings.ip.clone()))?;
    let exclude: Vec<u16> = overrides.values().collect();

    let discovered = find_free_ports(
        settings.start,
        settings.end,
        ip,
        settings.count,
        &exclude,
    )
    .await?;

    let slot = |index: usize| overrides.slot(index).or(discovered.get(index).copied());
    let ports = PortSet {
        local: slot(0),
        ui: slot(1),
        webpack: slot(2),
    };
    tracing::debug!(?ports, "allocated ports");
    Ok(ports)
}
