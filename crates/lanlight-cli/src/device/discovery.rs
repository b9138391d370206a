//! Discovery and device selection for CLI commands.

use std::time::Duration;

use tracing::{debug, info};

use lanlight_core::discovery::resolve_ipv6;
use lanlight_core::{DeviceCollection, Discovery, DiscoveryConfig, MacAddr, SessionConfig};

use crate::cli::{Cli, TargetArgs};
use crate::error::{CliError, Result};

/// Global network options shared by every command.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    pub timeout: Duration,
    pub attempts: u32,
    pub ipv6_prefix: Option<String>,
}

impl NetworkOptions {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.attempts == 0 {
            return Err(CliError::InvalidArgument(
                "--attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            timeout: Duration::from_millis(cli.timeout),
            attempts: cli.attempts,
            ipv6_prefix: cli.ipv6_prefix.clone(),
        })
    }

    /// Build the discovery configuration these options describe.
    ///
    /// Sessions don't refresh metadata on their own here; commands decide
    /// when they need it.
    pub fn discovery_config(&self) -> Result<DiscoveryConfig> {
        let session = SessionConfig::default()
            .with_timeout(self.timeout)
            .with_max_attempts(self.attempts)
            .with_refresh_metadata(false);

        let mut config = DiscoveryConfig::default().with_session(session);
        if let Some(prefix) = &self.ipv6_prefix {
            validate_prefix(prefix)?;
            config = config.with_ipv6_prefix(prefix.clone());
        }
        Ok(config)
    }
}

/// Reject prefixes that can't yield a usable address before any socket is opened.
fn validate_prefix(prefix: &str) -> Result<()> {
    resolve_ipv6(MacAddr::BROADCAST, prefix)?;
    Ok(())
}

/// Parsed device selection.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub group: Option<String>,
    pub label: Option<String>,
    pub mac: Option<MacAddr>,
}

impl Selection {
    pub fn from_args(target: &TargetArgs) -> Result<Self> {
        let mac = target.mac.as_deref().map(str::parse::<MacAddr>).transpose()?;
        Ok(Self {
            group: target.group.clone(),
            label: target.label.clone(),
            mac,
        })
    }

    pub fn needs_metadata(&self) -> bool {
        self.group.is_some() || self.label.is_some()
    }

    pub fn apply(&self, devices: &DeviceCollection) -> DeviceCollection {
        let mut selected = devices.clone();
        if let Some(mac) = self.mac {
            selected = selected.by_mac(mac);
        }
        if let Some(group) = &self.group {
            selected = selected.by_group(group);
        }
        if let Some(label) = &self.label {
            selected = selected.by_label(label);
        }
        selected
    }
}

/// Start the discovery loop and let it run for `duration`.
///
/// The returned handle keeps the sessions alive; drop or stop it when done.
pub async fn start_discovery(options: &NetworkOptions, duration: Duration) -> Result<Discovery> {
    let mut discovery = Discovery::new(options.discovery_config()?);
    discovery.start().await?;
    debug!(duration_ms = duration.as_millis() as u64, "Waiting for devices");
    tokio::time::sleep(duration).await;
    Ok(discovery)
}

/// Discover devices and narrow them down to the selected targets.
///
/// Metadata is fetched only when the selection filters on it or the caller
/// asks for it.
pub async fn find_targets(
    options: &NetworkOptions,
    target: &TargetArgs,
    fetch_metadata: bool,
) -> Result<(Discovery, DeviceCollection)> {
    let selection = Selection::from_args(target)?;
    let discovery = start_discovery(options, Duration::from_secs(target.discovery_duration)).await?;

    let mut devices = discovery.devices();
    if let Some(mac) = selection.mac {
        devices = devices.by_mac(mac);
    }

    if fetch_metadata || selection.needs_metadata() {
        let refreshed = devices.refresh_metadata().await;
        debug!(
            succeeded = refreshed.succeeded,
            unreachable = refreshed.unreachable,
            "Fetched device metadata"
        );
    }

    let selected = selection.apply(&devices);
    info!(found = discovery.devices().len(), selected = selected.len(), "Targets selected");

    if selected.is_empty() {
        return Err(CliError::NoDevicesFound);
    }
    Ok((discovery, selected))
}
