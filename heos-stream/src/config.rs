//! Configuration types for the heos-stream crate
//!
//! [`SessionConfig`] controls every timing knob of a session: connect and
//! response timeouts, heartbeat cadence, the staleness threshold for the
//! event connection and how recovery behaves once the device is back.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SessionError;
use crate::transport::Endpoint;

/// What the session does once a lost device becomes reachable again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Reconnect both channels, then notify listeners
    #[default]
    Reestablish,
    /// Only notify listeners; the application reconnects on its own
    NotifyOnly,
}

/// Configuration for a [`HeosSession`](crate::HeosSession)
///
/// Can be built in code or loaded from TOML, where durations use humantime
/// notation:
///
/// ```toml
/// host = "192.168.1.20"
/// response_timeout = "2s"
/// stale_event_threshold = "30m"
/// recovery_policy = "notify_only"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionConfig {
    /// Address of the device
    pub host: String,

    /// CLI port of the device
    /// Default: 1255
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for opening a connection
    /// Default: 5 seconds
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Timeout for the reachability probe
    /// Default: 2 seconds
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    pub probe_timeout: Duration,

    /// How long to wait for each response line
    /// Default: 1 second
    #[serde(with = "humantime_serde", default = "default_response_timeout")]
    pub response_timeout: Duration,

    /// Delay before the first heartbeat
    /// Default: 10 seconds
    #[serde(with = "humantime_serde", default = "default_heartbeat_initial_delay")]
    pub heartbeat_initial_delay: Duration,

    /// Delay between heartbeats
    /// Default: 60 seconds
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// The event connection is considered dead when no line arrived for this long
    /// Default: 2 hours
    #[serde(with = "humantime_serde", default = "default_stale_event_threshold")]
    pub stale_event_threshold: Duration,

    /// Delay between reachability probes while recovering
    /// Default: 5 seconds
    #[serde(with = "humantime_serde", default = "default_probe_interval")]
    pub probe_interval: Duration,

    /// Wait after the device is reachable before reconnecting
    /// Default: 15 seconds
    #[serde(with = "humantime_serde", default = "default_settle_delay")]
    pub settle_delay: Duration,

    /// Default: [`RecoveryPolicy::Reestablish`]
    #[serde(default)]
    pub recovery_policy: RecoveryPolicy,
}

fn default_port() -> u16 {
    heos_api::DEFAULT_PORT
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_heartbeat_initial_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_stale_event_threshold() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(15)
}

impl SessionConfig {
    /// Create a config for `host` with default values
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            connect_timeout: default_connect_timeout(),
            probe_timeout: default_probe_timeout(),
            response_timeout: default_response_timeout(),
            heartbeat_initial_delay: default_heartbeat_initial_delay(),
            heartbeat_interval: default_heartbeat_interval(),
            stale_event_threshold: default_stale_event_threshold(),
            probe_interval: default_probe_interval(),
            settle_delay: default_settle_delay(),
            recovery_policy: RecoveryPolicy::default(),
        }
    }

    /// Create a config that notices failures and recovers quickly
    pub fn fast_recovery(host: impl Into<String>) -> Self {
        Self {
            heartbeat_initial_delay: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(15),
            stale_event_threshold: Duration::from_secs(10 * 60),
            probe_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(3),
            ..Self::new(host)
        }
    }

    /// Create a config for slow networks and busy devices
    pub fn conservative(host: impl Into<String>) -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(120),
            probe_interval: Duration::from_secs(15),
            settle_delay: Duration::from_secs(30),
            ..Self::new(host)
        }
    }

    /// Parse a config from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, SessionError> {
        let config: SessionConfig = toml::from_str(content)
            .map_err(|e| SessionError::InvalidConfig(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set both the initial heartbeat delay and the heartbeat interval
    pub fn with_heartbeat(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.heartbeat_initial_delay = initial_delay;
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_stale_event_threshold(mut self, threshold: Duration) -> Self {
        self.stale_event_threshold = threshold;
        self
    }

    /// Set the probe interval and settle delay used while recovering
    pub fn with_recovery_timing(mut self, probe_interval: Duration, settle_delay: Duration) -> Self {
        self.probe_interval = probe_interval;
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery_policy = policy;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "Host must not be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(SessionError::InvalidConfig(
                "Port must be greater than 0".to_string(),
            ));
        }

        let non_zero = [
            ("Connect timeout", self.connect_timeout),
            ("Probe timeout", self.probe_timeout),
            ("Response timeout", self.response_timeout),
            ("Heartbeat interval", self.heartbeat_interval),
            ("Stale event threshold", self.stale_event_threshold),
            ("Probe interval", self.probe_interval),
        ];
        for (name, value) in non_zero {
            if value == Duration::ZERO {
                return Err(SessionError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        Ok(())
    }
}
