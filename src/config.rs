//! Configuration types for Weaver
//!
//! Build them programmatically - no config files needed.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use weaver::config::{ClusterConfig, EngineConfig};
//!
//! let engine = EngineConfig::new()
//!     .poll_interval(Duration::from_millis(500))
//!     .default_namespace("ledger");
//!
//! let cluster = ClusterConfig::new()
//!     .kubeconfig("/etc/weaver/kubeconfig")
//!     .context("solo-e2e");
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Poll cadence used by every wait
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Namespace given to namespaced documents that carry none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Engine behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Interval between successive probes of a wait
    pub poll_interval: Duration,

    /// Namespace applied to namespaced documents without one
    pub default_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll cadence
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the fallback namespace
    #[must_use]
    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }
}

/// How to reach the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Kubeconfig path; the standard lookup (`KUBECONFIG`, `~/.kube/config`,
    /// in-cluster) is used when unset
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context; the current context when unset
    pub context: Option<String>,

    pub connect_timeout: Duration,

    pub read_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(295),
        }
    }
}

impl ClusterConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set kubeconfig path
    #[must_use]
    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Set kubeconfig context
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.poll_interval, Duration::from_millis(300));
        assert_eq!(config.default_namespace, "default");
    }

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::new()
            .poll_interval(Duration::from_millis(50))
            .default_namespace("ledger");

        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.default_namespace, "ledger");
    }

    #[test]
    fn test_cluster_config_existing() {
        let config = ClusterConfig::new()
            .kubeconfig("/home/ops/.kube/prod")
            .context("prod-context")
            .read_timeout(Duration::from_secs(60));

        assert_eq!(config.kubeconfig, Some(PathBuf::from("/home/ops/.kube/prod")));
        assert_eq!(config.context.as_deref(), Some("prod-context"));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }
}
