use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// configuration settings loaded from the config file, every field optional
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LoadConfiguration {
    /// RocketMQ nameserver address (`host:port`)
    pub(crate) namesrv_addr: Option<String>,
    /// HTTP exposition endpoint settings
    pub(crate) web: WebConfig,
    /// Timeouts applied to the cluster calls
    pub(crate) rocketmq: RocketMqConfig,
    /// Which collectors run
    pub(crate) collector: CollectorConfig,
    /// Default log filter, used when RUST_LOG is not set
    pub(crate) log_level: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct WebConfig {
    pub(crate) listen_addr: Option<String>,
    pub(crate) metrics_path: Option<String>,
    /// Concurrent scrapes allowed, 0 for no limit
    pub(crate) max_requests: Option<usize>,
    pub(crate) disable_exporter_metrics: Option<bool>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct RocketMqConfig {
    pub(crate) call_timeout_ms: Option<u64>,
    pub(crate) scrape_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CollectorConfig {
    /// Disable every collector that is enabled by default
    pub(crate) disable_defaults: Option<bool>,
    /// Collectors to enable explicitly
    pub(crate) enabled: Vec<String>,
}

/// validated exporter configuration
#[derive(Debug, Clone)]
pub(crate) struct ServiceConfiguration {
    pub(crate) namesrv_addr: String,
    pub(crate) listen_addr: SocketAddr,
    pub(crate) metrics_path: String,
    pub(crate) call_timeout: Duration,
    pub(crate) scrape_timeout: Duration,
    pub(crate) max_requests: usize,
    pub(crate) disable_exporter_metrics: bool,
    pub(crate) collector_disable_defaults: bool,
    pub(crate) collectors: Vec<String>,
    pub(crate) log_level: String,
}

impl LoadConfiguration {
    pub(crate) fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse the configuration file")
    }
}

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let namesrv_addr = config
            .namesrv_addr
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| anyhow!("a RocketMQ nameserver address is required (namesrv_addr)"))?;

        let listen_addr = config
            .web
            .listen_addr
            .unwrap_or_else(|| "0.0.0.0:9100".to_string());
        let listen_addr: SocketAddr = listen_addr
            .parse()
            .context(format!("Failed to parse into Socket address: {}", listen_addr))?;

        let metrics_path = config
            .web
            .metrics_path
            .unwrap_or_else(|| "/metrics".to_string());
        if !metrics_path.starts_with('/') || metrics_path == "/" {
            return Err(anyhow!(
                "metrics path must start with '/' and differ from the landing page: {}",
                metrics_path
            ));
        }

        let call_timeout_ms = config.rocketmq.call_timeout_ms.unwrap_or(2000);
        let scrape_timeout_ms = config.rocketmq.scrape_timeout_ms.unwrap_or(10_000);
        if call_timeout_ms == 0 || scrape_timeout_ms == 0 {
            return Err(anyhow!("call and scrape timeouts must be greater than zero"));
        }

        Ok(ServiceConfiguration {
            namesrv_addr,
            listen_addr,
            metrics_path,
            call_timeout: Duration::from_millis(call_timeout_ms),
            scrape_timeout: Duration::from_millis(scrape_timeout_ms),
            max_requests: config.web.max_requests.unwrap_or(40),
            disable_exporter_metrics: config.web.disable_exporter_metrics.unwrap_or(false),
            collector_disable_defaults: config.collector.disable_defaults.unwrap_or(false),
            collectors: config.collector.enabled,
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_only_the_nameserver() {
        let load = LoadConfiguration::from_yaml("namesrv_addr: 127.0.0.1:9876\n").unwrap();
        let config: ServiceConfiguration = load.try_into().unwrap();

        assert_eq!(config.namesrv_addr, "127.0.0.1:9876");
        assert_eq!(config.listen_addr, "0.0.0.0:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.metrics_path, "/metrics");
        assert_eq!(config.call_timeout, Duration::from_millis(2000));
        assert_eq!(config.scrape_timeout, Duration::from_millis(10_000));
        assert_eq!(config.max_requests, 40);
        assert!(!config.disable_exporter_metrics);
        assert!(!config.collector_disable_defaults);
        assert!(config.collectors.is_empty());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_full_file() {
        let yaml = r#"
namesrv_addr: "namesrv.rocketmq:9876"
web:
  listen_addr: "127.0.0.1:9200"
  metrics_path: "/stats"
  max_requests: 0
  disable_exporter_metrics: true
rocketmq:
  call_timeout_ms: 500
  scrape_timeout_ms: 4000
collector:
  disable_defaults: true
  enabled: ["topic_offset"]
log_level: "debug"
"#;
        let config: ServiceConfiguration =
            LoadConfiguration::from_yaml(yaml).unwrap().try_into().unwrap();

        assert_eq!(config.listen_addr.port(), 9200);
        assert_eq!(config.metrics_path, "/stats");
        assert_eq!(config.max_requests, 0);
        assert!(config.disable_exporter_metrics);
        assert_eq!(config.call_timeout, Duration::from_millis(500));
        assert_eq!(config.scrape_timeout, Duration::from_millis(4000));
        assert!(config.collector_disable_defaults);
        assert_eq!(config.collectors, vec!["topic_offset".to_string()]);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_missing_nameserver_is_rejected() {
        let result = ServiceConfiguration::try_from(LoadConfiguration::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut load = LoadConfiguration {
            namesrv_addr: Some("127.0.0.1:9876".to_string()),
            ..Default::default()
        };
        load.web.metrics_path = Some("/".to_string());
        assert!(ServiceConfiguration::try_from(load.clone()).is_err());

        load.web.metrics_path = None;
        load.web.listen_addr = Some("not-an-address".to_string());
        assert!(ServiceConfiguration::try_from(load.clone()).is_err());

        load.web.listen_addr = None;
        load.rocketmq.call_timeout_ms = Some(0);
        assert!(ServiceConfiguration::try_from(load).is_err());
    }
}
