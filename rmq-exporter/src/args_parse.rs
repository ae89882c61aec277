use clap::Parser;
use std::path::PathBuf;

use crate::service_configuration::LoadConfiguration;

/// RocketMQ exporter for Prometheus.
///
/// Values given on the command line or through the environment override the config file.
#[derive(Debug, Parser)]
#[command(name = "rmq-exporter", version, about, long_about = None)]
pub(crate) struct Args {
    /// Path to the YAML config file
    #[arg(long, env = "RMQ_EXPORTER_CONFIG")]
    pub(crate) config_file: Option<PathBuf>,

    /// RocketMQ nameserver address (host:port)
    #[arg(long, env = "RMQ_NAMESRV_ADDR", alias = "rocketmq.namesrv-addr")]
    pub(crate) namesrv_addr: Option<String>,

    /// Address to expose metrics on
    #[arg(long, alias = "web.listen-address")]
    pub(crate) listen_addr: Option<String>,

    /// Path under which metrics are exposed
    #[arg(long, alias = "web.telemetry-path")]
    pub(crate) metrics_path: Option<String>,

    /// Maximum number of parallel scrape requests, 0 disables the limit
    #[arg(long, alias = "web.max-requests")]
    pub(crate) max_requests: Option<usize>,

    /// Exclude the exporter's own metrics from the output
    #[arg(long, alias = "web.disable-exporter-metrics")]
    pub(crate) disable_exporter_metrics: bool,

    /// Bound of one call to a nameserver or broker, in milliseconds
    #[arg(long)]
    pub(crate) call_timeout_ms: Option<u64>,

    /// Bound of a whole scrape, in milliseconds
    #[arg(long)]
    pub(crate) scrape_timeout_ms: Option<u64>,

    /// Disable the collectors that are enabled by default
    #[arg(long, alias = "collector.disable-defaults")]
    pub(crate) collector_disable_defaults: bool,

    /// Enable a collector by name, may be repeated
    #[arg(long = "collector", value_name = "NAME")]
    pub(crate) collectors: Vec<String>,

    /// Default log filter when RUST_LOG is not set
    #[arg(long)]
    pub(crate) log_level: Option<String>,
}

impl Args {
    /// Overlays the command line values on top of the file configuration.
    pub(crate) fn apply(self, mut config: LoadConfiguration) -> LoadConfiguration {
        if let Some(namesrv_addr) = self.namesrv_addr {
            config.namesrv_addr = Some(namesrv_addr);
        }
        if let Some(listen_addr) = self.listen_addr {
            config.web.listen_addr = Some(listen_addr);
        }
        if let Some(metrics_path) = self.metrics_path {
            config.web.metrics_path = Some(metrics_path);
        }
        if let Some(max_requests) = self.max_requests {
            config.web.max_requests = Some(max_requests);
        }
        if self.disable_exporter_metrics {
            config.web.disable_exporter_metrics = Some(true);
        }
        if let Some(call_timeout_ms) = self.call_timeout_ms {
            config.rocketmq.call_timeout_ms = Some(call_timeout_ms);
        }
        if let Some(scrape_timeout_ms) = self.scrape_timeout_ms {
            config.rocketmq.scrape_timeout_ms = Some(scrape_timeout_ms);
        }
        if self.collector_disable_defaults {
            config.collector.disable_defaults = Some(true);
        }
        for name in self.collectors {
            if !config.collector.enabled.contains(&name) {
                config.collector.enabled.push(name);
            }
        }
        if let Some(log_level) = self.log_level {
            config.log_level = Some(log_level);
        }
        config
    }
}
