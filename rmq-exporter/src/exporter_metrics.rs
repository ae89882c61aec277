use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::time::Duration;
use tracing::info;

pub(crate) struct Metric {
    pub(crate) name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 1] = [EXPORTER_SCRAPES_TOTAL];
pub(crate) const GAUGES: [Metric; 5] = [
    TOPIC_OFFSET,
    TOPIC_LAST_UPDATE_TIMESTAMP,
    SCRAPE_COLLECTOR_SUCCESS,
    SCRAPE_COLLECTOR_DURATION_SECONDS,
    EXPORTER_BUILD_INFO,
];

// TOPIC Metrics --------------------------

pub(crate) const TOPIC_OFFSET: Metric = Metric {
    name: "rocketmq_topic_offset",
    description: "Largest max offset across every queue of the topic",
};

pub(crate) const TOPIC_LAST_UPDATE_TIMESTAMP: Metric = Metric {
    name: "rocketmq_topic_last_update_timestamp",
    description: "Latest queue update time of the topic, in milliseconds since the epoch",
};

// EXPORTER Metrics --------------------------

pub(crate) const SCRAPE_COLLECTOR_SUCCESS: Metric = Metric {
    name: "rocketmq_exporter_scrape_collector_success",
    description: "Whether the collector succeeded during the last scrape (1=success,0=failure)",
};

pub(crate) const SCRAPE_COLLECTOR_DURATION_SECONDS: Metric = Metric {
    name: "rocketmq_exporter_scrape_collector_duration_seconds",
    description: "Duration of the collector during the last scrape",
};

pub(crate) const EXPORTER_SCRAPES_TOTAL: Metric = Metric {
    name: "rocketmq_exporter_scrapes_total",
    description: "Total number of scrapes served",
};

pub(crate) const EXPORTER_BUILD_INFO: Metric = Metric {
    name: "rocketmq_exporter_build_info",
    description: "Exporter build information, always 1",
};

/// Installs the global Prometheus recorder and describes every metric.
///
/// The global recorder holds the process-wide series only. Cluster series are
/// recorded per scrape, see [`scrape_recorder`].
pub(crate) fn init_metrics() -> Result<PrometheusHandle> {
    info!("initializing metrics recorder");

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    describe_metrics();
    Ok(handle)
}

pub(crate) fn describe_metrics() {
    for metric in COUNTERS {
        metrics::describe_counter!(metric.name, metric.description);
    }

    for metric in GAUGES {
        metrics::describe_gauge!(metric.name, metric.description);
    }
}

/// Fresh recorder for the series of one scrape, with every metric described.
pub(crate) fn scrape_recorder() -> PrometheusRecorder {
    let recorder = PrometheusBuilder::new().build_recorder();
    metrics::with_local_recorder(&recorder, describe_metrics);
    recorder
}

/// Drives the recorder's periodic housekeeping until the process exits.
pub(crate) fn spawn_upkeep(handle: PrometheusHandle, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            handle.run_upkeep();
        }
    })
}
