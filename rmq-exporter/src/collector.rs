mod topic_offset;

use topic_offset::TopicOffsetCollector;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rmq_client::{ClusterClient, Deadline};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::exporter_metrics::{
    scrape_recorder, EXPORTER_BUILD_INFO, EXPORTER_SCRAPES_TOTAL,
    SCRAPE_COLLECTOR_DURATION_SECONDS, SCRAPE_COLLECTOR_SUCCESS,
};
use crate::service_configuration::ServiceConfiguration;

/// One gauge value read from the cluster.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sample {
    pub(crate) name: &'static str,
    pub(crate) labels: Vec<(&'static str, String)>,
    pub(crate) value: f64,
}

impl Sample {
    pub(crate) fn gauge(name: &'static str, labels: Vec<(&'static str, String)>, value: f64) -> Self {
        Sample {
            name,
            labels,
            value,
        }
    }
}

/// A named source of metrics, run on every scrape that selects it.
///
/// A scrape exposes exactly the samples its collectors returned, so a series
/// missing from the latest result is not rendered.
#[async_trait]
pub(crate) trait Collector: Send + Sync {
    async fn update(&self, deadline: &Deadline) -> Result<Vec<Sample>>;
}

// every collector this exporter knows, with whether it runs by default
const AVAILABLE_COLLECTORS: [(&str, bool); 1] = [(topic_offset::NAME, true)];

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SelectError {
    #[error("unknown collector: {0}")]
    Unknown(String),
    #[error("collector is disabled: {0}")]
    Disabled(String),
}

/// The enabled collectors, keyed by name.
pub(crate) struct CollectorRegistry {
    collectors: BTreeMap<&'static str, Arc<dyn Collector>>,
    exporter_metrics: bool,
}

impl CollectorRegistry {
    /// Builds the enabled set from the configuration.
    ///
    /// Collectors enabled by default run unless defaults are disabled; names
    /// listed explicitly always run. An unknown name is a configuration error.
    pub(crate) fn new(config: &ServiceConfiguration, client: ClusterClient) -> Result<Self> {
        for name in &config.collectors {
            if !AVAILABLE_COLLECTORS.iter().any(|(known, _)| *known == name.as_str()) {
                return Err(anyhow!("unknown collector in configuration: {}", name));
            }
        }

        let mut collectors: Vec<(&'static str, Arc<dyn Collector>)> = Vec::new();
        for (name, enabled_by_default) in AVAILABLE_COLLECTORS {
            let enabled = (enabled_by_default && !config.collector_disable_defaults)
                || config.collectors.iter().any(|wanted| wanted.as_str() == name);
            if !enabled {
                continue;
            }
            let collector: Arc<dyn Collector> = match name {
                topic_offset::NAME => Arc::new(TopicOffsetCollector::new(
                    client.clone(),
                    config.namesrv_addr.clone(),
                )),
                _ => continue,
            };
            collectors.push((name, collector));
        }

        Ok(Self::from_collectors(collectors, !config.disable_exporter_metrics))
    }

    pub(crate) fn from_collectors(
        collectors: Vec<(&'static str, Arc<dyn Collector>)>,
        exporter_metrics: bool,
    ) -> Self {
        CollectorRegistry {
            collectors: collectors.into_iter().collect(),
            exporter_metrics,
        }
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.collectors.keys().copied().collect()
    }

    /// Resolves the `collect[]` filters of a request. No filter selects every
    /// enabled collector.
    pub(crate) fn select(
        &self,
        filters: &[String],
    ) -> std::result::Result<Vec<(&'static str, Arc<dyn Collector>)>, SelectError> {
        if filters.is_empty() {
            return Ok(self
                .collectors
                .iter()
                .map(|(name, collector)| (*name, collector.clone()))
                .collect());
        }

        let mut selected: Vec<(&'static str, Arc<dyn Collector>)> = Vec::new();
        for filter in filters {
            match self.collectors.get_key_value(filter.as_str()) {
                Some((name, collector)) => {
                    if !selected.iter().any(|(picked, _)| picked == name) {
                        selected.push((*name, collector.clone()));
                    }
                }
                None if AVAILABLE_COLLECTORS
                    .iter()
                    .any(|(known, _)| *known == filter.as_str()) =>
                {
                    return Err(SelectError::Disabled(filter.clone()))
                }
                None => return Err(SelectError::Unknown(filter.clone())),
            }
        }
        Ok(selected)
    }

    /// Runs the selected collectors concurrently and renders their samples.
    ///
    /// A failing collector is logged and reported through its success gauge;
    /// it never fails the scrape. Scrape counters go to the process-wide recorder.
    pub(crate) async fn scrape(
        &self,
        selected: &[(&'static str, Arc<dyn Collector>)],
        deadline: &Deadline,
    ) -> String {
        if self.exporter_metrics {
            metrics::counter!(EXPORTER_SCRAPES_TOTAL.name).increment(1);
            metrics::gauge!(EXPORTER_BUILD_INFO.name, "version" => env!("CARGO_PKG_VERSION"))
                .set(1.0);
        }

        let runs = selected.iter().map(|(name, collector)| async move {
            let started = Instant::now();
            let result = collector.update(deadline).await;
            (*name, started.elapsed(), result)
        });

        let results = futures::future::join_all(runs).await;

        let recorder = scrape_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            for (name, elapsed, result) in results {
                let success = match result {
                    Ok(samples) => {
                        debug!(
                            collector = name,
                            "collector returned {} samples in {:?}",
                            samples.len(),
                            elapsed
                        );
                        record_samples(&samples);
                        1.0
                    }
                    Err(err) => {
                        warn!(collector = name, "collector failed after {:?}: {:#}", elapsed, err);
                        0.0
                    }
                };

                if self.exporter_metrics {
                    metrics::gauge!(SCRAPE_COLLECTOR_SUCCESS.name, "collector" => name)
                        .set(success);
                    metrics::gauge!(SCRAPE_COLLECTOR_DURATION_SECONDS.name, "collector" => name)
                        .set(elapsed.as_secs_f64());
                }
            }
        });

        handle.render()
    }
}

fn record_samples(samples: &[Sample]) {
    for sample in samples {
        metrics::gauge!(sample.name, &sample.labels).set(sample.value);
    }
}
