use anyhow::{Context, Result};
use async_trait::async_trait;
use rmq_client::{ClusterClient, Deadline, TopicOffsets};
use tracing::debug;

use super::{Collector, Sample};
use crate::exporter_metrics::{TOPIC_LAST_UPDATE_TIMESTAMP, TOPIC_OFFSET};

pub(crate) const NAME: &str = "topic_offset";

/// Publishes, per topic, the largest queue offset and the latest update time.
pub(crate) struct TopicOffsetCollector {
    client: ClusterClient,
    namesrv_addr: String,
}

impl TopicOffsetCollector {
    pub(crate) fn new(client: ClusterClient, namesrv_addr: String) -> Self {
        TopicOffsetCollector {
            client,
            namesrv_addr,
        }
    }
}

#[async_trait]
impl Collector for TopicOffsetCollector {
    async fn update(&self, deadline: &Deadline) -> Result<Vec<Sample>> {
        let offsets = self
            .client
            .collect_topic_offsets(&self.namesrv_addr, deadline)
            .await
            .with_context(|| format!("unable to scrape nameserver {}", self.namesrv_addr))?;

        debug!(namesrv = %self.namesrv_addr, "collected offsets for {} topics", offsets.len());
        Ok(topic_offset_samples(&offsets))
    }
}

pub(crate) fn topic_offset_samples(offsets: &TopicOffsets) -> Vec<Sample> {
    offsets
        .iter()
        .flat_map(|(topic, aggregate)| {
            [
                Sample::gauge(
                    TOPIC_OFFSET.name,
                    vec![("topic", topic.clone())],
                    aggregate.max_offset as f64,
                ),
                Sample::gauge(
                    TOPIC_LAST_UPDATE_TIMESTAMP.name,
                    vec![("topic", topic.clone())],
                    aggregate.last_update_timestamp as f64,
                ),
            ]
        })
        .collect()
}
