use crate::{
    deadline::Deadline,
    errors::{ClientError, Result},
    remoting_client::RemotingClient,
};

use rmq_core::{
    fold_queue_stats, relaxed::offset_table_segments, QueueStats, RemotingCommand,
    TopicOffsetAggregate,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Queries topic stats from brokers and folds them into one aggregate per topic.
#[derive(Debug, Clone)]
pub(crate) struct StatsAggregator {
    remoting: RemotingClient,
    call_timeout: Duration,
}

impl StatsAggregator {
    pub(crate) fn new(remoting: RemotingClient, call_timeout: Duration) -> Self {
        StatsAggregator {
            remoting,
            call_timeout,
        }
    }

    /// Queue records of `topic` held by one broker.
    ///
    /// Segments that fail to decode are logged and skipped; the rest are returned.
    pub(crate) async fn broker_queue_stats(
        &self,
        broker_addr: &str,
        topic: &str,
        deadline: &Deadline,
    ) -> Result<Vec<QueueStats>> {
        let timeout = deadline.call_timeout(broker_addr, self.call_timeout)?;
        let request = RemotingCommand::get_topic_stats_info(topic);
        let code = request.code;
        let response = self
            .remoting
            .invoke_sync(broker_addr, request, timeout)
            .await?;

        if !response.is_success() {
            return Err(ClientError::ErrorStatus {
                addr: broker_addr.to_string(),
                code,
                status: response.code,
                remark: response.remark.unwrap_or_default(),
            });
        }

        let body = response.body_str()?;
        let segments = offset_table_segments(body)?;

        let mut queues = Vec::with_capacity(segments.len());
        for segment in segments {
            match QueueStats::from_segment(segment) {
                Ok(queue) => queues.push(queue),
                Err(err) => warn!(
                    addr = %broker_addr,
                    topic = %topic,
                    error = %err,
                    "skipping malformed queue record"
                ),
            }
        }

        debug!(addr = %broker_addr, topic = %topic, "decoded {} queue records", queues.len());
        Ok(queues)
    }

    /// Aggregates `topic` across `broker_addrs`, visiting them in order.
    ///
    /// A failing broker contributes nothing. Returns `None` when no broker
    /// produced a single queue record.
    pub(crate) async fn aggregate_offsets(
        &self,
        topic: &str,
        broker_addrs: &[String],
        deadline: &Deadline,
    ) -> Option<TopicOffsetAggregate> {
        let mut aggregate: Option<TopicOffsetAggregate> = None;

        for broker_addr in broker_addrs {
            let queues = match self.broker_queue_stats(broker_addr, topic, deadline).await {
                Ok(queues) => queues,
                Err(err) => {
                    warn!(
                        addr = %broker_addr,
                        topic = %topic,
                        error = %err,
                        "unable to fetch topic stats from broker"
                    );
                    continue;
                }
            };

            if let Some(broker_aggregate) = fold_queue_stats(&queues) {
                match aggregate.as_mut() {
                    Some(total) => total.merge(&broker_aggregate),
                    None => aggregate = Some(broker_aggregate),
                }
            }
        }

        if aggregate.is_none() {
            debug!(topic = %topic, "no broker reported offsets for topic");
        }
        aggregate
    }
}
