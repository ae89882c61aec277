use std::collections::BTreeMap;
use std::time::Duration;

use rmq_core::{QueueStats, TopicOffsetAggregate, TopicRouteData};
use tracing::{debug, warn};

use crate::{
    connection_manager::ConnectionOptions,
    deadline::Deadline,
    errors::Result,
    remoting_client::RemotingClient,
    route_resolver::RouteResolver,
    stats_aggregator::StatsAggregator,
};

/// Default bound of a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(2000);

/// Result of one scrape: topic name to its aggregated offsets.
///
/// Topics for which no broker produced a record are absent.
pub type TopicOffsets = BTreeMap<String, TopicOffsetAggregate>;

/// The entry point for querying a RocketMQ cluster's administrative protocol.
///
/// `ClusterClient` owns the connection table and the correlation id counter used
/// by every call it makes. It enumerates topics and routes through a nameserver
/// and queries offset statistics from the brokers those routes name. Clones share
/// the same connections, so one instance can serve concurrent scrapes.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    remoting: RemotingClient,
    route_resolver: RouteResolver,
    stats_aggregator: StatsAggregator,
}

impl ClusterClient {
    /// Initializes a new `ClusterClientBuilder` instance.
    pub fn builder() -> ClusterClientBuilder {
        ClusterClientBuilder::default()
    }

    /// Lists all topics registered with the nameserver at `namesrv_addr`.
    ///
    /// A non-success status from the nameserver is logged and yields an empty list.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<String>)`: the topic names, in the order the nameserver reported them.
    /// - `Err(e)`: the nameserver could not be reached, did not answer in time,
    ///   or sent a body that does not decode as a topic list.
    pub async fn list_topics(&self, namesrv_addr: &str, deadline: &Deadline) -> Result<Vec<String>> {
        self.route_resolver.list_topics(namesrv_addr, deadline).await
    }

    /// Resolves the routing table of `topic`.
    ///
    /// Bare integer keys in the nameserver's response are quoted before decoding.
    /// Every call returns a freshly decoded route; nothing is cached between calls.
    pub async fn resolve_route(
        &self,
        namesrv_addr: &str,
        topic: &str,
        deadline: &Deadline,
    ) -> Result<TopicRouteData> {
        self.route_resolver
            .resolve_route(namesrv_addr, topic, deadline)
            .await
    }

    /// Queue records of `topic` held by the broker at `broker_addr`.
    pub async fn topic_queue_stats(
        &self,
        broker_addr: &str,
        topic: &str,
        deadline: &Deadline,
    ) -> Result<Vec<QueueStats>> {
        self.stats_aggregator
            .broker_queue_stats(broker_addr, topic, deadline)
            .await
    }

    /// Aggregates the offsets of `topic` across `broker_addrs`.
    ///
    /// The result carries the largest `maxOffset` and the latest
    /// `lastUpdateTimestamp` of every queue on every broker that answered.
    /// Unreachable brokers and malformed records are logged and skipped.
    /// Returns `None` when no broker contributed a record.
    pub async fn aggregate_offsets(
        &self,
        topic: &str,
        broker_addrs: &[String],
        deadline: &Deadline,
    ) -> Option<TopicOffsetAggregate> {
        self.stats_aggregator
            .aggregate_offsets(topic, broker_addrs, deadline)
            .await
    }

    /// Runs one full scrape: topics, then routes, then per-broker stats.
    ///
    /// Only the topic enumeration can fail the scrape. A topic whose route
    /// cannot be resolved is logged and left out of the result.
    pub async fn collect_topic_offsets(
        &self,
        namesrv_addr: &str,
        deadline: &Deadline,
    ) -> Result<TopicOffsets> {
        let topics = self.list_topics(namesrv_addr, deadline).await?;
        let mut offsets = TopicOffsets::new();

        for topic in topics {
            let route = match self.resolve_route(namesrv_addr, &topic, deadline).await {
                Ok(route) => route,
                Err(err) => {
                    warn!(topic = %topic, error = %err, "unable to resolve topic route");
                    continue;
                }
            };

            let broker_addrs = route.broker_addresses();
            if broker_addrs.is_empty() {
                debug!(topic = %topic, "topic route names no broker");
                continue;
            }

            if let Some(aggregate) = self.aggregate_offsets(&topic, &broker_addrs, deadline).await {
                offsets.insert(topic, aggregate);
            }
        }

        Ok(offsets)
    }

    /// Closes every open connection. Later calls reconnect on demand.
    pub async fn close(&self) {
        self.remoting.close().await;
    }
}

/// A builder for configuring and creating a `ClusterClient` instance.
///
/// # Fields
///
/// - `call_timeout`: bound of every single remote call, connection setup included.
#[derive(Debug, Clone)]
pub struct ClusterClientBuilder {
    call_timeout: Duration,
}

impl Default for ClusterClientBuilder {
    fn default() -> Self {
        ClusterClientBuilder {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ClusterClientBuilder {
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Constructs the `ClusterClient`. No connection is opened until the first call.
    pub fn build(self) -> ClusterClient {
        let remoting = RemotingClient::new(ConnectionOptions::default());
        let route_resolver = RouteResolver::new(remoting.clone(), self.call_timeout);
        let stats_aggregator = StatsAggregator::new(remoting.clone(), self.call_timeout);

        ClusterClient {
            remoting,
            route_resolver,
            stats_aggregator,
        }
    }
}
