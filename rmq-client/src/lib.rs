//! RMQ-Client
//!
//! Client for the RocketMQ administrative remoting protocol: topic discovery,
//! route resolution and per-topic offset aggregation.

mod client;
pub use client::{ClusterClient, ClusterClientBuilder, TopicOffsets, DEFAULT_CALL_TIMEOUT};

pub mod errors;
pub use errors::ClientError;

mod deadline;
pub use deadline::Deadline;

mod remoting_client;
pub use remoting_client::RemotingClient;

mod connection_manager;
pub use connection_manager::ConnectionOptions;

mod route_resolver;

mod stats_aggregator;
