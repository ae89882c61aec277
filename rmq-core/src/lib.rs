//! RMQ-Core
//!
//! Wire types shared by the RocketMQ admin client and the exporter: remoting
//! commands, the frame codec, route/stats records and the relaxed-encoding normalizer.

pub mod codec;
pub mod command;
pub mod errors;
pub mod relaxed;
pub mod route;
pub mod stats;

pub use codec::RemotingCodec;
pub use command::{request_code, response_code, LanguageCode, RemotingCommand, SerializeType};
pub use errors::CodecError;
pub use route::{BrokerData, QueueData, TopicList, TopicRouteData};
pub use stats::{fold_queue_stats, MessageQueue, QueueStats, TopicOffset, TopicOffsetAggregate};
