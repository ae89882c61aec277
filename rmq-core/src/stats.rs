use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::relaxed::{quote_integer_keys, rewrap_segment};

/// Identity of one queue: the key of an `offsetTable` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQueue {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub broker_name: String,
    #[serde(default)]
    pub queue_id: i32,
}

/// Offsets of one queue: the value of an `offsetTable` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicOffset {
    #[serde(default)]
    pub min_offset: i64,
    pub max_offset: i64,
    pub last_update_timestamp: i64,
}

/// One queue record of a topic stats response.
///
/// The rewrapped wire object names the queue identity `topicOffset` and the
/// offsets `messageQueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    #[serde(rename = "topicOffset")]
    pub queue: MessageQueue,
    #[serde(rename = "messageQueue")]
    pub offset: TopicOffset,
}

impl QueueStats {
    /// Decodes a raw segment produced by [`crate::relaxed::offset_table_segments`].
    pub fn from_segment(segment: &str) -> Result<Self> {
        let rewrapped = rewrap_segment(segment)?;
        Ok(serde_json::from_str(&quote_integer_keys(&rewrapped))?)
    }
}

/// Per-topic result of a scrape: the largest offset and the latest update time
/// seen across every queue of every broker scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicOffsetAggregate {
    pub max_offset: i64,
    pub last_update_timestamp: i64,
}

impl TopicOffsetAggregate {
    pub fn from_offset(offset: &TopicOffset) -> Self {
        TopicOffsetAggregate {
            max_offset: offset.max_offset,
            last_update_timestamp: offset.last_update_timestamp,
        }
    }

    /// Folds one queue into the aggregate. Offsets are not summed; the maximum wins.
    pub fn observe(&mut self, offset: &TopicOffset) {
        self.max_offset = self.max_offset.max(offset.max_offset);
        self.last_update_timestamp = self.last_update_timestamp.max(offset.last_update_timestamp);
    }

    pub fn merge(&mut self, other: &TopicOffsetAggregate) {
        self.max_offset = self.max_offset.max(other.max_offset);
        self.last_update_timestamp = self.last_update_timestamp.max(other.last_update_timestamp);
    }
}

/// Aggregates a set of queue records; `None` when there is nothing to aggregate.
pub fn fold_queue_stats<'a, I>(queues: I) -> Option<TopicOffsetAggregate>
where
    I: IntoIterator<Item = &'a QueueStats>,
{
    queues.into_iter().fold(None, |acc, queue| {
        let mut aggregate = acc.unwrap_or_else(|| TopicOffsetAggregate::from_offset(&queue.offset));
        aggregate.observe(&queue.offset);
        Some(aggregate)
    })
}
