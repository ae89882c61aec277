use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::Result;
use crate::relaxed::quote_integer_keys;

/// Body of a `GET_ALL_TOPIC_LIST_FROM_NAMESERVER` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicList {
    #[serde(default)]
    pub topic_list: Vec<String>,
}

impl TopicList {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)?;
        Ok(serde_json::from_str(&quote_integer_keys(text))?)
    }
}

/// Queue layout of a topic on one broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueData {
    pub broker_name: String,
    #[serde(default)]
    pub read_queue_nums: i32,
    #[serde(default)]
    pub write_queue_nums: i32,
    #[serde(default)]
    pub perm: i32,
    #[serde(default)]
    pub topic_syn_flag: i32,
}

/// A broker group and the addresses of its replicas.
///
/// Replica ids are the cluster's map keys ("0", "1", ...). They are kept as
/// opaque strings and never interpreted as ranks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub broker_name: String,
    #[serde(default)]
    pub broker_addrs: BTreeMap<String, String>,
}

/// Routing table of a topic, decoded fresh for every resolution and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRouteData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_topic_conf: Option<String>,
    #[serde(default)]
    pub queue_datas: Vec<QueueData>,
    #[serde(default)]
    pub broker_datas: Vec<BrokerData>,
}

impl TopicRouteData {
    /// Decodes a route body, quoting the bare replica-id keys first.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)?;
        Ok(serde_json::from_str(&quote_integer_keys(text))?)
    }

    /// Every replica address of every broker group, each listed once, in route order.
    pub fn broker_addresses(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.broker_datas
            .iter()
            .flat_map(|broker| broker.broker_addrs.values())
            .filter(|addr| seen.insert(addr.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_BODY: &str = r#"{"brokerDatas":[{"brokerAddrs":{0:"10.0.0.1:10911",1:"10.0.0.2:10911"},"brokerName":"broker-a","cluster":"DefaultCluster"},{"brokerAddrs":{0:"10.0.0.3:10911"},"brokerName":"broker-b","cluster":"DefaultCluster"}],"filterServerTable":{},"queueDatas":[{"brokerName":"broker-a","perm":6,"readQueueNums":4,"topicSynFlag":0,"writeQueueNums":4},{"brokerName":"broker-b","perm":6,"readQueueNums":8,"topicSynFlag":0,"writeQueueNums":8}]}"#;

    #[test]
    fn test_decode_route_with_bare_keys() {
        let route = TopicRouteData::decode(ROUTE_BODY.as_bytes()).unwrap();

        assert_eq!(route.broker_datas.len(), 2);
        let broker_a = &route.broker_datas[0];
        assert_eq!(broker_a.broker_name, "broker-a");
        assert_eq!(broker_a.cluster.as_deref(), Some("DefaultCluster"));
        assert_eq!(broker_a.broker_addrs.get("0").map(String::as_str), Some("10.0.0.1:10911"));
        assert_eq!(broker_a.broker_addrs.get("1").map(String::as_str), Some("10.0.0.2:10911"));

        assert_eq!(route.queue_datas[1].read_queue_nums, 8);
    }

    #[test]
    fn test_broker_addresses_are_unique() {
        let mut route = TopicRouteData::decode(ROUTE_BODY.as_bytes()).unwrap();
        route.broker_datas.push(route.broker_datas[1].clone());

        assert_eq!(
            route.broker_addresses(),
            vec!["10.0.0.1:10911", "10.0.0.2:10911", "10.0.0.3:10911"]
        );
    }

    #[test]
    fn test_decode_topic_list() {
        let list = TopicList::decode(br#"{"topicList":["T1","T2","TBW102"]}"#).unwrap();
        assert_eq!(list.topic_list, vec!["T1", "T2", "TBW102"]);
        assert!(TopicList::decode(b"not json").is_err());
    }
}
