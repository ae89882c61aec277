use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use crate::errors::Result;

/// Protocol version announced on every request.
pub const PROTOCOL_VERSION: i32 = 79;

// flag bits
const RPC_TYPE: i32 = 0;

/// Request codes understood by the nameserver and the brokers.
pub mod request_code {
    pub const GET_ROUTEINFO_BY_TOPIC: i32 = 105;
    pub const GET_TOPIC_STATS_INFO: i32 = 202;
    pub const GET_ALL_TOPIC_LIST_FROM_NAMESERVER: i32 = 206;
}

/// Response status codes; anything other than `SUCCESS` is a failure.
pub mod response_code {
    pub const SUCCESS: i32 = 0;
    pub const SYSTEM_ERROR: i32 = 1;
    pub const SYSTEM_BUSY: i32 = 2;
    pub const REQUEST_CODE_NOT_SUPPORTED: i32 = 3;
    pub const TOPIC_NOT_EXIST: i32 = 17;
}

/// Runtime tag carried in the `language` header field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LanguageCode {
    #[default]
    Java,
    Cpp,
    Dotnet,
    Python,
    Delphi,
    Erlang,
    Ruby,
    Other,
    Http,
    Go,
    Php,
    Oms,
    Rust,
    #[serde(other)]
    Unknown,
}

/// Encoding of the command header. Only JSON headers are produced or accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SerializeType {
    #[default]
    Json,
    Rocketmq,
}

impl SerializeType {
    pub fn code(self) -> u8 {
        match self {
            SerializeType::Json => 0,
            SerializeType::Rocketmq => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SerializeType::Json),
            1 => Some(SerializeType::Rocketmq),
            _ => None,
        }
    }
}

/// A single remoting frame, either a request or the response to one.
///
/// The header fields are serialized as JSON exactly as the cluster expects them;
/// the body travels as raw bytes after the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotingCommand {
    pub code: i32,
    #[serde(default)]
    pub language: LanguageCode,
    #[serde(default)]
    pub version: i32,
    // correlation identifier, echoed back by the peer on the response
    #[serde(default)]
    pub opaque: i32,
    #[serde(default)]
    pub flag: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_fields: Option<BTreeMap<String, String>>,
    #[serde(rename = "serializeTypeCurrentRPC", default)]
    pub serialize_type: SerializeType,
    #[serde(skip)]
    pub body: Bytes,
}

impl RemotingCommand {
    /// Builds a request with the fixed per-call fields. The correlation id is
    /// stamped by the remoting client when the command is sent.
    pub fn new_request(code: i32) -> Self {
        RemotingCommand {
            code,
            language: LanguageCode::Java,
            version: PROTOCOL_VERSION,
            opaque: 0,
            flag: 0,
            remark: None,
            ext_fields: None,
            serialize_type: SerializeType::Json,
            body: Bytes::new(),
        }
    }

    pub fn new_response(code: i32, opaque: i32) -> Self {
        let mut response = Self::new_request(code);
        response.opaque = opaque;
        response.mark_response();
        response
    }

    pub fn get_all_topic_list() -> Self {
        Self::new_request(request_code::GET_ALL_TOPIC_LIST_FROM_NAMESERVER)
    }

    pub fn get_route_info_by_topic(topic: impl Into<String>) -> Self {
        Self::new_request(request_code::GET_ROUTEINFO_BY_TOPIC).with_ext_field("topic", topic)
    }

    pub fn get_topic_stats_info(topic: impl Into<String>) -> Self {
        Self::new_request(request_code::GET_TOPIC_STATS_INFO).with_ext_field("topic", topic)
    }

    pub fn with_ext_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ext_fields
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn ext_field(&self, key: &str) -> Option<&str> {
        self.ext_fields
            .as_ref()
            .and_then(|fields| fields.get(key))
            .map(String::as_str)
    }

    pub fn mark_response(&mut self) {
        self.flag |= 1 << RPC_TYPE;
    }

    pub fn is_response(&self) -> bool {
        self.flag & (1 << RPC_TYPE) != 0
    }

    pub fn is_success(&self) -> bool {
        self.code == response_code::SUCCESS
    }

    pub fn body_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(&self.body)?)
    }
}

impl Display for RemotingCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code={} opaque={} flag={} body_len={}",
            self.code,
            self.opaque,
            self.flag,
            self.body.len()
        )
    }
}
