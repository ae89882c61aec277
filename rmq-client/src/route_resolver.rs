use crate::{
    deadline::Deadline,
    errors::{ClientError, Result},
    remoting_client::RemotingClient,
};

use rmq_core::{RemotingCommand, TopicList, TopicRouteData};
use std::time::Duration;
use tracing::{debug, warn};

/// Topic discovery and route resolution against a nameserver.
#[derive(Debug, Clone)]
pub(crate) struct RouteResolver {
    remoting: RemotingClient,
    call_timeout: Duration,
}

impl RouteResolver {
    pub(crate) fn new(remoting: RemotingClient, call_timeout: Duration) -> Self {
        RouteResolver {
            remoting,
            call_timeout,
        }
    }

    /// Lists every topic the nameserver knows about.
    ///
    /// A non-success status yields an empty list. Transport and decode failures
    /// are returned, since the scrape has nothing to do without a topic list.
    pub(crate) async fn list_topics(
        &self,
        namesrv_addr: &str,
        deadline: &Deadline,
    ) -> Result<Vec<String>> {
        let timeout = deadline.call_timeout(namesrv_addr, self.call_timeout)?;
        let response = self
            .remoting
            .invoke_sync(namesrv_addr, RemotingCommand::get_all_topic_list(), timeout)
            .await?;

        if !response.is_success() {
            warn!(
                addr = %namesrv_addr,
                status = response.code,
                "topic list request failed: {}",
                response.remark.as_deref().unwrap_or_default()
            );
            return Ok(Vec::new());
        }

        let topic_list = TopicList::decode(&response.body)?;
        debug!(addr = %namesrv_addr, "nameserver reported {} topics", topic_list.topic_list.len());
        Ok(topic_list.topic_list)
    }

    /// Fetches and decodes the routing table of `topic`.
    pub(crate) async fn resolve_route(
        &self,
        namesrv_addr: &str,
        topic: &str,
        deadline: &Deadline,
    ) -> Result<TopicRouteData> {
        let timeout = deadline.call_timeout(namesrv_addr, self.call_timeout)?;
        let request = RemotingCommand::get_route_info_by_topic(topic);
        let code = request.code;
        let response = self
            .remoting
            .invoke_sync(namesrv_addr, request, timeout)
            .await?;

        if !response.is_success() {
            return Err(ClientError::ErrorStatus {
                addr: namesrv_addr.to_string(),
                code,
                status: response.code,
                remark: response.remark.unwrap_or_default(),
            });
        }

        Ok(TopicRouteData::decode(&response.body)?)
    }
}
