//! Test: remoting client request/response exchange
//!
//! Purpose
//! - Validate that `invoke_sync` matches responses to requests by opaque, bounds every
//!   call by its timeout, and reports unreachable endpoints as network errors.
//!
//! Expected Behavior
//! - A silent endpoint yields a timeout error shortly after the timeout, never a hang.
//! - Concurrent calls on one connection each receive their own response even when
//!   the endpoint answers out of order.

mod common;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use common::{failure, stalled_endpoint, success, unreachable_addr, MockServer, Reply};
use rmq_client::{ConnectionOptions, RemotingClient};
use rmq_core::{request_code, response_code, RemotingCommand};

#[tokio::test]
async fn invoke_sync_round_trip() {
    let server = MockServer::start(|request| {
        assert_eq!(request.code, request_code::GET_ROUTEINFO_BY_TOPIC);
        assert_eq!(request.ext_field("topic"), Some("orders"));
        assert!(!request.is_response());
        success(format!("route-for-{}", request.ext_field("topic").unwrap_or_default()))
    })
    .await;

    let client = RemotingClient::new(ConnectionOptions::default());
    let response = client
        .invoke_sync(
            &server.addr,
            RemotingCommand::get_route_info_by_topic("orders"),
            Duration::from_millis(2000),
        )
        .await
        .expect("route response");

    assert!(response.is_success());
    assert!(response.is_response());
    assert_eq!(response.body_str().unwrap(), "route-for-orders");
}

#[tokio::test]
async fn invoke_sync_returns_non_success_status_as_response() {
    let server =
        MockServer::start(|_| failure(response_code::TOPIC_NOT_EXIST, "No topic route info")).await;

    let client = RemotingClient::default();
    let response = client
        .invoke_sync(
            &server.addr,
            RemotingCommand::get_route_info_by_topic("missing"),
            Duration::from_millis(2000),
        )
        .await
        .expect("status response");

    assert_eq!(response.code, response_code::TOPIC_NOT_EXIST);
    assert_eq!(response.remark.as_deref(), Some("No topic route info"));
}

#[tokio::test]
async fn invoke_sync_times_out_against_silent_endpoint() {
    let server = MockServer::start(|_| Reply::Silent).await;
    let client = RemotingClient::default();
    let timeout = Duration::from_millis(200);

    let started = Instant::now();
    let err = client
        .invoke_sync(&server.addr, RemotingCommand::get_all_topic_list(), timeout)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(500), "took {elapsed:?}");
}

#[tokio::test]
async fn invoke_sync_reports_unreachable_endpoint_as_network_error() {
    let addr = unreachable_addr().await;
    let client = RemotingClient::default();

    let err = client
        .invoke_sync(&addr, RemotingCommand::get_all_topic_list(), Duration::from_millis(2000))
        .await
        .unwrap_err();

    assert!(err.is_network(), "unexpected error: {err}");
}

#[tokio::test]
async fn concurrent_calls_share_one_connection() {
    // earlier requests are answered later, so responses arrive out of order
    let server = MockServer::start(|request| {
        let index: u64 = request
            .ext_field("topic")
            .and_then(|topic| topic.parse().ok())
            .unwrap_or_default();
        let response = RemotingCommand::new_response(response_code::SUCCESS, 0)
            .with_body(format!("topic-{index}"));
        Reply::Delayed(Duration::from_millis(200 - index * 20), response)
    })
    .await;

    let client = RemotingClient::default();
    let calls = (0..8u64).map(|index| {
        let client = client.clone();
        let addr = server.addr.clone();
        tokio::spawn(async move {
            let response = client
                .invoke_sync(
                    &addr,
                    RemotingCommand::get_route_info_by_topic(index.to_string()),
                    Duration::from_millis(2000),
                )
                .await
                .expect("response");
            (index, response)
        })
    });

    let mut opaques = BTreeSet::new();
    for call in futures::future::join_all(calls).await {
        let (index, response) = call.expect("task");
        assert_eq!(response.body_str().unwrap(), format!("topic-{index}"));
        assert!(opaques.insert(response.opaque));
    }

    assert_eq!(opaques.len(), 8);
    assert_eq!(server.request_count(), 8);
}

#[tokio::test]
async fn connection_stays_usable_after_timeout() {
    let server = MockServer::start(|request| {
        if request.ext_field("topic") == Some("slow") {
            Reply::Silent
        } else {
            success("ok")
        }
    })
    .await;
    let client = RemotingClient::default();

    let err = client
        .invoke_sync(
            &server.addr,
            RemotingCommand::get_route_info_by_topic("slow"),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let response = client
        .invoke_sync(
            &server.addr,
            RemotingCommand::get_route_info_by_topic("fast"),
            Duration::from_millis(2000),
        )
        .await
        .expect("call after timeout");
    assert_eq!(response.body_str().unwrap(), "ok");
}

#[tokio::test]
async fn stalled_handshake_does_not_block_other_endpoints() {
    let stalled = stalled_endpoint().await;
    let healthy = MockServer::start(|_| success("ok")).await;
    let client = RemotingClient::default();

    let stalled_call = {
        let client = client.clone();
        let addr = stalled.addr.clone();
        tokio::spawn(async move {
            client
                .invoke_sync(&addr, RemotingCommand::get_all_topic_list(), Duration::from_millis(1500))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let response = client
        .invoke_sync(&healthy.addr, RemotingCommand::get_all_topic_list(), Duration::from_millis(1000))
        .await
        .expect("healthy endpoint answers while another handshake stalls");
    assert_eq!(response.body_str().unwrap(), "ok");
    assert!(started.elapsed() < Duration::from_millis(500), "took {:?}", started.elapsed());

    let err = stalled_call.await.expect("task").unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");
}
