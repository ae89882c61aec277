#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rmq_core::{response_code, RemotingCodec, RemotingCommand};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

/// What the mock endpoint does with one request.
pub enum Reply {
    /// Answer with this command; the request's opaque is copied onto it.
    Respond(RemotingCommand),
    /// Answer after a pause, letting later requests overtake this one.
    Delayed(Duration, RemotingCommand),
    /// Never answer.
    Silent,
}

type Handler = Arc<dyn Fn(&RemotingCommand) -> Reply + Send + Sync>;

/// In-process nameserver or broker speaking the remoting frame protocol.
pub struct MockServer {
    pub addr: String,
    requests: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> MockServer
    where
        F: Fn(&RemotingCommand) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr").to_string();
        let handler: Handler = Arc::new(handler);
        let requests = Arc::new(AtomicUsize::new(0));

        let accept_task = {
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_connection(stream, handler.clone(), requests.clone()));
                }
            })
        };

        MockServer {
            addr,
            requests,
            accept_task,
        }
    }

    /// Number of requests received so far, over all connections.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(stream: TcpStream, handler: Handler, requests: Arc<AtomicUsize>) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, RemotingCodec::new());
    let mut writer = FramedWrite::new(write_half, RemotingCodec::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<RemotingCommand>();

    tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            if writer.send(response).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(request)) = reader.next().await {
        requests.fetch_add(1, Ordering::SeqCst);
        let opaque = request.opaque;
        match handler(&request) {
            Reply::Respond(response) => {
                let _ = tx.send(as_response(response, opaque));
            }
            Reply::Delayed(pause, response) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(pause).await;
                    let _ = tx.send(as_response(response, opaque));
                });
            }
            Reply::Silent => {}
        }
    }
}

fn as_response(mut response: RemotingCommand, opaque: i32) -> RemotingCommand {
    response.opaque = opaque;
    response.mark_response();
    response
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind free port");
    let addr: SocketAddr = listener.local_addr().expect("free port addr");
    drop(listener);
    addr.to_string()
}

/// Listener that never accepts and whose backlog is full, so new handshakes stall.
pub struct StalledEndpoint {
    pub addr: String,
    _listener: TcpListener,
    _queued: Vec<TcpStream>,
}

pub async fn stalled_endpoint() -> StalledEndpoint {
    let socket = TcpSocket::new_v4().expect("stalled socket");
    socket
        .bind("127.0.0.1:0".parse().expect("loopback"))
        .expect("bind stalled endpoint");
    let listener = socket.listen(1).expect("listen");
    let addr = listener.local_addr().expect("stalled endpoint addr");

    let mut queued = Vec::new();
    for _ in 0..16 {
        match tokio::time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => queued.push(stream),
            _ => break,
        }
    }

    StalledEndpoint {
        addr: addr.to_string(),
        _listener: listener,
        _queued: queued,
    }
}

pub fn success(body: impl Into<String>) -> Reply {
    let body: String = body.into();
    Reply::Respond(RemotingCommand::new_response(response_code::SUCCESS, 0).with_body(body))
}

pub fn failure(code: i32, remark: &str) -> Reply {
    Reply::Respond(RemotingCommand::new_response(code, 0).with_remark(remark))
}

pub fn topic_list_body(topics: &[&str]) -> String {
    serde_json::json!({ "topicList": topics }).to_string()
}

/// Route body in the nameserver's encoding: replica ids appear as bare integer keys.
pub fn route_body(brokers: &[(&str, &[&str])]) -> String {
    let broker_datas: Vec<String> = brokers
        .iter()
        .map(|(name, addrs)| {
            let addrs: Vec<String> = addrs
                .iter()
                .enumerate()
                .map(|(id, addr)| format!("{}:\"{}\"", id, addr))
                .collect();
            format!(
                "{{\"brokerAddrs\":{{{}}},\"brokerName\":\"{}\",\"cluster\":\"DefaultCluster\"}}",
                addrs.join(","),
                name
            )
        })
        .collect();
    let queue_datas: Vec<String> = brokers
        .iter()
        .map(|(name, _)| {
            format!(
                "{{\"brokerName\":\"{}\",\"perm\":6,\"readQueueNums\":4,\"topicSynFlag\":0,\"writeQueueNums\":4}}",
                name
            )
        })
        .collect();

    format!(
        "{{\"brokerDatas\":[{}],\"filterServerTable\":{{}},\"queueDatas\":[{}]}}",
        broker_datas.join(","),
        queue_datas.join(",")
    )
}

pub fn queue_segment(topic: &str, broker: &str, queue_id: i32, max_offset: i64, timestamp: i64) -> String {
    format!(
        "{{\"brokerName\":\"{}\",\"queueId\":{},\"topic\":\"{}\"}}:{{\"lastUpdateTimestamp\":{},\"maxOffset\":{},\"minOffset\":0}}",
        broker, queue_id, topic, timestamp, max_offset
    )
}

/// Stats body in the broker's encoding: an object-keyed `offsetTable`.
pub fn stats_body_from_segments(segments: &[String]) -> String {
    format!("{{\"offsetTable\":{{{}}}}}", segments.join(","))
}

/// Stats body with one queue per `(max_offset, last_update_timestamp)` pair.
pub fn stats_body(topic: &str, broker: &str, queues: &[(i64, i64)]) -> String {
    let segments: Vec<String> = queues
        .iter()
        .enumerate()
        .map(|(queue_id, (max_offset, timestamp))| {
            queue_segment(topic, broker, queue_id as i32, *max_offset, *timestamp)
        })
        .collect();
    stats_body_from_segments(&segments)
}
