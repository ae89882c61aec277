use crate::errors::{ClientError, Result};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rmq_core::{codec::MAX_FRAME_SIZE, RemotingCodec, RemotingCommand};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

// commands queued for the writer task before senders wait
const OUTBOUND_QUEUE: usize = 256;

type PendingTable = Arc<DashMap<i32, oneshot::Sender<RemotingCommand>>>;

#[derive(Debug, Clone)]
enum ConnectionStatus {
    Connected(Arc<RemotingConnection>),
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub max_frame_size: usize,
    pub tcp_nodelay: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            max_frame_size: MAX_FRAME_SIZE,
            tcp_nodelay: true,
        }
    }
}

/// Connection table keyed by endpoint address (`host:port`).
///
/// A connection is reused until it reports itself closed, then replaced on the next call.
/// Each address has its own slot, so a slow handshake only holds up callers of that address.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionManager {
    connections: Arc<DashMap<String, ConnectionSlot>>,
    pub(crate) connection_options: ConnectionOptions,
}

type ConnectionSlot = Arc<Mutex<ConnectionStatus>>;

impl ConnectionManager {
    pub(crate) fn new(connection_options: ConnectionOptions) -> Self {
        ConnectionManager {
            connections: Arc::new(DashMap::new()),
            connection_options,
        }
    }

    pub(crate) async fn get_connection(&self, addr: &str) -> Result<Arc<RemotingConnection>> {
        // the table shard lock is released before any await
        let slot = self
            .connections
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConnectionStatus::Disconnected)))
            .clone();

        let mut status = slot.lock().await;
        if let ConnectionStatus::Connected(remoting_cnx) = &*status {
            if !remoting_cnx.is_closed() {
                return Ok(remoting_cnx.clone());
            }
        }

        match RemotingConnection::connect(addr, &self.connection_options).await {
            Ok(new_cnx) => {
                let remoting_cnx = Arc::new(new_cnx);
                *status = ConnectionStatus::Connected(remoting_cnx.clone());
                Ok(remoting_cnx)
            }
            Err(err) => {
                *status = ConnectionStatus::Disconnected;
                Err(err)
            }
        }
    }

    /// Drops every cached connection; in-flight calls on them fail with a network error.
    pub(crate) async fn close_all(&self) {
        let slots: Vec<ConnectionSlot> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.connections.clear();

        for slot in slots {
            let mut status = slot.lock().await;
            if let ConnectionStatus::Connected(remoting_cnx) = &*status {
                remoting_cnx.close();
            }
            *status = ConnectionStatus::Disconnected;
        }
    }
}

/// One TCP connection to a nameserver or broker.
///
/// A writer task drains the outbound queue into the socket; a reader task routes
/// every response to the caller waiting on its correlation id.
#[derive(Debug)]
pub(crate) struct RemotingConnection {
    addr: String,
    outbound: mpsc::Sender<RemotingCommand>,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RemotingConnection {
    pub(crate) async fn connect(addr: &str, options: &ConnectionOptions) -> Result<Self> {
        info!("Establishing new remoting connection to {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::network(addr, e))?;
        if let Err(e) = stream.set_nodelay(options.tcp_nodelay) {
            debug!(addr = %addr, error = %e, "unable to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(
            read_half,
            RemotingCodec::with_max_frame_size(options.max_frame_size),
        );
        let mut writer = FramedWrite::new(
            write_half,
            RemotingCodec::with_max_frame_size(options.max_frame_size),
        );

        let (outbound, mut outbound_rx) = mpsc::channel::<RemotingCommand>(OUTBOUND_QUEUE);
        let pending: PendingTable = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let read_task = {
            let addr = addr.to_string();
            let pending = pending.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                while let Some(frame) = reader.next().await {
                    match frame {
                        Ok(command) if command.is_response() => {
                            match pending.remove(&command.opaque) {
                                Some((_, waiter)) => {
                                    let _ = waiter.send(command);
                                }
                                None => debug!(
                                    addr = %addr,
                                    opaque = command.opaque,
                                    "dropping response with no waiting caller"
                                ),
                            }
                        }
                        Ok(command) => {
                            debug!(addr = %addr, code = command.code, "ignoring request pushed by the server")
                        }
                        Err(e) => {
                            warn!(addr = %addr, error = %e, "failed to decode remoting frame");
                            break;
                        }
                    }
                }
                debug!(addr = %addr, "remoting connection read side closed");
                shutdown(&closed, &pending);
            })
        };

        let write_task = {
            let addr = addr.to_string();
            let pending = pending.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                while let Some(command) = outbound_rx.recv().await {
                    if let Err(e) = writer.send(command).await {
                        warn!(addr = %addr, error = %e, "failed to write remoting frame");
                        break;
                    }
                }
                shutdown(&closed, &pending);
            })
        };

        Ok(RemotingConnection {
            addr: addr.to_string(),
            outbound,
            pending,
            closed,
            tasks: vec![read_task, write_task],
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends `command` and waits for the response carrying the same opaque.
    ///
    /// Not bounded in time by itself; the caller wraps it in a timeout. Dropping the
    /// future releases the pending slot.
    pub(crate) async fn request(&self, command: RemotingCommand) -> Result<RemotingCommand> {
        let opaque = command.opaque;
        let (waiter, response) = oneshot::channel();

        if self.pending.insert(opaque, waiter).is_some() {
            warn!(addr = %self.addr, opaque, "replaced an in-flight request with the same opaque");
        }
        let _slot = PendingSlot {
            pending: &self.pending,
            opaque,
        };

        // shutdown flags before it clears, so a slot inserted after the clear is caught here
        if self.is_closed() {
            return Err(ClientError::network(&self.addr, "connection closed"));
        }

        self.outbound
            .send(command)
            .await
            .map_err(|_| ClientError::network(&self.addr, "connection closed"))?;

        response.await.map_err(|_| {
            ClientError::network(&self.addr, "connection closed before the response arrived")
        })
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(addr = %self.addr, "closing remoting connection");
        }
        for task in &self.tasks {
            task.abort();
        }
        self.pending.clear();
    }
}

impl Drop for RemotingConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn shutdown(closed: &AtomicBool, pending: &DashMap<i32, oneshot::Sender<RemotingCommand>>) {
    closed.store(true, Ordering::SeqCst);
    // dropping the senders wakes every waiter with a closed-channel error
    pending.clear();
}

struct PendingSlot<'a> {
    pending: &'a DashMap<i32, oneshot::Sender<RemotingCommand>>,
    opaque: i32,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.opaque);
    }
}
