use crate::{
    connection_manager::{ConnectionManager, ConnectionOptions},
    errors::{ClientError, Result},
};

use rmq_core::RemotingCommand;
use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Source of correlation ids for one client.
///
/// Every outgoing request gets a distinct value among those in flight; the
/// counter wraps from `i32::MAX` to `i32::MIN`.
#[derive(Debug)]
pub(crate) struct OpaqueAllocator {
    next: AtomicI32,
}

impl OpaqueAllocator {
    pub(crate) fn new() -> Self {
        Self::starting_at(0)
    }

    pub(crate) fn starting_at(first: i32) -> Self {
        OpaqueAllocator {
            next: AtomicI32::new(first),
        }
    }

    pub(crate) fn allocate(&self) -> i32 {
        // fetch_add wraps on overflow
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Request/response transport over the remoting protocol.
///
/// Cheap to clone; clones share the connection table and the correlation id
/// counter, so concurrent calls from any clone never collide.
#[derive(Debug, Clone)]
pub struct RemotingClient {
    cnx_manager: Arc<ConnectionManager>,
    opaque: Arc<OpaqueAllocator>,
}

impl RemotingClient {
    pub fn new(connection_options: ConnectionOptions) -> Self {
        RemotingClient {
            cnx_manager: Arc::new(ConnectionManager::new(connection_options)),
            opaque: Arc::new(OpaqueAllocator::new()),
        }
    }

    pub fn allocate_opaque(&self) -> i32 {
        self.opaque.allocate()
    }

    /// Sends `command` to `addr` and waits for its response.
    ///
    /// The whole exchange, connection setup included, is bounded by `timeout`.
    /// A non-success status is returned as a regular response; interpreting it
    /// is up to the caller.
    pub async fn invoke_sync(
        &self,
        addr: &str,
        mut command: RemotingCommand,
        timeout: Duration,
    ) -> Result<RemotingCommand> {
        let deadline = Instant::now() + timeout;
        command.opaque = self.allocate_opaque();
        let opaque = command.opaque;
        let code = command.code;

        let remoting_cnx = match timeout_at(deadline, self.cnx_manager.get_connection(addr)).await
        {
            Ok(cnx) => cnx?,
            Err(_) => {
                warn!(addr = %addr, code, "connect timed out after {:?}", timeout);
                return Err(ClientError::timeout(addr, timeout));
            }
        };

        debug!(addr = %addr, code, opaque, "sending remoting request");

        match timeout_at(deadline, remoting_cnx.request(command)).await {
            Ok(Ok(response)) => {
                debug!(addr = %addr, "received remoting response {}", response);
                Ok(response)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                // the pending slot is released on drop; a late response is discarded by the reader
                warn!(addr = %addr, code, opaque, "request timed out after {:?}", timeout);
                Err(ClientError::timeout(addr, timeout))
            }
        }
    }

    /// Closes every open connection. The client stays usable and reconnects on demand.
    pub async fn close(&self) {
        self.cnx_manager.close_all().await;
    }
}

impl Default for RemotingClient {
    fn default() -> Self {
        Self::new(ConnectionOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_opaque_unique_across_threads() {
        let allocator = Arc::new(OpaqueAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    (0..1000).map(|_| allocator.allocate()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        for handle in handles {
            for opaque in handle.join().unwrap() {
                assert!(seen.insert(opaque), "duplicate opaque {opaque}");
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&7999));
    }

    #[test]
    fn test_opaque_wraps_around() {
        let allocator = OpaqueAllocator::starting_at(i32::MAX);
        assert_eq!(allocator.allocate(), i32::MAX);
        assert_eq!(allocator.allocate(), i32::MIN);
        assert_eq!(allocator.allocate(), i32::MIN + 1);
    }
}
