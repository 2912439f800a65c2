//! TCP transport.
//!
//! Addresses use the `tcp://host:port` form. After the socket connects the
//! endpoint announces itself with a greeting message `[identity, kind]`,
//! then exchanges length-prefixed multipart messages (see
//! [`skylink_protocol::encode_message`]).
//!
//! Reading and writing happen on two background tasks connected to the
//! endpoint by bounded channels, which is what makes `send` and `recv`
//! cancel-safe. Dropping the endpoint aborts the reader; the writer drains
//! whatever is still queued and then shuts the socket down.

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use skylink_core::Identity;
use skylink_protocol::{FrameReader, FrameSet, FrameWriter};

use super::{
    BoxFuture, Connector, Endpoint, EndpointKind, TransportError, TransportResult,
};

/// Default depth of the send and receive queues.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Opens [`TcpEndpoint`]s.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    queue_depth: usize,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the depth of the send and receive queues (at least 1).
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }
}

/// Turn `tcp://host:port` into a `host:port` socket address string.
pub fn parse_address(address: &str) -> TransportResult<String> {
    let invalid = |reason: &str| TransportError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(address).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "tcp" {
        return Err(invalid("scheme must be tcp"));
    }
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("missing host"))?;
    let port = url.port().ok_or_else(|| invalid("missing port"))?;

    Ok(format!("{host}:{port}"))
}

impl Connector for TcpConnector {
    type Endpoint = TcpEndpoint;

    fn connect<'a>(
        &'a self,
        address: &'a str,
        identity: &'a Identity,
        kind: EndpointKind,
    ) -> BoxFuture<'a, TransportResult<TcpEndpoint>> {
        Box::pin(async move {
            let target = parse_address(address)?;

            debug!(address = %address, kind = kind.as_str(), "connecting");
            let stream = TcpStream::connect(&target)
                .await
                .map_err(|source| TransportError::Connect {
                    address: address.to_string(),
                    source,
                })?;
            stream.set_nodelay(true)?;

            let (read_half, write_half) = stream.into_split();
            let mut writer = FrameWriter::new(write_half);
            writer
                .write_message(&FrameSet::from([identity.as_str(), kind.as_str()]))
                .await?;

            let (outgoing, queued) = mpsc::channel(self.queue_depth);
            let (delivered, incoming) = mpsc::channel(self.queue_depth);

            let reader = tokio::spawn(read_loop(FrameReader::new(read_half), delivered));
            tokio::spawn(write_loop(writer, queued));

            debug!(address = %address, "connected");
            Ok(TcpEndpoint {
                outgoing,
                incoming,
                reader,
            })
        })
    }
}

async fn read_loop(
    mut reader: FrameReader<OwnedReadHalf>,
    delivered: mpsc::Sender<TransportResult<FrameSet>>,
) {
    loop {
        let result = match reader.read_message().await {
            Ok(Some(frames)) => Ok(frames),
            Ok(None) => {
                debug!("peer closed the connection");
                break;
            }
            Err(e) => Err(TransportError::from(e)),
        };

        let failed = result.is_err();
        if delivered.send(result).await.is_err() || failed {
            break;
        }
    }
}

async fn write_loop(
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut queued: mpsc::Receiver<FrameSet>,
) {
    while let Some(frames) = queued.recv().await {
        if let Err(e) = writer.write_message(&frames).await {
            warn!(error = %e, "failed to write message");
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "socket shutdown failed");
    }
}

/// A connected TCP endpoint.
#[derive(Debug)]
pub struct TcpEndpoint {
    outgoing: mpsc::Sender<FrameSet>,
    incoming: mpsc::Receiver<TransportResult<FrameSet>>,
    reader: JoinHandle<()>,
}

impl Endpoint for TcpEndpoint {
    fn send(&mut self, frames: FrameSet) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.outgoing
                .send(frames)
                .await
                .map_err(|_| TransportError::Closed)
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<FrameSet>> {
        Box::pin(async move {
            self.incoming
                .recv()
                .await
                .unwrap_or(Err(TransportError::Closed))
        })
    }

    fn try_recv(&mut self) -> Option<TransportResult<FrameSet>> {
        match self.incoming.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TransportError::Closed)),
        }
    }
}

impl Drop for TcpEndpoint {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use skylink_core::Role;

    use super::*;

    fn identity() -> Identity {
        Identity::with_session(Role::Requester, "/test", "secret", "abc").unwrap()
    }

    #[test]
    fn address_forms() {
        assert_eq!(parse_address("tcp://127.0.0.1:8081").unwrap(), "127.0.0.1:8081");
        assert_eq!(parse_address("tcp://localhost:9").unwrap(), "localhost:9");
        assert!(matches!(
            parse_address("http://127.0.0.1:8081"),
            Err(TransportError::InvalidAddress { .. })
        ));
        assert!(parse_address("tcp://127.0.0.1").is_err());
        assert!(parse_address("127.0.0.1:8081").is_err());
    }

    #[tokio::test]
    async fn greeting_then_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("tcp://{}", listener.local_addr().unwrap());

        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut reader = FrameReader::new(read_half);
            let mut writer = FrameWriter::new(write_half);

            let greeting = reader.read_message().await.unwrap().unwrap();
            let request = reader.read_message().await.unwrap().unwrap();
            writer.write_message(&FrameSet::from(["OK"])).await.unwrap();

            // endpoint dropped: clean EOF
            let eof = reader.read_message().await.unwrap();
            (greeting, request, eof)
        });

        let mut endpoint = TcpConnector::new()
            .connect(&address, &identity(), EndpointKind::Sync)
            .await
            .unwrap();
        endpoint
            .send(FrameSet::from(["OC", "room"]))
            .await
            .unwrap();
        assert_eq!(endpoint.recv().await.unwrap(), FrameSet::from(["OK"]));
        drop(endpoint);

        let (greeting, request, eof) = broker.await.unwrap();
        assert_eq!(greeting, FrameSet::from(["req:/test:secret:abc", "req"]));
        assert_eq!(request, FrameSet::from(["OC", "room"]));
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn peer_hangup_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("tcp://{}", listener.local_addr().unwrap());

        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut endpoint = TcpConnector::new()
            .connect(&address, &identity(), EndpointKind::Async)
            .await
            .unwrap();
        broker.await.unwrap();

        assert!(endpoint.recv().await.is_err());
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("tcp://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = TcpConnector::new()
            .connect(&address, &identity(), EndpointKind::Sync)
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
