//! Request/response client.
//!
//! A [`Client`] performs administrative and broadcast calls. Every call is
//! one exchange: a request frame set goes out, exactly one reply comes
//! back. Calls are serialised by an async mutex held across the whole
//! exchange, so a client can be shared between tasks.
//!
//! A timed-out or failed exchange discards the connection. The next call
//! opens a fresh one, which means a late reply to an abandoned request is
//! never read as the answer to a newer one. Replies that arrive unasked on
//! a healthy connection are discarded before the next request goes out.

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use skylink_core::{Identity, Role};
use skylink_protocol::{
    ACCESS_TOKEN_LENGTH, ChannelKind, Command, FrameSet, ReplyOutcome, decode_reply, encode,
};

use crate::config::{ClientConfig, Settings};
use crate::error::{ClientError, ClientResult};
use crate::transport::{Connector, Endpoint, EndpointKind, TcpConnector, TransportResult};

struct Connection<E> {
    address: Option<String>,
    endpoint: Option<E>,
}

/// Broker client.
pub struct Client<C: Connector = TcpConnector> {
    identity: Identity,
    connector: C,
    config: ClientConfig,
    connection: Mutex<Connection<C::Endpoint>>,
}

impl Client<TcpConnector> {
    /// Client over TCP with default timeouts.
    pub fn new(vhost: &str, secret: &str) -> ClientResult<Self> {
        Self::with_connector(vhost, secret, TcpConnector::default(), ClientConfig::default())
    }

    /// Client configured from a settings file.
    ///
    /// The broker address is remembered but not dialled; the first call
    /// opens the connection.
    pub fn from_settings(settings: &Settings) -> ClientResult<Self> {
        let broker = settings
            .broker_url()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let mut client = Self::with_connector(
            &broker.vhost,
            &broker.secret,
            TcpConnector::default(),
            settings.client_config(),
        )?;
        client.connection.get_mut().address = Some(broker.address);
        Ok(client)
    }
}

impl<C: Connector> Client<C> {
    pub fn with_connector(
        vhost: &str,
        secret: &str,
        connector: C,
        config: ClientConfig,
    ) -> ClientResult<Self> {
        let identity = Identity::generate(Role::Requester, vhost, secret)?;
        Ok(Self {
            identity,
            connector,
            config,
            connection: Mutex::new(Connection {
                address: None,
                endpoint: None,
            }),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to the broker at `address`, replacing any open connection.
    pub async fn connect(&self, address: &str) -> ClientResult<()> {
        let mut connection = self.connection.lock().await;
        connection.endpoint = None;
        connection.address = Some(address.to_string());

        let endpoint = self.open(address).await?;
        connection.endpoint = Some(endpoint);
        Ok(())
    }

    /// Close the connection and forget the address. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        if connection.endpoint.take().is_some() {
            debug!(identity = %self.identity, "disconnected");
        }
        connection.address = None;
    }

    /// Whether a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.endpoint.is_some()
    }

    /// Publish `event` with opaque `data` on `channel`.
    pub async fn broadcast(&self, channel: &str, event: &str, data: &str) -> ClientResult<()> {
        self.request(Command::Broadcast, [channel, event, data])
            .await
            .map(drop)
    }

    /// [`Client::broadcast`] with `data` serialised to JSON.
    pub async fn broadcast_json<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        event: &str,
        data: &T,
    ) -> ClientResult<()> {
        let data = serde_json::to_string(data)?;
        self.broadcast(channel, event, &data).await
    }

    /// Create a channel. Private and presence kinds are expressed through
    /// the name prefix.
    pub async fn open_channel(&self, name: &str, kind: ChannelKind) -> ClientResult<()> {
        let name = kind.qualify(name);
        self.request(Command::OpenChannel, [&*name])
            .await
            .map(drop)
    }

    pub async fn close_channel(&self, name: &str) -> ClientResult<()> {
        self.request(Command::CloseChannel, [name]).await.map(drop)
    }

    /// Request a single-use access token for channels matching `permission`.
    pub async fn request_single_access_token(&self, permission: &str) -> ClientResult<String> {
        let payload = self.request(Command::AccessToken, [permission]).await?;

        match payload.as_slice() {
            [token] if token.chars().count() == ACCESS_TOKEN_LENGTH => Ok(token.clone()),
            [token] => Err(ClientError::UnexpectedReply(format!(
                "access token has {} characters, expected {ACCESS_TOKEN_LENGTH}",
                token.chars().count()
            ))),
            frames => Err(ClientError::UnexpectedReply(format!(
                "expected one access token frame, got {}",
                frames.len()
            ))),
        }
    }

    async fn open(&self, address: &str) -> ClientResult<C::Endpoint> {
        debug!(identity = %self.identity, address = %address, "opening connection");
        timeout(
            self.config.request_timeout,
            self.connector
                .connect(address, &self.identity, EndpointKind::Sync),
        )
        .await
        .map_err(|_| ClientError::Timeout {
            operation: "connecting",
        })?
        .map_err(ClientError::from)
    }

    async fn request<'a>(
        &self,
        command: Command,
        args: impl IntoIterator<Item = &'a str>,
    ) -> ClientResult<Vec<String>> {
        let frames = encode(command, args);
        let mut connection = self.connection.lock().await;

        if let Some(endpoint) = connection.endpoint.as_mut() {
            if let Err(e) = discard_unsolicited(endpoint) {
                debug!(identity = %self.identity, error = %e, "connection lost, reopening");
                connection.endpoint = None;
            }
        }
        if connection.endpoint.is_none() {
            let address = connection
                .address
                .clone()
                .ok_or(ClientError::NotConnected)?;
            connection.endpoint = Some(self.open(&address).await?);
        }
        let Some(endpoint) = connection.endpoint.as_mut() else {
            return Err(ClientError::NotConnected);
        };

        debug!(identity = %self.identity, command = %command, "sending request");
        let reply = match exchange(endpoint, frames, &self.config).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    identity = %self.identity,
                    command = %command,
                    error = %e,
                    "exchange failed, dropping connection"
                );
                connection.endpoint = None;
                return Err(e);
            }
        };

        match decode_reply(reply) {
            ReplyOutcome::Success(payload) => Ok(payload),
            ReplyOutcome::Failure(Some(code)) => {
                debug!(command = %command, code = code.as_u16(), "broker error");
                Err(ClientError::Broker(code))
            }
            ReplyOutcome::Failure(None) => Err(ClientError::UnknownServerError),
        }
    }
}

/// Drop replies nobody is waiting for.
fn discard_unsolicited<E: Endpoint>(endpoint: &mut E) -> TransportResult<()> {
    while let Some(received) = endpoint.try_recv() {
        let frames = received?;
        warn!(frames = frames.len(), "discarding unsolicited reply");
    }
    Ok(())
}

async fn exchange<E: Endpoint>(
    endpoint: &mut E,
    frames: FrameSet,
    config: &ClientConfig,
) -> ClientResult<FrameSet> {
    timeout(config.request_timeout, endpoint.send(frames))
        .await
        .map_err(|_| ClientError::Timeout {
            operation: "sending request",
        })??;

    let reply = timeout(config.response_timeout, endpoint.recv())
        .await
        .map_err(|_| ClientError::Timeout {
            operation: "waiting for reply",
        })??;

    Ok(reply)
}
