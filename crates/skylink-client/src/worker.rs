//! Self-healing subscription worker.
//!
//! A [`Worker`] keeps one long-lived dealer connection to the broker and
//! hands every triggered event to application code. Liveness is tracked in
//! poll windows of twice the heartbeat interval:
//!
//! - any incoming message resets the liveness counter
//! - a window without traffic decrements it
//! - at zero the worker waits `reconnect_interval` and opens a fresh
//!   connection, retrying until it succeeds
//!
//! Independently of traffic, a heartbeat goes out once per interval.
//!
//! ```ignore
//! let mut worker = Worker::new("/chat", "s3cr3t")?;
//! worker.connect("tcp://127.0.0.1:8081").await?;
//!
//! let stop = worker.stop_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     stop.stop();
//! });
//!
//! worker
//!     .listen(
//!         |payload| println!("{payload}"),
//!         |code| eprintln!("broker error {code}"),
//!     )
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, error, info, trace, warn};

use skylink_core::{Identity, IdentityError, Role};
use skylink_protocol::{Command, ErrorCode, FrameSet, encode};

use crate::config::{Settings, SettingsError, WorkerConfig};
use crate::transport::{Connector, Endpoint, EndpointKind, TcpConnector, TransportError};

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker failures.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker has no broker address")]
    NotConnected,

    #[error("timed out connecting to {address}")]
    ConnectTimeout { address: String },

    #[error("broker rejected the worker credentials")]
    Unauthorized,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Receives what the broker pushes to a worker.
///
/// Both methods run on the task driving [`Worker::listen_with`].
pub trait WorkerHandler: Send {
    /// A `TR` payload, passed through unparsed.
    fn on_message(&mut self, payload: &str);

    /// A broker-side error.
    fn on_error(&mut self, code: ErrorCode);
}

struct Callbacks<M, E> {
    on_message: M,
    on_error: E,
}

impl<M, E> WorkerHandler for Callbacks<M, E>
where
    M: FnMut(&str) + Send,
    E: FnMut(ErrorCode) + Send,
{
    fn on_message(&mut self, payload: &str) {
        (self.on_message)(payload)
    }

    fn on_error(&mut self, code: ErrorCode) {
        (self.on_error)(code)
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    Connecting,
    Connected,
    Listening,
    Reconnecting,
    Stopped,
}

/// Why [`Worker::listen`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenExit {
    /// A stop was requested.
    Stopped,
    /// The broker sent `QT`. The worker has already reconnected; call
    /// `listen` again to resume.
    BrokerQuit,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub messages_received: u64,
    pub heartbeats_sent: u64,
    pub reconnects: u64,
}

/// Requests a listening worker to stop. Cheap to clone and usable from any
/// thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.flag.borrow()
    }
}

/// Completes once the stop flag is raised.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn envelope(command: Command) -> FrameSet {
    encode(command, std::iter::empty::<String>()).with_envelope("")
}

enum Wake {
    Stop,
    Message(FrameSet),
    Silence,
}

/// Subscription worker.
pub struct Worker<C: Connector = TcpConnector> {
    identity: Identity,
    connector: C,
    config: WorkerConfig,
    address: Option<String>,
    endpoint: Option<C::Endpoint>,
    liveness: u32,
    heartbeat_at: Instant,
    state: WorkerState,
    stop: StopHandle,
    stop_rx: watch::Receiver<bool>,
    stats: WorkerStats,
    has_connected: bool,
}

impl Worker<TcpConnector> {
    /// Worker over TCP with default timing.
    pub fn new(vhost: &str, secret: &str) -> WorkerResult<Self> {
        Self::with_connector(vhost, secret, TcpConnector::default(), WorkerConfig::default())
    }

    /// Worker configured from a settings file.
    ///
    /// The broker address is remembered but not dialled; call
    /// [`Worker::reconnect`] to open the connection.
    pub fn from_settings(settings: &Settings) -> WorkerResult<Self> {
        let broker = settings.broker_url()?;
        let mut worker = Self::with_connector(
            &broker.vhost,
            &broker.secret,
            TcpConnector::default(),
            settings.worker_config(),
        )?;
        worker.address = Some(broker.address);
        Ok(worker)
    }
}

impl<C: Connector> Worker<C> {
    pub fn with_connector(
        vhost: &str,
        secret: &str,
        connector: C,
        config: WorkerConfig,
    ) -> WorkerResult<Self> {
        let identity = Identity::generate(Role::Dealer, vhost, secret)?;
        let (flag, stop_rx) = watch::channel(false);

        Ok(Self {
            identity,
            connector,
            liveness: config.liveness,
            config,
            address: None,
            endpoint: None,
            heartbeat_at: Instant::now(),
            state: WorkerState::Disconnected,
            stop: StopHandle {
                flag: Arc::new(flag),
            },
            stop_rx,
            stats: WorkerStats::default(),
            has_connected: false,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Remaining silent windows before a forced reconnect.
    pub fn liveness(&self) -> u32 {
        self.liveness
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a stop. A stop requested while not listening is honoured by
    /// the next [`Worker::listen`].
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Remember `address` and open a connection to it.
    pub async fn connect(&mut self, address: &str) -> WorkerResult<()> {
        self.address = Some(address.to_string());
        self.reconnect().await
    }

    /// Drop the current connection, if any, and open a fresh one to the
    /// stored address, announcing readiness.
    pub async fn reconnect(&mut self) -> WorkerResult<()> {
        let address = self.address.clone().ok_or(WorkerError::NotConnected)?;

        self.endpoint = None;
        self.state = if self.has_connected {
            WorkerState::Reconnecting
        } else {
            WorkerState::Connecting
        };
        debug!(identity = %self.identity, address = %address, "opening connection");

        let connected = timeout(
            self.config.heartbeat_interval,
            self.connector
                .connect(&address, &self.identity, EndpointKind::Async),
        )
        .await;
        let mut endpoint = match connected {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(e)) => {
                self.state = WorkerState::Disconnected;
                return Err(e.into());
            }
            Err(_) => {
                self.state = WorkerState::Disconnected;
                return Err(WorkerError::ConnectTimeout { address });
            }
        };
        if let Err(e) = endpoint.send(envelope(Command::Ready)).await {
            self.state = WorkerState::Disconnected;
            return Err(e.into());
        }

        self.endpoint = Some(endpoint);
        self.liveness = self.config.liveness;
        self.heartbeat_at = Instant::now() + self.config.heartbeat_interval;
        if self.has_connected {
            self.stats.reconnects += 1;
        }
        self.has_connected = true;
        self.state = WorkerState::Connected;

        info!(identity = %self.identity, address = %address, "connected");
        Ok(())
    }

    /// Close the connection and forget the address. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.endpoint.take().is_some() {
            debug!(identity = %self.identity, "disconnected");
        }
        self.address = None;
        self.state = WorkerState::Disconnected;
    }

    /// Run the receive loop with plain callbacks.
    pub async fn listen<M, E>(&mut self, on_message: M, on_error: E) -> WorkerResult<ListenExit>
    where
        M: FnMut(&str) + Send,
        E: FnMut(ErrorCode) + Send,
    {
        self.listen_with(&mut Callbacks {
            on_message,
            on_error,
        })
        .await
    }

    /// Run the receive loop until a stop is requested, the broker says
    /// `QT`, the broker rejects the credentials (`ER 402`), or the
    /// transport fails.
    ///
    /// Silence never ends the loop: dead connections are replaced, and a
    /// failed reconnect is retried after another `reconnect_interval`.
    pub async fn listen_with<H: WorkerHandler + ?Sized>(
        &mut self,
        handler: &mut H,
    ) -> WorkerResult<ListenExit> {
        info!(identity = %self.identity, "listening");

        loop {
            if self.stop.is_stop_requested() {
                return Ok(self.finish_stop().await);
            }

            if self.endpoint.is_none() {
                if self.address.is_none() {
                    return Err(WorkerError::NotConnected);
                }
                self.state = WorkerState::Reconnecting;
                if !self.pause(self.config.reconnect_interval).await {
                    self.recover().await;
                }
                continue;
            }
            self.state = WorkerState::Listening;

            match self.poll_window().await {
                Ok(Wake::Stop) => {}
                Ok(Wake::Message(frames)) => {
                    self.liveness = self.config.liveness;
                    match self.dispatch(frames, handler).await {
                        Ok(Some(exit)) => return Ok(exit),
                        Ok(None) => {}
                        Err(e) => {
                            error!(identity = %self.identity, error = %e, "giving up");
                            self.endpoint = None;
                            self.state = WorkerState::Disconnected;
                            return Err(e);
                        }
                    }
                }
                Ok(Wake::Silence) => {
                    self.liveness = self.liveness.saturating_sub(1);
                    debug!(identity = %self.identity, liveness = self.liveness, "silent poll window");

                    if self.liveness == 0 {
                        warn!(identity = %self.identity, "broker unresponsive, reconnecting");
                        self.state = WorkerState::Reconnecting;
                        if !self.pause(self.config.reconnect_interval).await {
                            self.recover().await;
                        }
                    }
                }
                Err(e) => {
                    error!(identity = %self.identity, error = %e, "receive failed");
                    self.endpoint = None;
                    self.state = WorkerState::Disconnected;
                    return Err(e);
                }
            }

            self.heartbeat_if_due().await;
        }
    }

    /// Wait up to one poll window for a message, heartbeating on schedule.
    async fn poll_window(&mut self) -> WorkerResult<Wake> {
        let deadline = Instant::now() + self.config.poll_window();

        loop {
            let heartbeat_at = self.heartbeat_at;
            let Some(endpoint) = self.endpoint.as_mut() else {
                return Ok(Wake::Silence);
            };

            let wake = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => Some(Wake::Stop),
                received = endpoint.recv() => Some(Wake::Message(received?)),
                _ = sleep_until(heartbeat_at) => None,
                _ = sleep_until(deadline) => Some(Wake::Silence),
            };

            match wake {
                Some(wake) => return Ok(wake),
                None => self.send_heartbeat().await,
            }
        }
    }

    async fn dispatch<H: WorkerHandler + ?Sized>(
        &mut self,
        mut frames: FrameSet,
        handler: &mut H,
    ) -> WorkerResult<Option<ListenExit>> {
        self.stats.messages_received += 1;

        match frames.pop_front() {
            Some(first) if !first.is_empty() => {
                debug!(frame = %first, "discarding non-empty envelope frame");
            }
            _ => {}
        }
        let Some(tag) = frames.pop_front() else {
            return Ok(None);
        };

        match Command::from_tag(&tag) {
            Some(Command::Heartbeat) => trace!("broker heartbeat"),
            Some(Command::Quit) => {
                info!(identity = %self.identity, "broker requested quit");
                self.recover().await;
                return Ok(Some(ListenExit::BrokerQuit));
            }
            Some(Command::Trigger) => match frames.pop_front() {
                Some(payload) => handler.on_message(&payload),
                None => warn!("trigger without payload"),
            },
            Some(Command::Error) => {
                let code = frames
                    .front()
                    .and_then(ErrorCode::parse)
                    .unwrap_or(ErrorCode::END_OF_FILE);
                debug!(code = code.as_u16(), "broker error");
                handler.on_error(code);
                if code == ErrorCode::UNAUTHORIZED {
                    return Err(WorkerError::Unauthorized);
                }
            }
            _ => warn!(command = %tag, "ignoring unexpected command"),
        }

        Ok(None)
    }

    async fn finish_stop(&mut self) -> ListenExit {
        info!(identity = %self.identity, "stopping");
        self.send_envelope(Command::Quit).await;
        self.stop.flag.send_replace(false);
        self.state = WorkerState::Stopped;
        ListenExit::Stopped
    }

    /// Sleep for `duration`. Returns true if interrupted by a stop request.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = stop_requested(&mut self.stop_rx) => true,
            _ = sleep(duration) => false,
        }
    }

    /// Reconnect unless a stop request arrives first.
    async fn recover(&mut self) {
        let mut stop_rx = self.stop_rx.clone();
        let result = tokio::select! {
            biased;
            _ = stop_requested(&mut stop_rx) => {
                debug!(identity = %self.identity, "reconnect abandoned for stop");
                return;
            }
            result = self.reconnect() => result,
        };
        if let Err(e) = result {
            warn!(
                identity = %self.identity,
                error = %e,
                retry_in = ?self.config.reconnect_interval,
                "reconnect failed"
            );
        }
    }

    async fn heartbeat_if_due(&mut self) {
        if self.endpoint.is_some() && Instant::now() >= self.heartbeat_at {
            self.send_heartbeat().await;
        }
    }

    async fn send_heartbeat(&mut self) {
        self.heartbeat_at = Instant::now() + self.config.heartbeat_interval;
        if self.send_envelope(Command::Heartbeat).await {
            self.stats.heartbeats_sent += 1;
        }
    }

    /// Best-effort send of an enveloped command.
    async fn send_envelope(&mut self, command: Command) -> bool {
        let Some(endpoint) = self.endpoint.as_mut() else {
            return false;
        };

        match timeout(self.config.heartbeat_interval, endpoint.send(envelope(command))).await {
            Ok(Ok(())) => {
                trace!(command = %command, "sent");
                true
            }
            Ok(Err(e)) => {
                warn!(command = %command, error = %e, "send failed");
                false
            }
            Err(_) => {
                warn!(command = %command, "send timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::transport::{
        BoxFuture, MemoryAcceptor, MemoryConnector, MemoryEndpoint, MemoryPeer, TransportResult,
    };

    const ADDRESS: &str = "mem://broker";

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn config() -> WorkerConfig {
        WorkerConfig::default()
            .with_heartbeat_interval(ms(100))
            .with_reconnect_interval(ms(100))
    }

    async fn connected() -> (Worker<MemoryConnector>, MemoryAcceptor, MemoryPeer) {
        let (connector, mut acceptor) = MemoryConnector::new();
        let mut worker = Worker::with_connector("/test", "secret", connector, config()).unwrap();
        worker.connect(ADDRESS).await.unwrap();

        let mut peer = acceptor.accept().await.unwrap();
        assert_eq!(peer.recv().await, Some(envelope(Command::Ready)));
        (worker, acceptor, peer)
    }

    #[derive(Clone, Default)]
    struct Recorder {
        messages: Arc<Mutex<Vec<String>>>,
        errors: Arc<Mutex<Vec<u16>>>,
    }

    impl Recorder {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<u16> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl WorkerHandler for Recorder {
        fn on_message(&mut self, payload: &str) {
            self.messages.lock().unwrap().push(payload.to_string());
        }

        fn on_error(&mut self, code: ErrorCode) {
            self.errors.lock().unwrap().push(code.as_u16());
        }
    }

    fn spawn_listen(
        mut worker: Worker<MemoryConnector>,
        mut recorder: Recorder,
    ) -> tokio::task::JoinHandle<(Worker<MemoryConnector>, WorkerResult<ListenExit>)> {
        tokio::spawn(async move {
            let result = worker.listen_with(&mut recorder).await;
            (worker, result)
        })
    }

    fn drain(peer: &mut MemoryPeer) -> Vec<FrameSet> {
        std::iter::from_fn(|| peer.try_recv()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_announces_ready() {
        let (worker, _acceptor, peer) = connected().await;

        assert_eq!(worker.state(), WorkerState::Connected);
        assert_eq!(worker.liveness(), 3);
        assert!(worker.identity().as_str().starts_with("dlr:/test:secret:"));
        assert_eq!(peer.identity, worker.identity().as_str());
        assert_eq!(peer.kind, EndpointKind::Async);
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_receive_triggers_and_errors() {
        let (mut worker, _acceptor, mut peer) = connected().await;
        let stop = worker.stop_handle();

        let messages = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let task = {
            let messages = messages.clone();
            let errors = errors.clone();
            tokio::spawn(async move {
                worker
                    .listen(
                        move |payload| messages.lock().unwrap().push(payload.to_string()),
                        move |code| errors.lock().unwrap().push(code.as_u16()),
                    )
                    .await
            })
        };

        peer.send(["", "TR", "{}"]);
        peer.send(["", "ER"]);
        peer.send(["", "ER", "403"]);
        peer.send(["", "ER", "nope"]);
        peer.send(["", "TR"]);
        peer.send(["", "HB"]);
        peer.send(["", "XX", "ignored"]);
        peer.send([""]);
        sleep(ms(10)).await;

        stop.stop();
        assert_eq!(task.await.unwrap().unwrap(), ListenExit::Stopped);

        assert_eq!(*messages.lock().unwrap(), vec!["{}".to_string()]);
        assert_eq!(*errors.lock().unwrap(), vec![598, 403, 598]);
        assert_eq!(peer.recv().await, Some(envelope(Command::Quit)));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_once_per_interval_despite_traffic() {
        let (worker, mut acceptor, mut peer) = connected().await;
        let stop = worker.stop_handle();
        let recorder = Recorder::default();
        let task = spawn_listen(worker, recorder.clone());

        for _ in 0..10 {
            sleep(ms(35)).await;
            peer.send(["", "HB"]);
        }
        sleep(ms(10)).await;
        stop.stop();
        let (worker, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), ListenExit::Stopped);

        let sent = drain(&mut peer);
        let heartbeats = sent
            .iter()
            .filter(|frames| **frames == envelope(Command::Heartbeat))
            .count();
        assert_eq!(heartbeats, 3);
        assert_eq!(sent.last(), Some(&envelope(Command::Quit)));

        // broker heartbeats keep the connection alive
        assert!(acceptor.try_accept().is_none());
        assert_eq!(worker.stats().reconnects, 0);
        assert_eq!(worker.stats().messages_received, 10);
        assert_eq!(worker.stats().heartbeats_sent, 3);
        assert!(recorder.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_forces_reconnect() {
        let (worker, mut acceptor, mut stale) = connected().await;
        let stop = worker.stop_handle();
        let recorder = Recorder::default();
        let start = Instant::now();
        let task = spawn_listen(worker, recorder.clone());

        let mut fresh = acceptor.accept().await.unwrap();
        // three silent 200ms windows, then the 100ms reconnect pause
        assert!(start.elapsed() >= ms(700));
        assert_eq!(fresh.recv().await, Some(envelope(Command::Ready)));

        let mut old_traffic = Vec::new();
        while let Some(frames) = stale.recv().await {
            old_traffic.push(frames);
        }
        assert!(!old_traffic.is_empty());
        assert!(
            old_traffic
                .iter()
                .all(|frames| *frames == envelope(Command::Heartbeat))
        );

        stop.stop();
        let (worker, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), ListenExit::Stopped);
        assert_eq!(worker.stats().reconnects, 1);
        assert!(recorder.messages().is_empty());
        assert!(recorder.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_resets_liveness() {
        let (worker, mut acceptor, peer) = connected().await;
        let stop = worker.stop_handle();
        let task = spawn_listen(worker, Recorder::default());

        // two silent windows, then a trigger, repeated: never three in a row
        for _ in 0..4 {
            sleep(ms(450)).await;
            peer.send(["", "TR", "{}"]);
        }
        stop.stop();
        let (worker, _) = task.await.unwrap();

        assert!(acceptor.try_accept().is_none());
        assert_eq!(worker.stats().reconnects, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_wait() {
        let (worker, _acceptor, mut peer) = connected().await;
        let stop = worker.stop_handle();
        let task = spawn_listen(worker, Recorder::default());

        sleep(ms(50)).await;
        let requested = Instant::now();
        stop.stop();

        let (worker, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), ListenExit::Stopped);
        assert!(requested.elapsed() < worker.config().poll_window());
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(peer.recv().await, Some(envelope(Command::Quit)));
        assert!(!stop.is_stop_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_listen_is_honoured() {
        let (mut worker, _acceptor, mut peer) = connected().await;
        worker.stop();

        let result = worker.listen_with(&mut Recorder::default()).await;
        assert_eq!(result.unwrap(), ListenExit::Stopped);
        assert_eq!(peer.recv().await, Some(envelope(Command::Quit)));
    }

    #[tokio::test(start_paused = true)]
    async fn broker_quit_reconnects_and_returns() {
        let (worker, mut acceptor, peer) = connected().await;
        let task = spawn_listen(worker, Recorder::default());

        peer.send(["", "QT"]);
        let (worker, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), ListenExit::BrokerQuit);
        assert_eq!(worker.state(), WorkerState::Connected);
        assert_eq!(worker.stats().reconnects, 1);

        let mut fresh = acceptor.accept().await.unwrap();
        assert_eq!(fresh.recv().await, Some(envelope(Command::Ready)));
        assert!(peer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_ends_listen() {
        let (worker, _acceptor, peer) = connected().await;
        let task = spawn_listen(worker, Recorder::default());

        drop(peer);
        let (worker, result) = task.await.unwrap();
        assert!(matches!(
            result,
            Err(WorkerError::Transport(TransportError::Closed))
        ));
        assert_eq!(worker.state(), WorkerState::Disconnected);
        assert!(!worker.is_connected());
    }

    /// Connects once, then never completes another connect.
    struct StallingConnector {
        inner: MemoryConnector,
        attempts: AtomicUsize,
    }

    impl Connector for StallingConnector {
        type Endpoint = MemoryEndpoint;

        fn connect<'a>(
            &'a self,
            address: &'a str,
            identity: &'a Identity,
            kind: EndpointKind,
        ) -> BoxFuture<'a, TransportResult<MemoryEndpoint>> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.connect(address, identity, kind)
            } else {
                Box::pin(std::future::pending())
            }
        }
    }

    async fn stalling() -> (Worker<StallingConnector>, MemoryAcceptor, MemoryPeer) {
        let (inner, mut acceptor) = MemoryConnector::new();
        let connector = StallingConnector {
            inner,
            attempts: AtomicUsize::new(0),
        };
        let mut worker = Worker::with_connector("/test", "secret", connector, config()).unwrap();
        worker.connect(ADDRESS).await.unwrap();
        let peer = acceptor.accept().await.unwrap();
        (worker, acceptor, peer)
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_connect_times_out() {
        let (mut worker, _acceptor, _peer) = stalling().await;

        let started = Instant::now();
        let err = worker.reconnect().await.unwrap_err();
        assert!(matches!(err, WorkerError::ConnectTimeout { ref address } if address == ADDRESS));
        assert!(started.elapsed() >= worker.config().heartbeat_interval);
        assert!(started.elapsed() < worker.config().poll_window());
        assert_eq!(worker.state(), WorkerState::Disconnected);
        assert!(!worker.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_hanging_reconnect() {
        let (mut worker, _acceptor, _peer) = stalling().await;
        let stop = worker.stop_handle();
        let task = tokio::spawn(async move {
            let result = worker.listen_with(&mut Recorder::default()).await;
            (worker, result)
        });

        // three silent windows and the reconnect pause put the worker
        // inside a connect attempt that never finishes
        sleep(ms(750)).await;
        let requested = Instant::now();
        stop.stop();

        let (worker, result) = timeout(ms(200), task)
            .await
            .expect("listen ignored the stop")
            .unwrap();
        assert_eq!(result.unwrap(), ListenExit::Stopped);
        assert!(requested.elapsed() < worker.config().poll_window());
        assert_eq!(worker.connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_ends_listen() {
        let (worker, mut acceptor, mut peer) = connected().await;
        let recorder = Recorder::default();
        let task = spawn_listen(worker, recorder.clone());

        peer.send(["", "ER", "402"]);
        let (worker, result) = task.await.unwrap();

        assert!(matches!(result, Err(WorkerError::Unauthorized)));
        assert_eq!(recorder.errors(), vec![402]);
        assert_eq!(worker.state(), WorkerState::Disconnected);
        assert!(!worker.is_connected());
        assert!(acceptor.try_accept().is_none());
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnects_are_retried() {
        let (worker, acceptor, _stale) = connected().await;
        let stop = worker.stop_handle();
        drop(acceptor);
        let task = spawn_listen(worker, Recorder::default());

        // well past the first forced reconnect; the loop keeps going
        sleep(ms(2_000)).await;
        assert!(!task.is_finished());

        stop.stop();
        let (worker, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), ListenExit::Stopped);
        assert!(!worker.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_leaves_disconnected() {
        let (connector, acceptor) = MemoryConnector::new();
        drop(acceptor);
        let mut worker = Worker::with_connector("/test", "secret", connector, config()).unwrap();

        assert!(matches!(
            worker.connect(ADDRESS).await,
            Err(WorkerError::Transport(TransportError::ConnectionRefused(_)))
        ));
        assert_eq!(worker.state(), WorkerState::Disconnected);
        assert_eq!(worker.address(), Some(ADDRESS));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_twice() {
        let (mut worker, _acceptor, mut peer) = connected().await;

        worker.disconnect();
        worker.disconnect();
        assert_eq!(worker.state(), WorkerState::Disconnected);
        assert_eq!(peer.recv().await, None);

        assert!(matches!(
            worker.listen_with(&mut Recorder::default()).await,
            Err(WorkerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn reconnect_without_address() {
        let (connector, _acceptor) = MemoryConnector::new();
        let mut worker = Worker::with_connector("/test", "secret", connector, config()).unwrap();

        assert!(matches!(
            worker.reconnect().await,
            Err(WorkerError::NotConnected)
        ));
        assert_eq!(worker.state(), WorkerState::Disconnected);
    }

    #[test]
    fn empty_credentials_rejected() {
        let (connector, _acceptor) = MemoryConnector::new();
        assert!(matches!(
            Worker::with_connector("/test", "", connector, config()),
            Err(WorkerError::Identity(IdentityError::EmptySecret))
        ));
    }
}
