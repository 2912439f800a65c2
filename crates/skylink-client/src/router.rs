//! Event routing for workers.
//!
//! Trigger payloads name their event `<backend>/<method>`. A [`Router`]
//! maps backend names to [`Backend`] implementations and forwards each event
//! to the right one. It implements [`WorkerHandler`], so it plugs straight
//! into [`crate::Worker::listen_with`].
//!
//! Handlers run synchronously on the listening task. A backend that wants
//! to publish something in response keeps a [`Replies`] handle; the queued
//! broadcasts are sent by [`forward_replies`] through a [`Client`].
//!
//! ```ignore
//! let (replies, queue) = Replies::new();
//! tokio::spawn(async move { forward_replies(&client, queue).await });
//!
//! let mut router = Router::new();
//! router.mount("chat", move |method: &str, event: &Event| match method {
//!     "message" => replies.broadcast_copy("presence-lobby", event),
//!     _ => Err(RouteError::UndefinedMethod { event: event.name.clone() }),
//! });
//! worker.listen_with(&mut router).await?;
//! ```

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use skylink_protocol::{ErrorCode, Event, ProtocolError};

use crate::client::Client;
use crate::transport::Connector;
use crate::worker::WorkerHandler;

/// Routing failures.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] ProtocolError),

    #[error("event `{0}` is not of the form backend/method")]
    InvalidEventName(String),

    #[error("no backend mounted for event `{0}`")]
    UndefinedBackend(String),

    #[error("backend has no handler for event `{event}`")]
    UndefinedMethod { event: String },

    #[error("handling `{event}` failed: {reason}")]
    Failed { event: String, reason: String },

    #[error("reply queue is closed")]
    RepliesClosed,
}

/// A group of event handlers mounted under one name.
pub trait Backend: Send + Sync {
    /// Handle `event`, whose name ends in `/<method>`.
    fn handle(&self, method: &str, event: &Event) -> Result<(), RouteError>;
}

impl<F> Backend for F
where
    F: Fn(&str, &Event) -> Result<(), RouteError> + Send + Sync,
{
    fn handle(&self, method: &str, event: &Event) -> Result<(), RouteError> {
        self(method, event)
    }
}

/// Dispatches trigger payloads to mounted backends.
#[derive(Default)]
pub struct Router {
    backends: HashMap<String, Box<dyn Backend>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `backend` under `name`, replacing any previous one.
    pub fn mount(&mut self, name: impl Into<String>, backend: impl Backend + 'static) -> &mut Self {
        self.backends.insert(name.into(), Box::new(backend));
        self
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Parse `payload` and hand the event to its backend.
    pub fn route(&self, payload: &str) -> Result<(), RouteError> {
        let event = Event::parse(payload)?;
        let (backend, method) = event
            .route()
            .ok_or_else(|| RouteError::InvalidEventName(event.name.clone()))?;

        let handler = self
            .backends
            .get(backend)
            .ok_or_else(|| RouteError::UndefinedBackend(event.name.clone()))?;

        debug!(event = %event.name, "routing event");
        handler.handle(method, &event)
    }
}

impl WorkerHandler for Router {
    fn on_message(&mut self, payload: &str) {
        if let Err(e) = self.route(payload) {
            warn!(error = %e, "event not handled");
        }
    }

    fn on_error(&mut self, code: ErrorCode) {
        error!(code = code.as_u16(), "broker error: {code}");
    }
}

/// A broadcast queued by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub channel: String,
    pub event: String,
    pub data: String,
}

/// Queues broadcasts from inside event handlers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Replies {
    queue: mpsc::UnboundedSender<Reply>,
}

impl Replies {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Replies, mpsc::UnboundedReceiver<Reply>) {
        let (queue, pending) = mpsc::unbounded_channel();
        (Replies { queue }, pending)
    }

    /// Queue `event` with `data` serialised to JSON on `channel`.
    pub fn broadcast_reply<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        event: &str,
        data: &T,
    ) -> Result<(), RouteError> {
        let data = serde_json::to_string(data).map_err(ProtocolError::from)?;
        self.queue
            .send(Reply {
                channel: channel.to_string(),
                event: event.to_string(),
                data,
            })
            .map_err(|_| RouteError::RepliesClosed)
    }

    /// Queue `event` unchanged on another channel.
    pub fn broadcast_copy(&self, channel: &str, event: &Event) -> Result<(), RouteError> {
        self.broadcast_reply(channel, &event.name, &event.data)
    }
}

/// Publish queued replies through `client` until every [`Replies`] handle
/// is gone. Returns how many were accepted by the broker.
pub async fn forward_replies<C: Connector>(
    client: &Client<C>,
    mut pending: mpsc::UnboundedReceiver<Reply>,
) -> usize {
    let mut sent = 0;
    while let Some(reply) = pending.recv().await {
        match client
            .broadcast(&reply.channel, &reply.event, &reply.data)
            .await
        {
            Ok(()) => sent += 1,
            Err(e) => warn!(
                channel = %reply.channel,
                event = %reply.event,
                error = %e,
                "reply not published"
            ),
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::json;

    use skylink_protocol::FrameSet;

    use super::*;
    use crate::config::{ClientConfig, WorkerConfig};
    use crate::transport::MemoryConnector;
    use crate::worker::Worker;

    #[derive(Clone, Default)]
    struct Chat {
        seen: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    impl Backend for Chat {
        fn handle(&self, method: &str, event: &Event) -> Result<(), RouteError> {
            match method {
                "message" | "join" => {
                    self.seen
                        .lock()
                        .unwrap()
                        .push((method.to_string(), event.data.clone()));
                    Ok(())
                }
                _ => Err(RouteError::UndefinedMethod {
                    event: event.name.clone(),
                }),
            }
        }
    }

    fn router() -> (Router, Chat) {
        let chat = Chat::default();
        let mut router = Router::new();
        router.mount("chat", chat.clone());
        (router, chat)
    }

    #[test]
    fn routes_to_backend_method() {
        let (router, chat) = router();

        router
            .route(r#"{"chat/message": {"text": "hi"}}"#)
            .unwrap();
        router.route(r#"{"chat/join": null}"#).unwrap();

        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen[0], ("message".to_string(), json!({"text": "hi"})));
        assert_eq!(seen[1].0, "join");
    }

    #[test]
    fn closure_backend() {
        let calls = Arc::new(Mutex::new(0));
        let mut router = Router::new();
        {
            let calls = calls.clone();
            router.mount("ping", move |_: &str, _: &Event| -> Result<(), RouteError> {
                *calls.lock().unwrap() += 1;
                Ok(())
            });
        }

        assert!(router.is_mounted("ping"));
        router.route(r#"{"ping/now": {}}"#).unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn routing_failures() {
        let (router, _chat) = router();

        assert!(matches!(
            router.route("{}"),
            Err(RouteError::InvalidPayload(_))
        ));
        assert!(matches!(
            router.route(r#"{"chat": 1}"#),
            Err(RouteError::InvalidEventName(_))
        ));
        assert!(matches!(
            router.route(r#"{"mail/send": 1}"#),
            Err(RouteError::UndefinedBackend(ref name)) if name == "mail/send"
        ));
        assert!(matches!(
            router.route(r#"{"chat/leave": 1}"#),
            Err(RouteError::UndefinedMethod { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn drives_a_worker() {
        let (connector, mut acceptor) = MemoryConnector::new();
        let mut worker =
            Worker::with_connector("/test", "secret", connector, WorkerConfig::default()).unwrap();
        worker.connect("mem://broker").await.unwrap();
        let peer = acceptor.accept().await.unwrap();

        let (mut router, chat) = router();
        let stop = worker.stop_handle();
        let task = tokio::spawn(async move { worker.listen_with(&mut router).await });

        peer.send(["", "TR", r#"{"chat/message": "hello"}"#]);
        peer.send(["", "TR", r#"{"nobody/home": 1}"#]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.stop();

        task.await.unwrap().unwrap();
        let seen = chat.seen.lock().unwrap();
        assert_eq!(*seen, vec![("message".to_string(), json!("hello"))]);
    }

    #[tokio::test]
    async fn backend_replies_are_published() {
        let (connector, mut acceptor) = MemoryConnector::new();
        let client =
            Client::with_connector("/test", "secret", connector, ClientConfig::default()).unwrap();
        client.connect("mem://broker").await.unwrap();
        let mut peer = acceptor.accept().await.unwrap();

        let (replies, pending) = Replies::new();
        let mut router = Router::new();
        router.mount("chat", move |method: &str, event: &Event| match method {
            "message" => replies.broadcast_copy("presence-lobby", event),
            "hello" => replies.broadcast_reply("private-bob", "hello", &json!({"greeting": "hi"})),
            _ => Err(RouteError::UndefinedMethod {
                event: event.name.clone(),
            }),
        });

        router.route(r#"{"chat/message": {"text": "yo"}}"#).unwrap();
        router.route(r#"{"chat/hello": null}"#).unwrap();
        drop(router);

        let broker = tokio::spawn(async move {
            let mut seen = Vec::new();
            for reply in [["OK"], ["ER"]] {
                seen.push(peer.recv().await.unwrap());
                peer.send(reply);
            }
            seen
        });

        assert_eq!(forward_replies(&client, pending).await, 1);
        let seen = broker.await.unwrap();
        assert_eq!(
            seen[0],
            FrameSet::from(["BC", "presence-lobby", "chat/message", r#"{"text":"yo"}"#])
        );
        assert_eq!(
            seen[1],
            FrameSet::from(["BC", "private-bob", "hello", r#"{"greeting":"hi"}"#])
        );
    }

    #[test]
    fn replies_after_forwarder_is_gone() {
        let (replies, pending) = Replies::new();
        drop(pending);
        assert!(matches!(
            replies.broadcast_reply("room", "ping", &1),
            Err(RouteError::RepliesClosed)
        ));
    }

    #[test]
    fn worker_handler_swallows_failures() {
        let (mut router, chat) = router();

        router.on_message("not json");
        router.on_message(r#"{"chat/message": "x"}"#);
        router.on_error(ErrorCode::FORBIDDEN);

        assert_eq!(chat.seen.lock().unwrap().len(), 1);
    }
}
