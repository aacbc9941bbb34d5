//! In-process transport
//!
//! Topic registry over tokio channels. The default for single-host
//! deployments where conductor and mortar share a process, and the test
//! transport everywhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{Delivery, DispatchError, Envelope, Inbox, ReplyHandle, Transport};

#[derive(Default)]
pub struct LocalTransport {
    topics: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: &str) -> Option<mpsc::UnboundedSender<Delivery>> {
        self.topics.lock().unwrap().get(topic).cloned()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn cast(&self, topic: &str, envelope: Envelope) -> Result<(), DispatchError> {
        match self.sender_for(topic) {
            Some(tx) => {
                if tx.send(Delivery { envelope, reply: None }).is_err() {
                    debug!(topic, "cast dropped, consumer is gone");
                }
            }
            None => {
                debug!(topic, "cast dropped, nobody is serving the topic");
            }
        }
        Ok(())
    }

    async fn call(
        &self,
        topic: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<serde_json::Value, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<serde_json::Value, String>>();

        if let Some(tx) = self.sender_for(topic) {
            let reply = ReplyHandle::new(move |result| {
                let _ = reply_tx.send(result);
            });
            let _ = tx.send(Delivery {
                envelope,
                reply: Some(reply),
            });
        }
        // An unserved topic behaves like a dead consumer: the caller waits
        // out its timeout, matching remote-transport semantics.

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(DispatchError::Remote(message)),
            Ok(Err(_)) => Err(DispatchError::Timeout),
            Err(_) => Err(DispatchError::Timeout),
        }
    }

    async fn serve(&self, topic: &str) -> Result<Inbox, DispatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.lock().unwrap().insert(topic.to_string(), tx);
        Ok(Inbox::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::super::RequestContext;
    use super::*;

    #[tokio::test]
    async fn test_cast_reaches_served_topic() {
        let transport = LocalTransport::new();
        let mut inbox = transport.serve("bricks/mortar/test").await.unwrap();

        let envelope =
            Envelope::new(RequestContext::admin(), "do_ping", &serde_json::json!({})).unwrap();
        transport.cast("bricks/mortar/test", envelope).await.unwrap();

        let delivery = inbox.recv().await.unwrap();
        assert_eq!(delivery.envelope.method, "do_ping");
        assert!(delivery.reply.is_none());
    }

    #[tokio::test]
    async fn test_cast_to_unserved_topic_is_dropped() {
        let transport = LocalTransport::new();
        let envelope =
            Envelope::new(RequestContext::admin(), "do_ping", &serde_json::json!({})).unwrap();
        // Fire-and-forget never errors
        transport.cast("bricks/mortar/nobody", envelope).await.unwrap();
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let transport = LocalTransport::new();
        let mut inbox = transport.serve("bricks/mortar/test").await.unwrap();

        tokio::spawn(async move {
            let delivery = inbox.recv().await.unwrap();
            let reply = delivery.reply.unwrap();
            reply.send(Ok(serde_json::json!({"log": "asdf1234"})));
        });

        let envelope = Envelope::new(
            RequestContext::admin(),
            "do_tail_brick_log",
            &serde_json::json!({"instance_id": "i-1", "length": 10}),
        )
        .unwrap();
        let value = transport
            .call("bricks/mortar/test", envelope, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value["log"], "asdf1234");
    }

    #[tokio::test]
    async fn test_call_to_unserved_topic_times_out() {
        let transport = LocalTransport::new();
        let envelope =
            Envelope::new(RequestContext::admin(), "do_ping", &serde_json::json!({})).unwrap();

        let err = transport
            .call("bricks/mortar/nobody", envelope, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout));
    }

    #[tokio::test]
    async fn test_call_propagates_handler_error() {
        let transport = LocalTransport::new();
        let mut inbox = transport.serve("bricks/conductor/test").await.unwrap();

        tokio::spawn(async move {
            let delivery = inbox.recv().await.unwrap();
            delivery
                .reply
                .unwrap()
                .send(Err("brick is borked".to_string()));
        });

        let envelope =
            Envelope::new(RequestContext::admin(), "do_thing", &serde_json::json!({})).unwrap();
        let err = transport
            .call("bricks/conductor/test", envelope, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Remote(m) if m.contains("borked")));
    }
}
