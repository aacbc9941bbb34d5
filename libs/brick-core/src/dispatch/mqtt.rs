//! MQTT transport
//!
//! Multi-host transport over an MQTT broker. Casts are plain QoS-1
//! publishes; calls carry a correlation id and a per-client reply topic
//! the caller subscribes to at connect time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Delivery, DispatchError, Envelope, Inbox, ReplyHandle, Transport};

/// MQTT broker address
#[derive(Debug, Clone)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            port: 1883,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(flatten)]
    envelope: Envelope,

    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize)]
struct WireReply {
    correlation_id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

type TopicMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>>;
type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Result<serde_json::Value, String>>>>>;

pub struct MqttTransport {
    client: AsyncClient,
    reply_topic: String,
    topics: TopicMap,
    pending: PendingMap,
}

impl MqttTransport {
    /// Connect to the broker and start the event-loop task.
    pub async fn connect(address: &MqttAddress, client_id: &str) -> Result<Self, DispatchError> {
        if address.host.is_empty() {
            return Err(DispatchError::Transport(
                "MQTT host is not configured".to_string(),
            ));
        }

        let mut options = MqttOptions::new(client_id, &address.host, address.port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let reply_topic = format!("bricks/reply/{}", client_id);
        client
            .subscribe(&reply_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let topics: TopicMap = Arc::new(Mutex::new(HashMap::new()));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let task_client = client.clone();
        let task_reply_topic = reply_topic.clone();
        let task_topics = topics.clone();
        let task_pending = pending.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        route_publish(
                            &task_client,
                            &task_reply_topic,
                            &task_topics,
                            &task_pending,
                            &publish.topic,
                            &publish.payload,
                        );
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT poll error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            client,
            reply_topic,
            topics,
            pending,
        })
    }
}

fn route_publish(
    client: &AsyncClient,
    reply_topic: &str,
    topics: &TopicMap,
    pending: &PendingMap,
    topic: &str,
    payload: &[u8],
) {
    if topic == reply_topic {
        let reply: WireReply = match serde_json::from_slice(payload) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(topic, "dropping unparseable reply: {}", e);
                return;
            }
        };

        let waiter = pending.lock().unwrap().remove(&reply.correlation_id);
        match waiter {
            Some(tx) => {
                let result = match reply.error {
                    Some(message) => Err(message),
                    None => Ok(reply.result.unwrap_or(serde_json::Value::Null)),
                };
                let _ = tx.send(result);
            }
            None => debug!(topic, "reply for unknown correlation id, dropping"),
        }
        return;
    }

    let message: WireMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(topic, "dropping unparseable message: {}", e);
            return;
        }
    };

    let reply = match (message.reply_to, message.correlation_id) {
        (Some(reply_to), Some(correlation_id)) => {
            let client = client.clone();
            Some(ReplyHandle::new(move |result| {
                let reply = WireReply {
                    correlation_id,
                    result: result.as_ref().ok().cloned(),
                    error: result.err(),
                };
                let payload = match serde_json::to_vec(&reply) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("failed to encode reply: {}", e);
                        return;
                    }
                };
                tokio::spawn(async move {
                    if let Err(e) = client
                        .publish(reply_to, QoS::AtLeastOnce, false, payload)
                        .await
                    {
                        warn!("failed to publish reply: {}", e);
                    }
                });
            }))
        }
        _ => None,
    };

    let consumer = topics.lock().unwrap().get(topic).cloned();
    match consumer {
        Some(tx) => {
            let _ = tx.send(Delivery {
                envelope: message.envelope,
                reply,
            });
        }
        None => debug!(topic, "no local consumer for topic, dropping"),
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn cast(&self, topic: &str, envelope: Envelope) -> Result<(), DispatchError> {
        let message = WireMessage {
            envelope,
            reply_to: None,
            correlation_id: None,
        };
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }

    async fn call(
        &self,
        topic: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<serde_json::Value, DispatchError> {
        let correlation_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(correlation_id, reply_tx);

        let message = WireMessage {
            envelope,
            reply_to: Some(self.reply_topic.clone()),
            correlation_id: Some(correlation_id),
        };
        let payload = serde_json::to_vec(&message)?;

        if let Err(e) = self
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            self.pending.lock().unwrap().remove(&correlation_id);
            return Err(DispatchError::Transport(e.to_string()));
        }

        let outcome = tokio::time::timeout(timeout, reply_rx).await;
        self.pending.lock().unwrap().remove(&correlation_id);

        match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(DispatchError::Remote(message)),
            Ok(Err(_)) => Err(DispatchError::Timeout),
            Err(_) => Err(DispatchError::Timeout),
        }
    }

    async fn serve(&self, topic: &str) -> Result<Inbox, DispatchError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        info!("Serving topic: {}", topic);

        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.lock().unwrap().insert(topic.to_string(), tx);
        Ok(Inbox::new(rx))
    }
}
