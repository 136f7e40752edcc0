//! MQTT broker actor.
//!
//! Owns the rumqttc event loop on a dedicated task and exposes a
//! clone-safe handle whose `publish_acked` resolves only once the broker
//! returns the matching PubAck. On every (re)connection the actor
//! re-subscribes to the roster topic and immediately requests a fresh
//! roster, so a device that was offline while identities changed catches
//! up as soon as it comes back.

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tally_store::RosterEntry;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::roster::parse_roster;

const EVENT_CHANNEL_CAPACITY: usize = 10;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker task unavailable")]
    ChannelClosed,
    #[error("publish rejected: {0}")]
    Publish(String),
    #[error("broker disconnected before acknowledgement")]
    Disconnected,
}

/// Logical topic names derived from one prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    /// Outbound attendance records.
    pub updates: String,
    /// Outbound roster request.
    pub request_users: String,
    /// Inbound roster payloads.
    pub receive_users: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Topics {
        Topics {
            updates: format!("{prefix}/updates"),
            request_users: format!("{prefix}/request-users"),
            receive_users: format!("{prefix}/receive-users"),
        }
    }
}

pub struct BrokerConfig {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub keep_alive: Duration,
}

struct PublishRequest {
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<(), BrokerError>>,
}

/// Clone-safe handle to the broker task.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<PublishRequest>,
}

impl BrokerHandle {
    /// Publish one attendance payload at QoS 1 and wait for the PubAck.
    /// The caller bounds the wait; an abandoned reply is simply dropped.
    pub async fn publish_acked(&self, payload: Vec<u8>) -> Result<(), BrokerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PublishRequest {
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BrokerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| BrokerError::ChannelClosed)?
    }
}

/// Spawn the broker actor. Returns the publish handle and the stream of
/// parsed inbound roster updates.
pub fn spawn_broker(
    config: BrokerConfig,
    shutdown: watch::Receiver<bool>,
) -> (BrokerHandle, mpsc::Receiver<Vec<RosterEntry>>) {
    let mut options = MqttOptions::new(
        format!("tally-{}", config.device_id),
        config.host.clone(),
        config.port,
    );
    options.set_keep_alive(config.keep_alive);
    if let (Some(user), Some(pass)) = (config.username.clone(), config.password.clone()) {
        options.set_credentials(user, pass);
    }

    let (client, eventloop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);
    let (request_tx, request_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (roster_tx, roster_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let topics = Topics::new(&config.topic_prefix);
    tracing::info!(
        host = %config.host,
        port = config.port,
        updates = %topics.updates,
        receive_users = %topics.receive_users,
        "broker actor starting"
    );

    tokio::spawn(run_broker(
        client,
        eventloop,
        topics,
        config.device_id,
        request_rx,
        roster_tx,
        shutdown,
    ));

    (BrokerHandle { tx: request_tx }, roster_rx)
}

async fn run_broker(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topics: Topics,
    device_id: String,
    mut requests: mpsc::Receiver<PublishRequest>,
    roster_tx: mpsc::Sender<Vec<RosterEntry>>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Replies waiting for their packet id, in publish order; `None`
    // slots are internal QoS 1 publishes (roster requests).
    let mut awaiting_pkid: VecDeque<Option<oneshot::Sender<Result<(), BrokerError>>>> =
        VecDeque::new();
    // Replies waiting for the broker's PubAck, by packet id.
    let mut pending_acks: HashMap<u16, oneshot::Sender<Result<(), BrokerError>>> = HashMap::new();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = client.disconnect().await;
                    tracing::info!("broker actor stopping");
                    break;
                }
            }
            request = requests.recv() => {
                let Some(request) = request else { break };
                match client
                    .publish(&topics.updates, QoS::AtLeastOnce, false, request.payload)
                    .await
                {
                    Ok(()) => awaiting_pkid.push_back(Some(request.reply)),
                    Err(err) => {
                        let _ = request.reply.send(Err(BrokerError::Publish(err.to_string())));
                    }
                }
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    tracing::info!("connected to broker");
                    if let Err(err) = client.subscribe(&topics.receive_users, QoS::AtLeastOnce).await {
                        tracing::warn!(error = %err, "roster subscribe failed");
                    }
                    // Proactively request the roster on every (re)connect.
                    let request = serde_json::json!({
                        "device_id": device_id,
                        "action": "get-roster",
                    });
                    match client
                        .publish(&topics.request_users, QoS::AtLeastOnce, false, request.to_string())
                        .await
                    {
                        Ok(()) => {
                            awaiting_pkid.push_back(None);
                            tracing::info!(topic = %topics.request_users, "roster requested");
                        }
                        Err(err) => tracing::warn!(error = %err, "roster request failed"),
                    }
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    if let Some(slot) = awaiting_pkid.pop_front() {
                        if let Some(reply) = slot {
                            pending_acks.insert(pkid, reply);
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::PubAck(ack))) => {
                    if let Some(reply) = pending_acks.remove(&ack.pkid) {
                        let _ = reply.send(Ok(()));
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.topic == topics.receive_users {
                        match parse_roster(&message.payload) {
                            Ok(entries) => {
                                tracing::info!(count = entries.len(), "roster payload received");
                                if roster_tx.send(entries).await.is_err() {
                                    tracing::warn!("roster listener gone, dropping update");
                                }
                            }
                            // Malformed payloads are discarded; the local
                            // roster is never wiped by bad input.
                            Err(err) => tracing::warn!(error = %err, "malformed roster payload"),
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "broker connection error");
                    for slot in awaiting_pkid.drain(..).flatten() {
                        let _ = slot.send(Err(BrokerError::Disconnected));
                    }
                    for (_, reply) in pending_acks.drain() {
                        let _ = reply.send(Err(BrokerError::Disconnected));
                    }
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_from_prefix() {
        let topics = Topics::new("attendance/kiosk-01");
        assert_eq!(topics.updates, "attendance/kiosk-01/updates");
        assert_eq!(topics.request_users, "attendance/kiosk-01/request-users");
        assert_eq!(topics.receive_users, "attendance/kiosk-01/receive-users");
    }
}
