use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mqtt2db_api::InboundMessage;
use mqtt2db_engine::{BrokerConfig, MessageSender};

/// Capacity of the rumqttc request channel (subscribe/disconnect requests).
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("invalid qos {0}")]
    InvalidQos(u8),

    #[error("client: {0}")]
    Client(#[from] rumqttc::ClientError),
}

pub fn qos(level: u8) -> Result<QoS, BrokerError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BrokerError::InvalidQos(other)),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Subscriptions
// ═══════════════════════════════════════════════════════════════

/// Something that can place a topic subscription with a broker.
pub trait TopicSubscriber: Send + Sync {
    fn subscribe<'a>(
        &'a self,
        topic: &'a str,
        qos: u8,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>>;
}

impl TopicSubscriber for AsyncClient {
    fn subscribe<'a>(
        &'a self,
        topic: &'a str,
        level: u8,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let level = qos(level)?;
            AsyncClient::subscribe(self, topic, level).await?;
            Ok(())
        })
    }
}

/// Subscribe every configured topic. Called on each ConnAck, so a reconnect
/// renews the full set; each topic is requested once per connection.
///
/// A failed subscription is logged and skipped. Returns how many succeeded.
pub async fn resubscribe_all(subscriber: &dyn TopicSubscriber, broker: &str, topics: &[(String, u8)]) -> usize {
    let mut ok = 0;
    for (topic, level) in topics {
        match subscriber.subscribe(topic, *level).await {
            Ok(()) => {
                tracing::info!(broker, topic = %topic, qos = level, "subscribed");
                ok += 1;
            }
            Err(e) => {
                tracing::error!(broker, topic = %topic, error = %e, "subscribe failed");
            }
        }
    }
    ok
}

// ═══════════════════════════════════════════════════════════════
//  BrokerSession
// ═══════════════════════════════════════════════════════════════

/// One long-lived connection to one broker.
///
/// Publishes are forwarded into the dispatch channel stamped with the
/// broker name; connection errors are retried after `reconnect_delay_secs`.
pub struct BrokerSession {
    config: BrokerConfig,
    topics: Vec<(String, u8)>,
    sender: MessageSender,
}

impl BrokerSession {
    /// `topics` is the `(topic, qos)` set from `TopicResolver::topics_for`.
    pub fn new(config: BrokerConfig, topics: Vec<(String, u8)>, sender: MessageSender) -> Self {
        Self { config, topics, sender }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn options(&self) -> MqttOptions {
        options(&self.config)
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    /// Drive the event loop until cancelled or the dispatch loop goes away.
    pub async fn run(self, token: CancellationToken) {
        let (client, eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        tracing::info!(
            broker = %self.config.name,
            host = %self.config.host,
            port = self.config.port,
            topics = self.topics.len(),
            "connecting"
        );
        self.event_loop(client, eventloop, token).await;
    }

    async fn event_loop(self, client: AsyncClient, mut eventloop: EventLoop, token: CancellationToken) {
        let BrokerSession { config, topics, sender } = self;
        let name = config.name.clone();
        let topics = Arc::new(topics);
        let delay = Duration::from_secs(config.reconnect_delay_secs);

        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        tracing::info!(broker = %name, code = ?ack.code, "connected");
                        // Subscribing from inside the poll loop would block on the request channel.
                        let client = client.clone();
                        let topics = topics.clone();
                        let name = name.clone();
                        tokio::spawn(async move {
                            resubscribe_all(&client, &name, &topics).await;
                        });
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        tracing::trace!(broker = %name, topic = %publish.topic, bytes = publish.payload.len(), "publish");
                        let msg = InboundMessage::new(name.clone(), publish.topic, publish.payload.to_vec());
                        if sender.send(msg).await.is_err() {
                            tracing::info!(broker = %name, "dispatch closed, stopping session");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        tracing::debug!(broker = %name, pkid = ack.pkid, codes = ?ack.return_codes, "suback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(broker = %name, error = %e, delay_secs = delay.as_secs(), "connection error, retrying");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = token.cancelled() => break,
                        }
                    }
                },
                _ = token.cancelled() => break,
            }
        }

        let _ = client.try_disconnect();
        tracing::info!(broker = %name, "session stopped");
    }
}

fn options(config: &BrokerConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id(), config.host.clone(), config.port);
    options
        .set_keep_alive(Duration::from_secs(config.keepalive_secs.max(5)))
        .set_clean_session(config.clean_session);
    if let Some(username) = &config.username {
        options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
    }
    options
}
