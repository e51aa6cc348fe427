use std::collections::HashMap;

use crate::config::Subscription;

/// Topic resolver: `(broker, topic)` -> subscriptions.
///
/// Matching is exact-string; MQTT wildcards in a subscription topic are
/// passed to the broker as-is but never expanded here.
#[derive(Debug, Default)]
pub struct TopicResolver {
    subscriptions: Vec<Subscription>,
    index: HashMap<(String, String), Vec<usize>>,
}

impl TopicResolver {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        let mut index: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (i, sub) in subscriptions.iter().enumerate() {
            index
                .entry((sub.broker.clone(), sub.topic.clone()))
                .or_default()
                .push(i);
        }
        Self { subscriptions, index }
    }

    /// Subscriptions fed by `topic` on `broker`, in configuration order.
    /// Duplicates are all returned and applied independently.
    pub fn resolve<'a>(&'a self, broker: &str, topic: &str) -> impl Iterator<Item = &'a Subscription> + 'a {
        self.index
            .get(&(broker.to_string(), topic.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.subscriptions[i])
    }

    /// Topic filters a broker session subscribes to on every (re)connect.
    ///
    /// Each topic appears once, with the highest QoS any of its subscriptions
    /// asks for, so duplicate entries never cause duplicate delivery.
    pub fn topics_for(&self, broker: &str) -> Vec<(String, u8)> {
        let mut topics: Vec<(String, u8)> = Vec::new();
        for sub in self.subscriptions.iter().filter(|s| s.broker == broker) {
            match topics.iter_mut().find(|(t, _)| *t == sub.topic) {
                Some(entry) => entry.1 = entry.1.max(sub.qos),
                None => topics.push((sub.topic.clone(), sub.qos)),
            }
        }
        topics
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }
}
