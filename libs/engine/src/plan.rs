use serde::Serialize;

use mqtt2db_api::BucketPolicy;

use crate::config::{Mqtt2DbConfig, Subscription};
use crate::resolver::TopicResolver;

/// Resolved view of a configuration, printed by `mqtt2db-server check`.
#[derive(Debug, Serialize)]
pub struct Plan {
    pub bucket: BucketPolicy,
    pub databases: Vec<String>,
    pub brokers: Vec<BrokerPlan>,
    pub subscriptions: Vec<SubscriptionPlan>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BrokerPlan {
    pub name: String,
    pub endpoint: String,
    /// `(topic, qos)` pairs subscribed on every (re)connect.
    pub topics: Vec<(String, u8)>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionPlan {
    #[serde(flatten)]
    pub subscription: Subscription,
    /// `database.table` the subscription resolves to, if any.
    pub target: Option<String>,
}

impl Plan {
    pub fn build(config: &Mqtt2DbConfig, warnings: Vec<String>) -> Self {
        let resolver = TopicResolver::new(config.subscriptions.clone());
        let brokers = config
            .brokers
            .iter()
            .map(|b| BrokerPlan {
                name: b.name.clone(),
                endpoint: format!("{}:{}", b.host, b.port),
                topics: resolver.topics_for(&b.name),
            })
            .collect();
        let subscriptions = config
            .subscriptions
            .iter()
            .map(|s| SubscriptionPlan {
                subscription: s.clone(),
                target: resolve_target(config, s),
            })
            .collect();
        Self {
            bucket: config.bucket,
            databases: config.databases.iter().map(|d| d.display_url()).collect(),
            brokers,
            subscriptions,
            warnings,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn resolve_target(config: &Mqtt2DbConfig, sub: &Subscription) -> Option<String> {
    let mut candidates = config
        .tables
        .iter()
        .filter(|t| t.table_name == sub.table)
        .filter(|t| sub.db.as_ref().is_none_or(|db| *db == t.db));
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(format!("{}.{}", first.db, first.table_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_lists_topics_and_targets() {
        let cfg = Mqtt2DbConfig::parse(
            r#"
[[databases]]
name = "weather"
host = "db"
username = "mqtt"
database_name = "weather"

[[tables]]
table_name = "raw_wind"
db = "weather"
columns = [{ column_name = "dt", type = "datetime" }, { column_name = "wind_speed", type = "float" }]

[[brokers]]
brokername = "home"
host = "mqtt.local"

[[subscriptions]]
topic = "wxstation/wind_speed"
table = "raw_wind"
column = "wind_speed"
broker = "home"

[[subscriptions]]
topic = "wxstation/rain"
table = "raw_rain"
column = "rain"
broker = "home"
"#,
        )
        .unwrap();
        let warnings = cfg.validate().unwrap();
        let plan = Plan::build(&cfg, warnings);
        assert_eq!(plan.brokers[0].endpoint, "mqtt.local:1883");
        assert_eq!(plan.brokers[0].topics.len(), 2);
        assert_eq!(plan.subscriptions[0].target.as_deref(), Some("weather.raw_wind"));
        assert_eq!(plan.subscriptions[1].target, None);
        assert_eq!(plan.warnings.len(), 1);

        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(json["subscriptions"][0]["topic"], "wxstation/wind_speed");
        assert_eq!(json["bucket"]["mode"], "window");
        assert_eq!(json["databases"][0], "mysql://mqtt:***@db:3306/weather");
    }
}
