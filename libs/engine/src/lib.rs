pub mod config;
pub mod dispatch;
pub mod error;
pub mod plan;
pub mod reconcile;
pub mod registry;
pub mod resolver;

pub use config::{BrokerConfig, ConfigParser, DatabaseConfig, Mqtt2DbConfig, Subscription, TomlParser};
pub use dispatch::{DispatchClosed, DispatchStats, MessageSender};
pub use error::EngineError;
pub use plan::Plan;
pub use reconcile::{Decision, DropReason, Outcome, Reconciler};
pub use registry::{RegisteredTable, SchemaRegistry};
pub use resolver::TopicResolver;
