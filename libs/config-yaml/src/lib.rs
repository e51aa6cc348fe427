use mqtt2db_engine::config::{ConfigParser, Mqtt2DbConfig};
use mqtt2db_engine::error::EngineError;

pub struct YamlParser;

impl ConfigParser for YamlParser {
    fn extensions(&self) -> &[&str] {
        &["yaml", "yml"]
    }

    fn parse(&self, content: &str) -> Result<Mqtt2DbConfig, EngineError> {
        serde_yaml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))
    }
}
