#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Engine(#[from] mqtt2db_engine::EngineError),

    #[error("database '{db}': {source}")]
    Storage {
        db: String,
        #[source]
        source: mqtt2db_api::IngestError,
    },

    #[error("no {0} configured")]
    NoComponents(&'static str),

    #[error("plan: {0}")]
    Plan(#[from] serde_json::Error),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
