use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Tool '{name}' already registered")]
    DuplicateTool { name: String },
    #[error("Tool error: {0}")]
    Tool(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
