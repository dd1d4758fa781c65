//! Error handling for the SNMP agent simulator

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("PDU decode error: {0}")]
    Decode(String),

    #[error("PDU encode error: {0}")]
    Encode(String),

    #[error("USM error: {0}")]
    Usm(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Value producer error: {0}")]
    Producer(String),

    #[error("Behavior chain error: {0}")]
    Behavior(String),

    #[error("Simulation engine error: {0}")]
    Simulation(String),

    #[error("Control surface error: {0}")]
    Control(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    pub fn usm<S: Into<String>>(msg: S) -> Self {
        Self::Usm(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    pub fn producer<S: Into<String>>(msg: S) -> Self {
        Self::Producer(msg.into())
    }

    pub fn behavior<S: Into<String>>(msg: S) -> Self {
        Self::Behavior(msg.into())
    }

    pub fn simulation<S: Into<String>>(msg: S) -> Self {
        Self::Simulation(msg.into())
    }

    pub fn control<S: Into<String>>(msg: S) -> Self {
        Self::Control(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
