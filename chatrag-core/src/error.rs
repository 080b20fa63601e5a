use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatragError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IPC error: {0}")]
    Ipc(String),
}

impl From<rmp_serde::encode::Error> for ChatragError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ChatragError::Ipc(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ChatragError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        ChatragError::Ipc(e.to_string())
    }
}
