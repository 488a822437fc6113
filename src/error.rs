//! Application-wide error types.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn store_error_display() {
        let e = AppError::Store("busy".into());
        assert!(e.to_string().contains("store error"));
    }

    #[test]
    fn provider_error_converts() {
        let p = ProviderError::Request("timeout".into());
        let e: AppError = p.into();
        assert!(e.to_string().contains("timeout"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
