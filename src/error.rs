use thiserror::Error;

#[derive(Debug, Error)]
pub enum WayfarerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub use crate::Result;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_variant_prefix() {
        let err = WayfarerError::Config("x".to_string());
        assert!(format!("{err}").contains("configuration error"));
        let err = WayfarerError::Storage("y".to_string());
        assert!(format!("{err}").contains("storage error"));
    }
}
