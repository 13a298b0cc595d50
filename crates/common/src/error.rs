//! Configuration and file errors shared by the service crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = Error::Config("max_tasks must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: max_tasks must be greater than 0"
        );
    }

    #[test]
    fn io_error_converts() {
        fn open() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "accounts dir"))?;
            Ok(())
        }
        let err = open().unwrap_err();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
    }

    #[test]
    fn toml_error_converts() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("not = [valid");
        let err: Error = parsed.unwrap_err().into();
        assert!(err.to_string().starts_with("TOML parse error:"), "got: {err}");
    }
}
