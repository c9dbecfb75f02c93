use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::MAX_BATCH_SIZE;
use crate::error::{ClientError, ClientResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Largest encoded batch accepted for submission.
    pub max_batch_bytes: usize,
    /// Objects fetched per listing page.
    pub list_page_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: MAX_BATCH_SIZE,
            list_page_size: 1024,
        }
    }
}

impl ClientConfig {
    pub fn from_toml(text: &str) -> ClientResult<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ClientResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ClientConfig::default();
        assert_eq!(c.max_batch_bytes, 64 * 1024 * 1024);
        assert_eq!(c.list_page_size, 1024);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ClientConfig::from_toml("list_page_size = 16\n").unwrap();
        assert_eq!(c.list_page_size, 16);
        assert_eq!(c.max_batch_bytes, MAX_BATCH_SIZE);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "max_batch_bytes = 4096\n").unwrap();
        assert_eq!(ClientConfig::load(&path).unwrap().max_batch_bytes, 4096);
        assert!(ClientConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            ClientConfig::from_toml("list_page_size = \"many\""),
            Err(ClientError::Config(_))
        ));
    }
}
