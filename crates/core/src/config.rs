use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "embedding-service.toml";
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Where model weights are downloaded and cached.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_show_download_progress")]
    pub show_download_progress: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            show_download_progress: default_show_download_progress(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("embedding-service").join("models"))
        .unwrap_or_else(|| PathBuf::from(".fastembed_cache"))
}

fn default_show_download_progress() -> bool {
    true
}

impl ServiceConfig {
    /// Walk up from `start_dir` looking for `embedding-service.toml`.
    /// Returns default config if not found.
    pub fn discover(start_dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                let config = Self::parse_file(&candidate)?;
                return Ok((config, Some(candidate)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok((ServiceConfig::default(), None))
    }

    /// Load from a specific path. Returns default if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::parse_file(path)
        } else {
            Ok(ServiceConfig::default())
        }
    }

    /// Apply `PORT` from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_port_var(std::env::var(PORT_ENV).ok().as_deref())
    }

    fn apply_port_var(&mut self, value: Option<&str>) -> Result<()> {
        if let Some(raw) = value {
            self.server.port = raw
                .trim()
                .parse()
                .with_context(|| format!("{PORT_ENV} must be a port number, got {raw:?}"))?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert!(config.model.show_download_progress);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_discover_finds_toml() -> Result<()> {
        let dir = TempDir::new()?;
        let toml_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &toml_path,
            r#"
[server]
port = 8001

[model]
cache_dir = "/var/cache/models"
show_download_progress = false
"#,
        )?;

        let sub = dir.path().join("deep").join("nested");
        fs::create_dir_all(&sub)?;

        let (config, found) = ServiceConfig::discover(&sub)?;
        assert_eq!(found.as_deref(), Some(toml_path.as_path()));
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.model.cache_dir, PathBuf::from("/var/cache/models"));
        assert!(!config.model.show_download_progress);
        Ok(())
    }

    #[test]
    fn test_discover_returns_default_when_missing() -> Result<()> {
        let dir = TempDir::new()?;
        let (config, found) = ServiceConfig::discover(dir.path())?;
        assert!(found.is_none());
        assert_eq!(config.server.port, 8000);
        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_default() -> Result<()> {
        let dir = TempDir::new()?;
        let config = ServiceConfig::load(&dir.path().join("absent.toml"))?;
        assert_eq!(config.server.port, 8000);
        Ok(())
    }

    #[test]
    fn test_load_malformed_file_errors() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[server]\nport = \"eight thousand\"\n")?;
        assert!(ServiceConfig::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_port_var_overrides_file() -> Result<()> {
        let mut config = ServiceConfig::default();
        config.apply_port_var(Some("9100"))?;
        assert_eq!(config.server.port, 9100);

        config.apply_port_var(None)?;
        assert_eq!(config.server.port, 9100);
        Ok(())
    }

    #[test]
    fn test_bad_port_var_names_variable() {
        let mut config = ServiceConfig::default();
        let err = config.apply_port_var(Some("http")).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert_eq!(config.server.port, 8000);
    }
}
