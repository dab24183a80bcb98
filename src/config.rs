//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::Bootstrap;
use crate::taxonomy::{TagMap, Taxonomy};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    /// Operator identity written as creator of every migrated record
    #[serde(default = "default_creator_id")]
    pub creator_id: i64,

    /// Tag taxonomy offered by the review surface
    #[serde(default)]
    pub tags: TagMap,

    /// File the configuration was loaded from, used by taxonomy reloads
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// File-system locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_legacy_db")]
    pub legacy_db: String,

    #[serde(default = "default_current_db")]
    pub current_db: String,

    /// DDL batch for a fresh current store; bundled v0.17.1 schema when unset
    #[serde(default)]
    pub init_script: Option<String>,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Default value functions
fn default_legacy_db() -> String {
    "~/.memos/memos_prod.db".to_string()
}

fn default_current_db() -> String {
    "~/.local/share/memos-migrate/memos_prod_v0171.db".to_string()
}

fn default_log_dir() -> String {
    "./log".to_string()
}

fn default_creator_id() -> i64 {
    1
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            legacy_db: default_legacy_db(),
            current_db: default_current_db(),
            init_script: None,
            log_dir: default_log_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            creator_id: default_creator_id(),
            tags: TagMap::new(),
            source: None,
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./memos-migrate.yaml (current directory)
    /// 3. ~/.config/memos-migrate/memos-migrate.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "memos-migrate.yaml".to_string(),
            shellexpand::tilde("~/.config/memos-migrate/memos-migrate.yaml").to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("reading config {}", search_path))?;
                let mut config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("parsing config {}", search_path))?;
                config.source = Some(PathBuf::from(search_path));
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    pub fn legacy_db_path(&self) -> PathBuf {
        expand(&self.paths.legacy_db)
    }

    pub fn current_db_path(&self) -> PathBuf {
        expand(&self.paths.current_db)
    }

    pub fn log_dir(&self) -> PathBuf {
        expand(&self.paths.log_dir)
    }

    pub fn bootstrap(&self, overwrite: bool) -> Bootstrap {
        Bootstrap {
            script: self.paths.init_script.as_deref().map(expand),
            overwrite,
        }
    }

    /// Resolve the tag section into a validated taxonomy
    pub fn taxonomy(&self) -> crate::Result<Taxonomy> {
        Taxonomy::from_nodes(self.tags.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.creator_id, 1);
        assert!(config.tags.is_empty());
        assert!(config.paths.init_script.is_none());
        assert!(config.bootstrap(false).script.is_none());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r##"
paths:
  legacy_db: ~/memos/memos_prod_v0210.db
  current_db: /tmp/memos_v0171.db
  init_script: ./assets/memos_0171_struct.sql

creator_id: 3

tags:
  Reading:
    Books: "#Reading/Books "
    Papers: "#Reading/Papers "
  Journal: "#Journal "
"##;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.creator_id, 3);
        assert_eq!(config.current_db_path(), PathBuf::from("/tmp/memos_v0171.db"));
        assert!(!config.legacy_db_path().to_string_lossy().starts_with('~'));
        assert_eq!(config.paths.log_dir, "./log");

        let bootstrap = config.bootstrap(true);
        assert!(bootstrap.overwrite);
        assert_eq!(
            bootstrap.script,
            Some(PathBuf::from("./assets/memos_0171_struct.sql"))
        );

        let taxonomy = config.taxonomy().unwrap();
        assert_eq!(taxonomy.lookup("Reading/Books"), Some("#Reading/Books "));
        assert_eq!(taxonomy.lookup("Journal"), Some("#Journal "));
    }

    #[test]
    fn test_load_records_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "creator_id: 9\n").unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.creator_id, 9);
        assert_eq!(config.source, Some(path));
    }
}
