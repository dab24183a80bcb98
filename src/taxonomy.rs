//! Tag taxonomy: up to two levels of named tags, reloadable as a whole

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::{MigrateError, Result};

/// Tags keyed by name, in the order they are written in the config
pub type TagMap = IndexMap<String, TagNode>;

/// A literal tag or a named group of tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagNode {
    Leaf(String),
    Category(TagMap),
}

/// Validated taxonomy; categories contain leaves only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
    roots: TagMap,
}

impl Taxonomy {
    pub fn from_nodes(roots: TagMap) -> Result<Self> {
        for (name, node) in &roots {
            if let TagNode::Category(children) = node {
                for (child, child_node) in children {
                    if matches!(child_node, TagNode::Category(_)) {
                        return Err(MigrateError::Config(format!(
                            "tag '{}/{}' nests a third level, at most two are supported",
                            name, child
                        )));
                    }
                }
            }
        }
        Ok(Self { roots })
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Tag string at `Root` or `Root/Child`
    pub fn lookup(&self, path: &str) -> Option<&str> {
        let (root, child) = match path.split_once('/') {
            Some((root, child)) => (root, Some(child)),
            None => (path, None),
        };

        match (self.roots.get(root)?, child) {
            (TagNode::Leaf(tag), None) => Some(tag),
            (TagNode::Category(children), Some(child)) => match children.get(child)? {
                TagNode::Leaf(tag) => Some(tag),
                TagNode::Category(_) => None,
            },
            _ => None,
        }
    }

    /// Every addressable tag as `(path, tag)`, in config order
    pub fn entries(&self) -> Vec<(String, &str)> {
        let mut entries = Vec::new();
        for (name, node) in &self.roots {
            match node {
                TagNode::Leaf(tag) => entries.push((name.clone(), tag.as_str())),
                TagNode::Category(children) => {
                    for (child, child_node) in children {
                        if let TagNode::Leaf(tag) = child_node {
                            entries.push((format!("{}/{}", name, child), tag.as_str()));
                        }
                    }
                }
            }
        }
        entries
    }
}

/// Shared, swappable taxonomy snapshot
#[derive(Debug, Clone)]
pub struct TaxonomyHandle {
    current: Arc<RwLock<Arc<Taxonomy>>>,
    source: Option<PathBuf>,
}

impl TaxonomyHandle {
    pub fn new(taxonomy: Taxonomy, source: Option<PathBuf>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(taxonomy))),
            source,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.taxonomy()?, config.source.clone()))
    }

    pub fn snapshot(&self) -> Arc<Taxonomy> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read the config file and swap in its taxonomy. The previous
    /// snapshot stays in place when the file cannot be read or validated.
    pub fn reload(&self) -> Result<Arc<Taxonomy>> {
        let Some(path) = &self.source else {
            return Ok(self.snapshot());
        };

        let content = std::fs::read_to_string(path)
            .map_err(|e| MigrateError::Config(format!("reading {}: {}", path.display(), e)))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| MigrateError::Config(format!("parsing {}: {}", path.display(), e)))?;
        let fresh = Arc::new(config.taxonomy()?);

        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&fresh),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&fresh),
        }

        info!(path = %path.display(), tags = fresh.entries().len(), "reloaded tag taxonomy");
        Ok(fresh)
    }
}
