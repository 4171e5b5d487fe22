//! Identity pack loading.
//!
//! Identity data tolerates partial failure: missing sections are recorded in
//! the load result, never fatal.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

/// Best-effort identity load: the sections that were found plus the names of
/// the ones that were not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityLoad {
    pub sections: BTreeMap<String, String>,
    pub missing: Vec<String>,
}

impl IdentityLoad {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

pub trait IdentityProvider: Send + Sync {
    fn load(&self) -> IdentityLoad;
}

/// Default identity sections a complete persona directory carries.
pub const DEFAULT_SECTIONS: &[&str] = &["persona", "voice", "boundaries"];

/// Reads one markdown file per expected section from a directory.
pub struct FileIdentityProvider {
    dir: PathBuf,
    sections: Vec<String>,
}

impl FileIdentityProvider {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            sections: DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.sections = sections;
        self
    }
}

impl IdentityProvider for FileIdentityProvider {
    fn load(&self) -> IdentityLoad {
        let mut load = IdentityLoad::default();
        for section in &self.sections {
            let path = self.dir.join(format!("{section}.md"));
            match std::fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => {
                    load.sections.insert(section.clone(), content);
                }
                Ok(_) => {
                    debug!(section = section.as_str(), "identity section file is empty");
                    load.missing.push(section.clone());
                }
                Err(e) => {
                    debug!(section = section.as_str(), error = %e, "identity section unavailable");
                    load.missing.push(section.clone());
                }
            }
        }
        load
    }
}

/// Fixed in-memory identity, for embedding and tests.
#[derive(Default)]
pub struct StaticIdentityProvider {
    load: IdentityLoad,
}

impl StaticIdentityProvider {
    pub fn new(sections: BTreeMap<String, String>) -> Self {
        Self {
            load: IdentityLoad {
                sections,
                missing: Vec::new(),
            },
        }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn load(&self) -> IdentityLoad {
        self.load.clone()
    }
}
