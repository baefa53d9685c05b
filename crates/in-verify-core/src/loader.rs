// Link loading: the (step, keyid) -> filename relation from §6, and the
// "missing files for unauthorized keys are silently skipped" rule from
// §4.8 step 3.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::VerifyError;
use crate::model::Link;

/// Loads a link for one `(step, keyid)` pair, or `None` if it does not
/// exist. Missing links are not an error here; the threshold evaluator
/// (C5) is what enforces a minimum functionary count (§4.8 step 3).
pub trait LinkLoader {
    fn load(&self, step_name: &str, keyid: &str) -> Result<Option<Link>, VerifyError>;
}

/// Default loader: reads `{step_name}.{short_keyid}.link` JSON files from a
/// directory, per the filename format in §6. `short_keyid` is the first 8
/// hex characters of the functionary's keyid.
pub struct FileLinkLoader {
    dir: PathBuf,
}

impl FileLinkLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn link_path(&self, step_name: &str, keyid: &str) -> PathBuf {
        let short_keyid = &keyid[..keyid.len().min(8)];
        self.dir.join(format!("{step_name}.{short_keyid}.link"))
    }
}

impl LinkLoader for FileLinkLoader {
    fn load(&self, step_name: &str, keyid: &str) -> Result<Option<Link>, VerifyError> {
        let path = self.link_path(step_name, keyid);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| VerifyError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let link: Link = serde_json::from_str(&content).map_err(|e| VerifyError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(link))
    }
}

/// Populate the chain-link dictionary: for each step, attempt to load every
/// link whose `(step, keyid)` pair is named in `step.pubkeys` (§4.8 step 3).
pub fn load_chain_links(
    steps: &[crate::model::Step],
    loader: &dyn LinkLoader,
) -> Result<HashMap<String, HashMap<String, Link>>, VerifyError> {
    let mut chain = HashMap::new();
    for step in steps {
        let mut by_key = HashMap::new();
        for keyid in &step.pubkeys {
            if let Some(link) = loader.load(&step.name, keyid)? {
                by_key.insert(keyid.clone(), link);
            }
        }
        chain.insert(step.name.clone(), by_key);
    }
    Ok(chain)
}

/// An in-memory loader for tests: no filesystem I/O.
#[derive(Debug, Default, Clone)]
pub struct MemoryLinkLoader {
    pub links: HashMap<(String, String), Link>,
}

impl MemoryLinkLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step_name: impl Into<String>, keyid: impl Into<String>, link: Link) {
        self.links.insert((step_name.into(), keyid.into()), link);
    }
}

impl LinkLoader for MemoryLinkLoader {
    fn load(&self, step_name: &str, keyid: &str) -> Result<Option<Link>, VerifyError> {
        Ok(self.links.get(&(step_name.to_string(), keyid.to_string())).cloned())
    }
}

