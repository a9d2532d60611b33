use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use verbtab_core::{validate_tab_name, Error, Paths, Result, Tab, TabPatch};

/// File-per-tab persistence under `<home>/tabs/`.
///
/// Each tab lives in its own JSON record, so a bad write to one tab never
/// touches another. Unreadable records are reported as absent.
#[derive(Debug, Clone)]
pub struct TabStore {
    paths: Paths,
}

impl TabStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Create the tabs directory if needed. Safe to call repeatedly.
    pub fn init(&self) -> Result<()> {
        self.paths.ensure_dirs()?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Tab> {
        if validate_tab_name(name).is_err() {
            return None;
        }
        read_record(&self.paths.tab_file(name))
    }

    /// Replace the whole record for `name`.
    pub fn set(&self, name: &str, tab: &Tab) -> Result<()> {
        validate_tab_name(name)?;
        self.init()?;

        let path = self.paths.tab_file(name);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tab)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Storage(format!("failed to write tab '{}': {}", name, e))
        })?;

        debug!(tab = %name, url = %tab.current_url, "Tab saved");
        Ok(())
    }

    /// Shallow-merge `patch` into an existing tab and return the result.
    pub fn update(&self, name: &str, patch: TabPatch) -> Result<Tab> {
        validate_tab_name(name)?;
        let mut tab = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("tab '{}'", name)))?;
        tab.apply(patch);
        self.set(name, &tab)?;
        Ok(tab)
    }

    /// Remove a tab. Removing a missing tab is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_tab_name(name)?;
        match fs::remove_file(self.paths.tab_file(name)) {
            Ok(()) => {
                debug!(tab = %name, "Tab deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all stored tabs, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.paths.tabs_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_tab_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn get_all(&self) -> Result<BTreeMap<String, Tab>> {
        let mut tabs = BTreeMap::new();
        for name in self.list()? {
            if let Some(tab) = self.get(&name) {
                tabs.insert(name, tab);
            }
        }
        Ok(tabs)
    }
}

fn read_record(path: &Path) -> Option<Tab> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read tab record");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(tab) => Some(tab),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt tab record, treating as absent");
            None
        }
    }
}
