use std::path::PathBuf;

/// Environment variable that relocates the whole state directory.
pub const HOME_ENV: &str = "VERBTAB_HOME";

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        if let Some(base) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self { base: PathBuf::from(base) };
        }
        let base = dirs::home_dir()
            .map(|h| h.join(".verbtab"))
            .unwrap_or_else(|| PathBuf::from(".verbtab"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn tabs_dir(&self) -> PathBuf {
        self.base.join("tabs")
    }

    /// Record path for a tab. Callers validate the name first; the name
    /// pattern admits no path separators.
    pub fn tab_file(&self, name: &str) -> PathBuf {
        self.tabs_dir().join(format!("{}.json", name))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.tabs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
