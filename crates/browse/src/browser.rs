use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use verbtab_core::{validate_tab_name, Error, Result, Tab, TabPatch, Verb, VerbCache};
use verbtab_storage::TabStore;

use crate::cache::{DiscoverOptions, Discovery, DiscoverySource, VerbCachePolicy};
use crate::extract::extract;
use crate::fetch::{Fetcher, Page};
use crate::planner::Planner;
use crate::resolve::{Outcome, Resolver};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of opening a tab.
#[derive(Debug, Clone, Serialize)]
pub struct Opened {
    pub name: String,
    pub tab: Tab,
    #[serde(skip)]
    pub page: Page,
    pub verbs: Vec<Verb>,
}

/// Tab operations over an explicit store, fetcher and planner.
pub struct Browser {
    store: TabStore,
    fetcher: Arc<dyn Fetcher>,
    planner: Arc<dyn Planner>,
    clock: Clock,
}

impl Browser {
    pub fn new(store: TabStore, fetcher: Arc<dyn Fetcher>, planner: Arc<dyn Planner>) -> Self {
        Self {
            store,
            fetcher,
            planner,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &TabStore {
        &self.store
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn planner(&self) -> &dyn Planner {
        self.planner.as_ref()
    }

    fn policy(&self) -> VerbCachePolicy<'_> {
        VerbCachePolicy::new(&self.store, self.fetcher.as_ref(), self.planner.as_ref())
    }

    fn load(&self, name: &str) -> Result<Tab> {
        validate_tab_name(name)?;
        self.store
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("tab '{}'", name)))
    }

    /// Create (or replace) a tab at `url` and store its structural verbs.
    pub async fn open(&self, name: &str, url: &str) -> Result<Opened> {
        validate_tab_name(name)?;
        let url = normalize_url(url)?;
        let now = (self.clock)();

        let page = self.fetcher.fetch(&url).await?;
        let current_url = if page.url.is_empty() { url } else { page.url.clone() };
        let verbs = extract(&page.html, &page.text, &current_url).verbs;

        let mut tab = Tab::new(&current_url, now);
        tab.apply(TabPatch::discovered(VerbCache::from_verbs(verbs.clone()), now));
        self.store.set(name, &tab)?;

        info!(tab = %name, url = %current_url, verbs = verbs.len(), "Tab opened");
        Ok(Opened {
            name: name.to_string(),
            tab,
            page,
            verbs,
        })
    }

    /// Verbs of a tab, from cache when fresh.
    pub async fn verbs(&self, name: &str, opts: &DiscoverOptions) -> Result<Discovery> {
        validate_tab_name(name)?;
        self.policy().discover(name, opts, (self.clock)()).await
    }

    /// Run `root` (or `root child`) on a tab.
    pub async fn execute(&self, name: &str, root: &str, child: Option<&str>, opts: &DiscoverOptions) -> Result<Outcome> {
        let discovery = self.verbs(name, opts).await?;
        match discovery.source {
            DiscoverySource::PlannerNotConfigured { reason } => {
                return Err(Error::Unavailable(format!("verb '{}': {}", root, reason)))
            }
            DiscoverySource::PlannerFailed { reason } => {
                return Err(Error::Provider(format!(
                    "discovering verbs for '{}' failed: {}",
                    root, reason
                )))
            }
            DiscoverySource::Cache | DiscoverySource::Structural | DiscoverySource::Planner => {}
        }
        let tab = self.load(name)?;
        Resolver::new(&self.store, self.fetcher.as_ref(), self.planner.as_ref())
            .execute(name, &tab, &discovery.verbs, root, child, (self.clock)())
            .await
    }

    /// Re-extract verbs with the planner under `guidance`, for the whole tab
    /// or only inside the container `scope`.
    pub async fn refine(&self, name: &str, guidance: &str, scope: Option<&str>) -> Result<Discovery> {
        let opts = DiscoverOptions {
            bypass_cache: true,
            use_planner: true,
            guidance: Some(guidance.to_string()),
            scope: scope.map(str::to_string),
        };
        self.verbs(name, &opts).await
    }

    /// Fresh copy of the tab's current page.
    pub async fn page(&self, name: &str) -> Result<Page> {
        let tab = self.load(name)?;
        self.fetcher.fetch(&tab.current_url).await
    }

    pub fn tabs(&self) -> Result<BTreeMap<String, Tab>> {
        self.store.get_all()
    }

    /// Returns whether the tab existed.
    pub fn close(&self, name: &str) -> Result<bool> {
        validate_tab_name(name)?;
        let existed = self.store.get(name).is_some();
        self.store.delete(name)?;
        if existed {
            info!(tab = %name, "Tab closed");
        }
        Ok(existed)
    }
}

/// Trim and default the scheme to https.
pub fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::Validation("URL must not be empty".to_string()));
    }
    if url.contains("://") {
        Ok(url.to_string())
    } else {
        Ok(format!("https://{}", url))
    }
}

/// First `lines` lines of page text.
pub fn head_lines(text: &str, lines: usize) -> String {
    text.lines().take(lines).collect::<Vec<_>>().join("\n")
}
