//! When to trust a tab's cached verbs, and how to rebuild them when not.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use verbtab_core::types::{is_valid_verb_name, MAX_VERB_DEPTH};
use verbtab_core::{Error, Result, Tab, TabPatch, Verb, VerbCache, VerbType};
use verbtab_storage::TabStore;

use crate::extract::{extract, MAX_VERBS};
use crate::fetch::{Fetcher, Page};
use crate::planner::Planner;

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    pub bypass_cache: bool,
    /// Ask the planner instead of the structural extractor.
    pub use_planner: bool,
    pub guidance: Option<String>,
    /// Rebuild only the subverbs of this top-level verb. Implies the planner.
    pub scope: Option<String>,
}

impl DiscoverOptions {
    fn wants_planner(&self) -> bool {
        self.use_planner || self.scope.is_some() || self.guidance_text().is_some()
    }

    fn guidance_text(&self) -> Option<&str> {
        self.guidance.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }
}

/// Where a discovered verb list came from. Planner trouble is reported here
/// instead of failing discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoverySource {
    Cache,
    Structural,
    Planner,
    PlannerNotConfigured { reason: String },
    PlannerFailed { reason: String },
}

impl DiscoverySource {
    /// True when the verbs were persisted (or already were).
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Cache | Self::Structural | Self::Planner)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
    pub verbs: Vec<Verb>,
    pub source: DiscoverySource,
    #[serde(skip)]
    pub page: Option<Page>,
    pub expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Reuse iff a cache exists, the caller did not ask to bypass it, and it
/// has not expired.
pub fn should_reuse(tab: &Tab, bypass_cache: bool, now: DateTime<Utc>) -> bool {
    !bypass_cache && tab.fresh_verbs(now).is_some()
}

pub struct VerbCachePolicy<'a> {
    store: &'a TabStore,
    fetcher: &'a dyn Fetcher,
    planner: &'a dyn Planner,
}

impl<'a> VerbCachePolicy<'a> {
    pub fn new(store: &'a TabStore, fetcher: &'a dyn Fetcher, planner: &'a dyn Planner) -> Self {
        Self {
            store,
            fetcher,
            planner,
        }
    }

    pub async fn discover(&self, tab_name: &str, opts: &DiscoverOptions, now: DateTime<Utc>) -> Result<Discovery> {
        let tab = self
            .store
            .get(tab_name)
            .ok_or_else(|| Error::NotFound(format!("tab '{}'", tab_name)))?;

        if let Some(scope) = opts.scope.as_deref() {
            if !is_valid_verb_name(scope) {
                return Err(Error::Validation(format!("invalid container name '{}'", scope)));
            }
        }

        if opts.scope.is_none() && should_reuse(&tab, opts.bypass_cache, now) {
            if let Some(cache) = tab.fresh_verbs(now) {
                debug!(tab = %tab_name, count = cache.len(), "Reusing cached verbs");
                return Ok(Discovery {
                    verbs: cache.verbs().to_vec(),
                    source: DiscoverySource::Cache,
                    page: None,
                    expires: tab.verb_cache_expires,
                    scope: None,
                });
            }
        }

        let page = self.fetcher.fetch(&tab.current_url).await?;
        let base_url = if page.url.is_empty() {
            tab.current_url.clone()
        } else {
            page.url.clone()
        };

        if !opts.wants_planner() {
            let verbs = extract(&page.html, &page.text, &base_url).verbs;
            info!(tab = %tab_name, url = %base_url, count = verbs.len(), "Structural verbs extracted");
            return self.store_verbs(tab_name, verbs, DiscoverySource::Structural, page, now);
        }

        let guidance = opts.guidance_text();
        let extracted = match self
            .planner
            .extract(&page.text, &base_url, guidance, Some(&page.html))
            .await
        {
            Ok(verbs) => normalize(verbs, opts.scope.is_some()),
            Err(Error::Unavailable(reason)) => {
                warn!(tab = %tab_name, reason = %reason, "Planner not configured, no verbs discovered");
                return Ok(degraded(DiscoverySource::PlannerNotConfigured { reason }, page, opts));
            }
            Err(e) => {
                warn!(tab = %tab_name, error = %e, "Planner extraction failed, no verbs discovered");
                let reason = e.to_string();
                return Ok(degraded(DiscoverySource::PlannerFailed { reason }, page, opts));
            }
        };

        match opts.scope.as_deref() {
            None => {
                info!(tab = %tab_name, count = extracted.len(), "Planner verbs extracted");
                self.store_verbs(tab_name, extracted, DiscoverySource::Planner, page, now)
            }
            Some(scope) => {
                let mut cache = tab.verb_cache.clone().unwrap_or_default();
                match cache.get_mut(scope) {
                    Some(container) => container.subverbs = Some(extracted),
                    None => cache.insert(
                        Verb::new(scope, guidance.unwrap_or(scope), VerbType::Action).with_subverbs(extracted),
                    ),
                }
                info!(tab = %tab_name, scope = %scope, "Container subverbs replaced");
                let mut discovery =
                    self.store_verbs(tab_name, cache.into_verbs(), DiscoverySource::Planner, page, now)?;
                discovery.scope = Some(scope.to_string());
                Ok(discovery)
            }
        }
    }

    fn store_verbs(
        &self,
        tab_name: &str,
        verbs: Vec<Verb>,
        source: DiscoverySource,
        page: Page,
        now: DateTime<Utc>,
    ) -> Result<Discovery> {
        let cache = VerbCache::from_verbs(verbs);
        let tab = self.store.update(tab_name, TabPatch::discovered(cache, now))?;
        Ok(Discovery {
            verbs: tab.verb_cache.map(VerbCache::into_verbs).unwrap_or_default(),
            source,
            page: Some(page),
            expires: tab.verb_cache_expires,
            scope: None,
        })
    }
}

/// Degraded planner discovery leaves the stored cache untouched.
fn degraded(source: DiscoverySource, page: Page, opts: &DiscoverOptions) -> Discovery {
    Discovery {
        verbs: Vec::new(),
        source,
        page: Some(page),
        expires: None,
        scope: opts.scope.clone(),
    }
}

/// Planner output is untrusted: at every level drop malformed names, dedupe
/// and cap, and cut nesting at [`MAX_VERB_DEPTH`].
/// Scoped output lands one level down, under its container.
fn normalize(verbs: Vec<Verb>, scoped: bool) -> Vec<Verb> {
    normalize_level(verbs, if scoped { 2 } else { 1 })
}

fn normalize_level(verbs: Vec<Verb>, depth: usize) -> Vec<Verb> {
    let valid = verbs.into_iter().filter_map(|mut v| {
        if !is_valid_verb_name(&v.name) {
            warn!(verb = %v.name, "Dropping planner verb with malformed name");
            return None;
        }
        if let Some(children) = v.subverbs.take() {
            if depth >= MAX_VERB_DEPTH {
                warn!(verb = %v.name, depth, "Dropping planner subverbs nested too deeply");
            } else {
                let children = normalize_level(children, depth + 1);
                if !children.is_empty() {
                    v.subverbs = Some(children);
                }
            }
        }
        Some(v)
    });
    let mut verbs = VerbCache::from_verbs(valid).into_verbs();
    verbs.truncate(MAX_VERBS);
    verbs
}
