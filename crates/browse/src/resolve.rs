//! Execution resolver: from a verb path on a tab to a navigation, a
//! container listing, or a reported failure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;
use verbtab_core::types::{plan_cache_key, PlanMethod};
use verbtab_core::{Error, ExecutionPlan, Result, Tab, TabPatch, Verb, VerbType};
use verbtab_storage::TabStore;

use crate::fetch::{Fetcher, Page};
use crate::planner::Planner;

/// The verb a path points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection<'a> {
    /// A top-level verb with subverbs and no child named: list, never execute.
    Container(&'a Verb),
    /// `identity` is `root` or `root.child`.
    Active { verb: &'a Verb, identity: String },
}

pub fn select<'a>(verbs: &'a [Verb], tab_name: &str, root: &str, child: Option<&str>) -> Result<Selection<'a>> {
    let root_verb = verbs
        .iter()
        .find(|v| v.name == root)
        .ok_or_else(|| Error::NotFound(format!("verb '{}' in tab '{}'", root, tab_name)))?;

    match child {
        Some(child) => {
            let verb = root_verb.find_subverb(child).ok_or_else(|| {
                Error::NotFound(format!("subverb '{}' under '{}' in tab '{}'", child, root, tab_name))
            })?;
            Ok(Selection::Active {
                verb,
                identity: format!("{}.{}", root, child),
            })
        }
        None if root_verb.is_container() => Ok(Selection::Container(root_verb)),
        None => Ok(Selection::Active {
            verb: root_verb,
            identity: root.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Navigate verb with a target: no planner involved.
    Deterministic { target: String },
    /// Needs a plan, looked up or requested under `key`.
    Planned { key: String },
}

pub fn route(verb: &Verb, identity: &str, current_url: &str) -> Route {
    match (verb.verb_type, verb.target()) {
        (VerbType::Navigate, Some(target)) => Route::Deterministic {
            target: target.to_string(),
        },
        _ => Route::Planned {
            key: plan_cache_key(identity, current_url),
        },
    }
}

/// Anchor a relative target to the origin of `current_url`. Absolute
/// targets, and targets that cannot be anchored, are returned as given.
pub fn resolve_against_origin(current_url: &str, target: &str) -> String {
    if Url::parse(target).is_ok() {
        return target.to_string();
    }
    let Ok(current) = Url::parse(current_url) else {
        return target.to_string();
    };
    let origin = format!("{}/", current.origin().ascii_serialization());
    match Url::parse(&origin).and_then(|o| o.join(target)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => target.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Deterministic,
    Cached,
    Planner,
}

#[derive(Debug, Clone, Serialize)]
pub struct Navigation {
    pub verb: String,
    pub plan: ExecutionPlan,
    pub plan_source: PlanSource,
    pub from_url: String,
    pub to_url: String,
    #[serde(skip)]
    pub page: Page,
    pub tab: Tab,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Listed { container: Verb },
    Navigated(Box<Navigation>),
}

pub struct Resolver<'a> {
    store: &'a TabStore,
    fetcher: &'a dyn Fetcher,
    planner: &'a dyn Planner,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a TabStore, fetcher: &'a dyn Fetcher, planner: &'a dyn Planner) -> Self {
        Self {
            store,
            fetcher,
            planner,
        }
    }

    /// Run one path through the state machine. `verbs` is the tab's current
    /// top-level verb list.
    pub async fn execute(
        &self,
        tab_name: &str,
        tab: &Tab,
        verbs: &[Verb],
        root: &str,
        child: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let (verb, identity) = match select(verbs, tab_name, root, child)? {
            Selection::Container(container) => {
                debug!(tab = %tab_name, verb = %root, "Listing container subverbs");
                return Ok(Outcome::Listed {
                    container: container.clone(),
                });
            }
            Selection::Active { verb, identity } => (verb, identity),
        };

        let (plan, plan_source) = match route(verb, &identity, &tab.current_url) {
            Route::Deterministic { target } => (
                ExecutionPlan::navigate(&target, &verb.description),
                PlanSource::Deterministic,
            ),
            Route::Planned { key } => self.planned(tab_name, tab, verb, &identity, key).await?,
        };

        match plan.method {
            PlanMethod::Navigate => {
                let target = plan
                    .target_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| Error::NoPlan(format!("verb '{}': plan has no target URL", identity)))?;
                let resolved = resolve_against_origin(&tab.current_url, target);

                info!(tab = %tab_name, verb = %identity, from = %tab.current_url, to = %resolved, "Navigating");
                let page = self.fetcher.fetch(&resolved).await?;
                let to_url = if page.url.is_empty() {
                    resolved
                } else {
                    page.url.clone()
                };
                let updated = self.store.update(tab_name, TabPatch::navigated(&to_url, now))?;

                Ok(Outcome::Navigated(Box::new(Navigation {
                    verb: identity,
                    plan,
                    plan_source,
                    from_url: tab.current_url.clone(),
                    to_url,
                    page,
                    tab: updated,
                })))
            }
            method => Err(Error::UnsupportedMethod(format!(
                "verb '{}' needs '{}', only navigate is supported",
                identity, method
            ))),
        }
    }

    async fn planned(
        &self,
        tab_name: &str,
        tab: &Tab,
        verb: &Verb,
        identity: &str,
        key: String,
    ) -> Result<(ExecutionPlan, PlanSource)> {
        if let Some(plan) = tab.cached_plan(&key) {
            debug!(tab = %tab_name, verb = %identity, "Reusing cached plan");
            return Ok((plan.clone(), PlanSource::Cached));
        }

        if !self.planner.is_available() {
            return Err(Error::Unavailable(format!(
                "verb '{}' has no direct target and needs a planner",
                identity
            )));
        }

        let page = self.fetcher.fetch(&tab.current_url).await?;
        let plan = match self.planner.plan(verb, &page.html, &tab.current_url).await {
            Ok(Some(plan)) => plan,
            Ok(None) => return Err(Error::NoPlan(format!("verb '{}'", identity))),
            Err(Error::Unavailable(reason)) => {
                return Err(Error::Unavailable(format!("verb '{}': {}", identity, reason)))
            }
            Err(e) => return Err(Error::Provider(format!("planning verb '{}' failed: {}", identity, e))),
        };

        let mut plans = tab.execution_plan_cache.clone().unwrap_or_default();
        plans.insert(key, plan.clone());
        self.store.update(tab_name, TabPatch::plans(plans))?;
        debug!(tab = %tab_name, verb = %identity, method = %plan.method, "Plan cached");

        Ok((plan, PlanSource::Planner))
    }
}
