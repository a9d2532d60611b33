pub mod close;
pub mod doctor;
pub mod open;
pub mod refine;
pub mod tabs;
pub mod text;
pub mod verbs;

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use verbtab_browse::{create_fetcher, Browser, DiscoverySource, LlmPlanner};
use verbtab_core::{Config, Paths, Verb};
use verbtab_storage::TabStore;

/// Everything a command needs, built once per invocation.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    pub planner: Arc<LlmPlanner>,
    pub browser: Browser,
}

pub fn load() -> anyhow::Result<Context> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let fetcher = create_fetcher(&config.fetcher)?;
    let planner = Arc::new(LlmPlanner::from_config(&config));
    debug!(
        home = %paths.base.display(),
        fetcher = %fetcher.name(),
        planner = planner.model().unwrap_or("none"),
        "Context loaded"
    );
    let browser = Browser::new(TabStore::new(paths.clone()), fetcher, planner.clone());
    Ok(Context {
        paths,
        config,
        planner,
        browser,
    })
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_verbs(verbs: &[Verb], indent: usize) {
    let width = verbs.iter().map(|v| v.name.len()).max().unwrap_or(0);
    let pad = "  ".repeat(indent + 1);
    for verb in verbs {
        let mut line = format!("{}{:<width$}  {:<8}  {}", pad, verb.name, verb.verb_type.as_str(), verb.description);
        if let Some(params) = verb.params.as_ref().filter(|p| !p.is_empty()) {
            line.push_str(&format!(" ({})", params.join(", ")));
        }
        if let Some(target) = verb.target().filter(|_| !verb.is_container()) {
            line.push_str(&format!(" -> {}", target));
        }
        println!("{}", line.trim_end());
        if verb.is_container() {
            print_verbs(verb.subverbs(), indent + 1);
        }
    }
}

/// One-line note about where verbs came from; planner trouble goes to stderr.
pub fn describe_source(source: &DiscoverySource) -> Option<String> {
    match source {
        DiscoverySource::Cache => Some("cached".to_string()),
        DiscoverySource::Structural => Some("from page structure".to_string()),
        DiscoverySource::Planner => Some("from planner".to_string()),
        DiscoverySource::PlannerNotConfigured { reason } => {
            eprintln!("Planner not configured: {}", reason);
            None
        }
        DiscoverySource::PlannerFailed { reason } => {
            eprintln!("Planner failed: {}", reason);
            None
        }
    }
}
