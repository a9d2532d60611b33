pub mod browser;
pub mod cache;
pub mod extract;
pub mod fetch;
pub mod planner;
pub mod resolve;

pub use browser::{head_lines, normalize_url, Browser, Opened};
pub use cache::{should_reuse, DiscoverOptions, Discovery, DiscoverySource, VerbCachePolicy};
pub use extract::{extract, sanitize_verb_name, Extraction};
pub use fetch::{create_fetcher, Fetcher, HttpFetcher, LynxFetcher, Page};
pub use planner::{LlmPlanner, Planner};
pub use resolve::{Navigation, Outcome, PlanSource, Resolver, Route};
