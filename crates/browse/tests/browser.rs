use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use verbtab_browse::{
    Browser, DiscoverOptions, DiscoverySource, Fetcher, Outcome, Page, PlanSource, Planner, VerbCachePolicy,
};
use verbtab_core::types::{plan_cache_key, PlanMethod};
use verbtab_core::{Error, ExecutionPlan, Paths, Result, Verb, VerbType};
use verbtab_storage::TabStore;

const HOME: &str = r#"<html><body>
  <h1>Example</h1>
  <a href="/about">About</a>
  <a href="https://example.com/blog">Blog posts</a>
  <button onclick="share()">Share</button>
</body></html>"#;

#[derive(Default)]
struct FakeFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn with(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(html) => Ok(Page {
                url: url.to_string(),
                text: format!("text of {}", url),
                html: html.clone(),
            }),
            None => Err(Error::Fetch(format!("failed to fetch {}: HTTP 404", url))),
        }
    }

    fn check_installed(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

enum Reply<T> {
    Answer(T),
    Fail(String),
}

struct FakePlanner {
    available: bool,
    verbs: Reply<Vec<Verb>>,
    plan: Reply<Option<ExecutionPlan>>,
    extract_calls: AtomicUsize,
    plan_calls: AtomicUsize,
    guidance: Mutex<Vec<Option<String>>>,
}

impl FakePlanner {
    fn unavailable() -> Self {
        Self {
            available: false,
            verbs: Reply::Answer(Vec::new()),
            plan: Reply::Answer(None),
            extract_calls: AtomicUsize::new(0),
            plan_calls: AtomicUsize::new(0),
            guidance: Mutex::new(Vec::new()),
        }
    }

    fn answering(verbs: Vec<Verb>, plan: Option<ExecutionPlan>) -> Self {
        Self {
            available: true,
            verbs: Reply::Answer(verbs),
            plan: Reply::Answer(plan),
            ..Self::unavailable()
        }
    }

    fn failing(reason: &str) -> Self {
        Self {
            available: true,
            verbs: Reply::Fail(reason.to_string()),
            plan: Reply::Fail(reason.to_string()),
            ..Self::unavailable()
        }
    }
}

#[async_trait]
impl Planner for FakePlanner {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn extract(&self, _text: &str, _url: &str, guidance: Option<&str>, _html: Option<&str>) -> Result<Vec<Verb>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.guidance.lock().unwrap().push(guidance.map(str::to_string));
        if !self.available {
            return Err(Error::Unavailable("no planner provider configured".to_string()));
        }
        match &self.verbs {
            Reply::Answer(v) => Ok(v.clone()),
            Reply::Fail(reason) => Err(Error::Provider(reason.clone())),
        }
    }

    async fn plan(&self, _verb: &Verb, _html: &str, _current_url: &str) -> Result<Option<ExecutionPlan>> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(Error::Unavailable("no planner provider configured".to_string()));
        }
        match &self.plan {
            Reply::Answer(p) => Ok(p.clone()),
            Reply::Fail(reason) => Err(Error::Provider(reason.clone())),
        }
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

struct Harness {
    _dir: tempfile::TempDir,
    fetcher: Arc<FakeFetcher>,
    planner: Arc<FakePlanner>,
    browser: Browser,
}

fn harness(fetcher: FakeFetcher, planner: FakePlanner) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = TabStore::new(Paths::with_base(dir.path().to_path_buf()));
    let fetcher = Arc::new(fetcher);
    let planner = Arc::new(planner);
    let browser = Browser::new(store, fetcher.clone(), planner.clone()).with_clock(t0);
    Harness {
        _dir: dir,
        fetcher,
        planner,
        browser,
    }
}

fn site() -> FakeFetcher {
    FakeFetcher::default()
        .with("https://example.com", HOME)
        .with("https://example.com/about", "<html><body><p>About page</p></body></html>")
        .with("https://example.com/pricing", "<html><body>Pricing</body></html>")
}

#[tokio::test]
async fn test_open_then_execute_about_navigates_and_clears_caches() {
    let h = harness(site(), FakePlanner::unavailable());

    let opened = h.browser.open("t", "https://example.com").await.unwrap();
    assert_eq!(opened.tab.current_url, "https://example.com");
    let names: Vec<_> = opened.verbs.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["about", "blog-posts", "share"]);

    let outcome = h
        .browser
        .execute("t", "about", None, &DiscoverOptions::default())
        .await
        .unwrap();
    let Outcome::Navigated(nav) = outcome else {
        panic!("expected navigation");
    };
    assert_eq!(nav.plan_source, PlanSource::Deterministic);
    assert_eq!(nav.from_url, "https://example.com");
    assert_eq!(nav.to_url, "https://example.com/about");
    assert_eq!(h.planner.plan_calls.load(Ordering::SeqCst), 0);

    let stored = h.browser.store().get("t").unwrap();
    assert_eq!(stored.current_url, "https://example.com/about");
    assert!(stored.verb_cache.is_none());
    assert!(stored.verb_cache_expires.is_none());
    assert!(stored.execution_plan_cache.is_none());
    assert_eq!(stored, nav.tab);
}

#[tokio::test]
async fn test_open_normalizes_scheme_and_rejects_bad_names() {
    let h = harness(site(), FakePlanner::unavailable());
    let opened = h.browser.open("t", "example.com").await.unwrap();
    assert_eq!(opened.tab.current_url, "https://example.com");

    let err = h.browser.open("bad name", "https://example.com").await.unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m.contains("bad name")));
    assert_eq!(h.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_open_fetch_failure_creates_nothing() {
    let h = harness(site(), FakePlanner::unavailable());
    let err = h.browser.open("t", "https://missing.example.com").await.unwrap_err();
    assert!(matches!(err, Error::Fetch(ref m) if m.contains("missing.example.com")));
    assert!(h.browser.store().get("t").is_none());
}

#[tokio::test]
async fn test_fresh_cache_is_reused_without_fetching() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("t", "https://example.com").await.unwrap();
    let after_open = h.fetcher.calls();

    let discovery = h.browser.verbs("t", &DiscoverOptions::default()).await.unwrap();
    assert_eq!(discovery.source, DiscoverySource::Cache);
    assert_eq!(discovery.verbs.len(), 3);
    assert_eq!(h.fetcher.calls(), after_open);

    let refreshed = h
        .browser
        .verbs(
            "t",
            &DiscoverOptions {
                bypass_cache: true,
                ..DiscoverOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(refreshed.source, DiscoverySource::Structural);
    assert_eq!(h.fetcher.calls(), after_open + 1);
}

#[tokio::test]
async fn test_expired_cache_is_rebuilt() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("t", "https://example.com").await.unwrap();

    let policy = VerbCachePolicy::new(h.browser.store(), h.fetcher.as_ref(), h.planner.as_ref());
    let later = t0() + Duration::minutes(5);
    let discovery = policy.discover("t", &DiscoverOptions::default(), later).await.unwrap();
    assert_eq!(discovery.source, DiscoverySource::Structural);
    assert_eq!(discovery.expires, Some(later + Duration::minutes(5)));
    assert_eq!(h.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_missing_tab_is_not_found() {
    let h = harness(site(), FakePlanner::unavailable());
    let err = h.browser.verbs("ghost", &DiscoverOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(ref m) if m.contains("ghost")));
    let err = h.browser.page("ghost").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_unknown_verb_is_not_found() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("t", "https://example.com").await.unwrap();
    let err = h
        .browser
        .execute("t", "pricing", None, &DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref m) if m.contains("pricing") && m.contains("'t'")));
}

#[tokio::test]
async fn test_action_without_planner_is_unavailable() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("t", "https://example.com").await.unwrap();
    let err = h
        .browser
        .execute("t", "share", None, &DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable(ref m) if m.contains("share")));
    assert_eq!(h.planner.plan_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_planned_navigation_is_cached_before_use() {
    let plan = ExecutionPlan::navigate("/pricing", "Open pricing");
    let h = harness(site(), FakePlanner::answering(Vec::new(), Some(plan.clone())));
    h.browser.open("t", "https://example.com").await.unwrap();

    let policy = VerbCachePolicy::new(h.browser.store(), h.fetcher.as_ref(), h.planner.as_ref());
    let discovery = policy.discover("t", &DiscoverOptions::default(), t0()).await.unwrap();
    let tab = h.browser.store().get("t").unwrap();
    let resolver = verbtab_browse::Resolver::new(h.browser.store(), h.fetcher.as_ref(), h.planner.as_ref());

    let outcome = resolver
        .execute("t", &tab, &discovery.verbs, "share", None, t0())
        .await
        .unwrap();
    let Outcome::Navigated(nav) = outcome else {
        panic!("expected navigation");
    };
    assert_eq!(nav.plan_source, PlanSource::Planner);
    assert_eq!(nav.to_url, "https://example.com/pricing");
    assert_eq!(h.planner.plan_calls.load(Ordering::SeqCst), 1);
    // open, then planning fetched the current page, then navigation fetched the target
    assert_eq!(
        h.fetcher.fetched.lock().unwrap().as_slice(),
        &["https://example.com", "https://example.com", "https://example.com/pricing"]
    );
}

#[tokio::test]
async fn test_cached_plan_skips_planner() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("t", "https://example.com").await.unwrap();

    let mut plans = std::collections::BTreeMap::new();
    plans.insert(
        plan_cache_key("share", "https://example.com"),
        ExecutionPlan::navigate("https://example.com/about", "share via about"),
    );
    h.browser
        .store()
        .update("t", verbtab_core::TabPatch::plans(plans))
        .unwrap();

    let outcome = h
        .browser
        .execute("t", "share", None, &DiscoverOptions::default())
        .await
        .unwrap();
    let Outcome::Navigated(nav) = outcome else {
        panic!("expected navigation");
    };
    assert_eq!(nav.plan_source, PlanSource::Cached);
    assert_eq!(nav.tab.current_url, "https://example.com/about");
    assert_eq!(h.planner.plan_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_null_plan_cannot_be_executed() {
    let h = harness(site(), FakePlanner::answering(Vec::new(), None));
    h.browser.open("t", "https://example.com").await.unwrap();
    let err = h
        .browser
        .execute("t", "share", None, &DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoPlan(ref m) if m.contains("share")));
    assert!(h.browser.store().get("t").unwrap().execution_plan_cache.is_none());
}

#[tokio::test]
async fn test_non_navigate_plan_is_unsupported() {
    let plan = ExecutionPlan {
        method: PlanMethod::Action,
        target_url: None,
        command: Some("share()".to_string()),
        description: "run share".to_string(),
    };
    let h = harness(site(), FakePlanner::answering(Vec::new(), Some(plan)));
    h.browser.open("t", "https://example.com").await.unwrap();
    let err = h
        .browser
        .execute("t", "share", None, &DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMethod(ref m) if m.contains("share") && m.contains("action")));
    let tab = h.browser.store().get("t").unwrap();
    assert_eq!(tab.current_url, "https://example.com");
    assert_eq!(tab.execution_plan_cache.map(|c| c.len()), Some(1));
}

#[tokio::test]
async fn test_planner_error_during_execution_propagates() {
    let h = harness(site(), FakePlanner::failing("rate limited"));
    h.browser.open("t", "https://example.com").await.unwrap();
    let err = h
        .browser
        .execute("t", "share", None, &DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(ref m) if m.contains("share") && m.contains("rate limited")));
}

#[tokio::test]
async fn test_container_lists_and_child_navigates() {
    let menu = Verb::new("menu", "Site menu", VerbType::Action).with_subverbs(vec![
        Verb::navigate("about", "About", "/about"),
        Verb::new("search", "Search", VerbType::Form),
    ]);
    let h = harness(site(), FakePlanner::answering(vec![menu], None));
    h.browser.open("t", "https://example.com").await.unwrap();
    h.browser.refine("t", "site menu", None).await.unwrap();

    let listed = h
        .browser
        .execute("t", "menu", None, &DiscoverOptions::default())
        .await
        .unwrap();
    match listed {
        Outcome::Listed { container } => assert_eq!(container.subverbs().len(), 2),
        other => panic!("expected listing, got {:?}", other),
    }

    let err = h
        .browser
        .execute("t", "menu", Some("blog"), &DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref m) if m.contains("blog") && m.contains("menu")));

    let outcome = h
        .browser
        .execute("t", "menu", Some("about"), &DiscoverOptions::default())
        .await
        .unwrap();
    let Outcome::Navigated(nav) = outcome else {
        panic!("expected navigation");
    };
    assert_eq!(nav.verb, "menu.about");
    assert_eq!(nav.to_url, "https://example.com/about");
}

#[tokio::test]
async fn test_unconfigured_planner_degrades_discovery() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("t", "https://example.com").await.unwrap();
    let before = h.browser.store().get("t").unwrap();

    let discovery = h.browser.refine("t", "pricing", None).await.unwrap();
    assert!(discovery.verbs.is_empty());
    assert!(matches!(discovery.source, DiscoverySource::PlannerNotConfigured { .. }));
    assert_eq!(h.planner.extract_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.browser.store().get("t").unwrap(), before);
}

#[tokio::test]
async fn test_failed_planner_degrades_discovery() {
    let h = harness(site(), FakePlanner::failing("bad gateway"));
    h.browser.open("t", "https://example.com").await.unwrap();

    let discovery = h
        .browser
        .verbs(
            "t",
            &DiscoverOptions {
                bypass_cache: true,
                use_planner: true,
                ..DiscoverOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(discovery.verbs.is_empty());
    match discovery.source {
        DiscoverySource::PlannerFailed { reason } => assert!(reason.contains("bad gateway")),
        other => panic!("unexpected source {:?}", other),
    }
}

fn planner_pass() -> DiscoverOptions {
    DiscoverOptions {
        bypass_cache: true,
        use_planner: true,
        ..DiscoverOptions::default()
    }
}

#[tokio::test]
async fn test_execute_reports_unconfigured_planner_instead_of_missing_verb() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("t", "https://example.com").await.unwrap();
    let before = h.browser.store().get("t").unwrap();

    let err = h.browser.execute("t", "about", None, &planner_pass()).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(ref m) if m.contains("about") && m.contains("no planner provider")));
    assert_eq!(h.browser.store().get("t").unwrap(), before);
}

#[tokio::test]
async fn test_execute_reports_failed_planner_discovery() {
    let h = harness(site(), FakePlanner::failing("bad gateway"));
    h.browser.open("t", "https://example.com").await.unwrap();

    let err = h.browser.execute("t", "about", None, &planner_pass()).await.unwrap_err();
    assert!(matches!(err, Error::Provider(ref m) if m.contains("about") && m.contains("bad gateway")));
    assert_eq!(h.browser.store().get("t").unwrap().current_url, "https://example.com");
}

#[tokio::test]
async fn test_planner_subverbs_are_sanitized_before_storing() {
    let mut deep = Verb::new("leaf", "", VerbType::Action);
    for i in (1..=9).rev() {
        deep = Verb::new(&format!("l{}", i), "", VerbType::Action).with_subverbs(vec![deep]);
    }
    let menu = Verb::new("menu", "Menu", VerbType::Action).with_subverbs(vec![
        Verb::navigate("x", "first", "/about"),
        Verb::navigate("x", "second", "/pricing"),
        Verb::new("Bad Name!", "", VerbType::Action),
        deep,
    ]);
    let h = harness(site(), FakePlanner::answering(vec![menu], None));
    h.browser.open("t", "https://example.com").await.unwrap();
    h.browser.refine("t", "menu", None).await.unwrap();

    let cache = h.browser.store().get("t").unwrap().verb_cache.unwrap();
    let menu = cache.get("menu").unwrap();
    let names: Vec<_> = menu.subverbs().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["x", "l1"]);
    assert_eq!(menu.find_subverb("x").unwrap().description, "first");
    assert_eq!(menu.depth(), verbtab_core::types::MAX_VERB_DEPTH);
}

#[tokio::test]
async fn test_execute_without_cache_uses_structural_discovery() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser
        .store()
        .set("t", &verbtab_core::Tab::new("https://example.com", t0()))
        .unwrap();

    let outcome = h
        .browser
        .execute("t", "about", None, &DiscoverOptions::default())
        .await
        .unwrap();
    let Outcome::Navigated(nav) = outcome else {
        panic!("expected navigation");
    };
    assert_eq!(nav.plan_source, PlanSource::Deterministic);
    assert_eq!(nav.to_url, "https://example.com/about");
    assert_eq!(h.planner.extract_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.planner.plan_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.fetcher.fetched.lock().unwrap().as_slice(),
        &["https://example.com", "https://example.com/about"]
    );

    let stored = h.browser.store().get("t").unwrap();
    assert_eq!(stored.current_url, "https://example.com/about");
    assert!(stored.verb_cache.is_none());
    assert!(stored.verb_cache_expires.is_none());
    assert!(stored.execution_plan_cache.is_none());
}

#[tokio::test]
async fn test_scoped_refine_replaces_only_container() {
    let children = vec![
        Verb::navigate("pricing", "Pricing", "https://example.com/pricing"),
        Verb::navigate("about", "About", "https://example.com/about"),
    ];
    let h = harness(site(), FakePlanner::answering(children, None));
    h.browser.open("t", "https://example.com").await.unwrap();

    let discovery = h.browser.refine("t", "footer links", Some("footer")).await.unwrap();
    assert_eq!(discovery.scope.as_deref(), Some("footer"));
    assert_eq!(h.planner.guidance.lock().unwrap().as_slice(), &[Some("footer links".to_string())]);

    let tab = h.browser.store().get("t").unwrap();
    let cache = tab.verb_cache.unwrap();
    assert_eq!(cache.names(), vec!["about", "blog-posts", "share", "footer"]);
    let footer = cache.get("footer").unwrap();
    assert_eq!(footer.subverbs().len(), 2);
    assert_eq!(cache.get("about").unwrap().target(), Some("https://example.com/about"));

    // A second scoped pass replaces the children in place.
    let again = h.browser.refine("t", "footer links", Some("footer")).await.unwrap();
    assert_eq!(again.verbs.len(), 4);
}

#[tokio::test]
async fn test_scope_must_be_a_verb_name() {
    let h = harness(site(), FakePlanner::answering(Vec::new(), None));
    h.browser.open("t", "https://example.com").await.unwrap();
    let err = h.browser.refine("t", "x", Some("Not A Name")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_fetch_failure_during_navigation_keeps_tab() {
    let fetcher = site().with(
        "https://example.com/broken",
        r#"<html><body><a href="/nowhere">Dead link</a></body></html>"#,
    );
    let h = harness(fetcher, FakePlanner::unavailable());
    h.browser.open("t", "https://example.com/broken").await.unwrap();

    let err = h
        .browser
        .execute("t", "dead-link", None, &DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Fetch(ref m) if m.contains("/nowhere")));
    assert_eq!(h.browser.store().get("t").unwrap().current_url, "https://example.com/broken");
}

#[tokio::test]
async fn test_tabs_close_and_page() {
    let h = harness(site(), FakePlanner::unavailable());
    h.browser.open("b", "https://example.com").await.unwrap();
    h.browser.open("a", "https://example.com/about").await.unwrap();

    let tabs = h.browser.tabs().unwrap();
    assert_eq!(tabs.keys().collect::<Vec<_>>(), vec!["a", "b"]);

    let page = h.browser.page("a").await.unwrap();
    assert_eq!(page.text, "text of https://example.com/about");

    assert!(h.browser.close("a").unwrap());
    assert!(!h.browser.close("a").unwrap());
    assert!(h.browser.close("../x").is_err());
    assert_eq!(h.browser.tabs().unwrap().len(), 1);
}
