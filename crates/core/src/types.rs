//! Verb, execution plan and tab records shared by every crate in the workspace.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Lifetime of a discovered verb list.
pub const VERB_CACHE_TTL_SECS: i64 = 300;

pub const MAX_VERB_NAME_LEN: usize = 50;

/// Deepest subverb nesting accepted from an untrusted source (root = depth 1).
pub const MAX_VERB_DEPTH: usize = 4;

static TAB_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("tab name pattern is valid")
});

/// Reject tab names outside `^[A-Za-z0-9_-]{1,50}$`.
pub fn validate_tab_name(name: &str) -> Result<()> {
    if TAB_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid tab name '{}': use 1-50 letters, digits, '-' or '_'",
            name
        )))
    }
}

/// True when `name` is a well-formed verb name: `[a-z0-9-]`, 1 to 50 chars.
pub fn is_valid_verb_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_VERB_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbType {
    Navigate,
    Form,
    Action,
}

impl VerbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerbType::Navigate => "navigate",
            VerbType::Form => "form",
            VerbType::Action => "action",
        }
    }
}

impl fmt::Display for VerbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named action derived from a page, optionally grouping child verbs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verb {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub verb_type: VerbType,
    /// Field names in document order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subverbs: Option<Vec<Verb>>,
}

impl Verb {
    pub fn new(name: &str, description: &str, verb_type: VerbType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            verb_type,
            params: None,
            target: None,
            subverbs: None,
        }
    }

    pub fn navigate(name: &str, description: &str, target: &str) -> Self {
        Self::new(name, description, VerbType::Navigate).with_target(target)
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_subverbs(mut self, subverbs: Vec<Verb>) -> Self {
        self.subverbs = Some(subverbs);
        self
    }

    /// A container has at least one subverb and is never executed itself.
    pub fn is_container(&self) -> bool {
        self.subverbs.as_ref().map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn subverbs(&self) -> &[Verb] {
        self.subverbs.as_deref().unwrap_or(&[])
    }

    pub fn find_subverb(&self, name: &str) -> Option<&Verb> {
        self.subverbs().iter().find(|v| v.name == name)
    }

    /// Non-empty target, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Nesting depth of this verb tree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.subverbs().iter().map(Verb::depth).max().unwrap_or(0)
    }
}

/// Verbs keyed by name, in discovery order.
///
/// Persisted as a JSON object (`name -> verb`). Names are unique: inserting an
/// existing name replaces that entry in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VerbCache {
    verbs: Vec<Verb>,
}

impl VerbCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list; the first verb with a given name wins.
    pub fn from_verbs<I: IntoIterator<Item = Verb>>(verbs: I) -> Self {
        let mut cache = Self::new();
        for verb in verbs {
            if cache.get(&verb.name).is_none() {
                cache.verbs.push(verb);
            }
        }
        cache
    }

    pub fn get(&self, name: &str) -> Option<&Verb> {
        self.verbs.iter().find(|v| v.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Verb> {
        self.verbs.iter_mut().find(|v| v.name == name)
    }

    pub fn insert(&mut self, verb: Verb) {
        match self.get_mut(&verb.name) {
            Some(slot) => *slot = verb,
            None => self.verbs.push(verb),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.verbs.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn into_verbs(self) -> Vec<Verb> {
        self.verbs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Verb> {
        self.verbs.iter()
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }
}

impl Serialize for VerbCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.verbs.len()))?;
        for verb in &self.verbs {
            map.serialize_entry(&verb.name, verb)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VerbCache {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct CacheVisitor;

        impl<'de> Visitor<'de> for CacheVisitor {
            type Value = VerbCache;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of verb name to verb")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<VerbCache, A::Error> {
                let mut cache = VerbCache::new();
                while let Some((key, mut verb)) = access.next_entry::<String, Verb>()? {
                    // The map key is the verb's identity.
                    verb.name = key;
                    if cache.get(&verb.name).is_none() {
                        cache.verbs.push(verb);
                    }
                }
                Ok(cache)
            }
        }

        deserializer.deserialize_map(CacheVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMethod {
    Navigate,
    Form,
    Action,
}

impl PlanMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanMethod::Navigate => "navigate",
            PlanMethod::Form => "form",
            PlanMethod::Action => "action",
        }
    }
}

impl fmt::Display for PlanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to carry out a verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub method: PlanMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl ExecutionPlan {
    pub fn navigate(target_url: &str, description: &str) -> Self {
        Self {
            method: PlanMethod::Navigate,
            target_url: Some(target_url.to_string()),
            command: None,
            description: description.to_string(),
        }
    }
}

/// Key of a cached execution plan: the verb identity on a given page.
pub fn plan_cache_key(verb_identity: &str, current_url: &str) -> String {
    format!("{}|{}", verb_identity, current_url)
}

/// A persistent, named browsing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub current_url: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb_cache: Option<VerbCache>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb_cache_expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_plan_cache: Option<BTreeMap<String, ExecutionPlan>>,
}

impl Tab {
    pub fn new(current_url: &str, now: DateTime<Utc>) -> Self {
        Self {
            current_url: current_url.to_string(),
            last_updated: now,
            verb_cache: None,
            verb_cache_expires: None,
            execution_plan_cache: None,
        }
    }

    /// Cached verbs, only while `now` is before the expiry stamp.
    pub fn fresh_verbs(&self, now: DateTime<Utc>) -> Option<&VerbCache> {
        match (&self.verb_cache, self.verb_cache_expires) {
            (Some(cache), Some(expires)) if now < expires => Some(cache),
            _ => None,
        }
    }

    pub fn cached_plan(&self, key: &str) -> Option<&ExecutionPlan> {
        self.execution_plan_cache.as_ref().and_then(|c| c.get(key))
    }

    /// Shallow merge: every field present in the patch replaces the stored one.
    pub fn apply(&mut self, patch: TabPatch) {
        if let Some(url) = patch.current_url {
            self.current_url = url;
        }
        if let Some(ts) = patch.last_updated {
            self.last_updated = ts;
        }
        if let Some(cache) = patch.verb_cache {
            self.verb_cache = cache;
        }
        if let Some(expires) = patch.verb_cache_expires {
            self.verb_cache_expires = expires;
        }
        if let Some(plans) = patch.execution_plan_cache {
            self.execution_plan_cache = plans;
        }
    }
}

/// Partial tab update. For cache fields, `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabPatch {
    pub current_url: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub verb_cache: Option<Option<VerbCache>>,
    pub verb_cache_expires: Option<Option<DateTime<Utc>>>,
    pub execution_plan_cache: Option<Option<BTreeMap<String, ExecutionPlan>>>,
}

impl TabPatch {
    /// Move the tab to a new page and drop every cache in the same write.
    pub fn navigated(url: &str, now: DateTime<Utc>) -> Self {
        Self {
            current_url: Some(url.to_string()),
            last_updated: Some(now),
            verb_cache: Some(None),
            verb_cache_expires: Some(None),
            execution_plan_cache: Some(None),
        }
    }

    /// Store a freshly discovered verb list with a new expiry.
    pub fn discovered(cache: VerbCache, now: DateTime<Utc>) -> Self {
        Self {
            verb_cache: Some(Some(cache)),
            verb_cache_expires: Some(Some(now + Duration::seconds(VERB_CACHE_TTL_SECS))),
            ..Self::default()
        }
    }

    pub fn plans(plans: BTreeMap<String, ExecutionPlan>) -> Self {
        Self {
            execution_plan_cache: Some(Some(plans)),
            ..Self::default()
        }
    }
}
