use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use verbtab_core::types::MAX_VERB_DEPTH;
use verbtab_core::{ChatMessage, Config, Error, ExecutionPlan, Result, Verb, VerbCache, VerbType};
use verbtab_providers::{create_planner_provider, Provider};

use crate::extract::{sanitize_verb_name, MAX_VERBS};

const EXTRACT_SYSTEM_PROMPT: &str = "\
You turn a web page into a short list of verbs: things a user can do on the page.
Reply with a JSON array only. Each element is an object:
  {\"name\": \"lowercase-hyphenated\", \"description\": \"...\", \"type\": \"navigate\" | \"form\" | \"action\",
   \"target\": \"url or handler (optional)\", \"params\": [\"field\", ...] (forms only),
   \"subverbs\": [ ...same shape... ] (optional, for grouped verbs)}
Use absolute URLs for navigate targets when you can. At most 20 verbs per level.";

const PLAN_SYSTEM_PROMPT: &str = "\
You decide how to carry out one verb on a web page.
Reply with a single JSON object and nothing else:
  {\"method\": \"navigate\" | \"form\" | \"action\", \"target_url\": \"...\", \"command\": \"...\", \"description\": \"...\"}
For navigation, target_url is the destination (absolute or relative to the page).
Reply with null if the page gives no way to perform the verb.";

/// Reasoning collaborator used for guided extraction and for planning verbs
/// that have no deterministic route.
#[async_trait]
pub trait Planner: Send + Sync {
    fn is_available(&self) -> bool;

    async fn extract(
        &self,
        text: &str,
        url: &str,
        guidance: Option<&str>,
        html: Option<&str>,
    ) -> Result<Vec<Verb>>;

    /// `Ok(None)` means the planner answered but found no way to run the verb.
    async fn plan(&self, verb: &Verb, html: &str, current_url: &str) -> Result<Option<ExecutionPlan>>;
}

/// Planner backed by a chat model. Without a provider every call fails with
/// [`Error::Unavailable`].
pub struct LlmPlanner {
    provider: Option<Box<dyn Provider>>,
    unavailable_reason: Option<String>,
    max_page_chars: usize,
}

impl LlmPlanner {
    pub fn new(provider: Box<dyn Provider>, max_page_chars: usize) -> Self {
        Self {
            provider: Some(provider),
            unavailable_reason: None,
            max_page_chars,
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            provider: None,
            unavailable_reason: Some(reason.to_string()),
            max_page_chars: 0,
        }
    }

    /// Build from the `planner` config section. A missing key or disabled
    /// planner yields an unavailable planner rather than an error.
    pub fn from_config(config: &Config) -> Self {
        match create_planner_provider(config) {
            Ok(provider) => {
                debug!(model = %provider.model(), "Planner provider ready");
                Self::new(provider, config.planner.max_page_chars)
            }
            Err(e) => {
                debug!(error = %e, "Planner not configured");
                Self::unavailable(&e.to_string())
            }
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.model())
    }

    fn provider(&self) -> Result<&dyn Provider> {
        self.provider.as_deref().ok_or_else(|| {
            Error::Unavailable(
                self.unavailable_reason
                    .clone()
                    .unwrap_or_else(|| "no planner provider configured".to_string()),
            )
        })
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    async fn extract(
        &self,
        text: &str,
        url: &str,
        guidance: Option<&str>,
        html: Option<&str>,
    ) -> Result<Vec<Verb>> {
        let provider = self.provider()?;

        let mut prompt = format!("Page URL: {}\n\n", url);
        if let Some(g) = guidance.filter(|g| !g.trim().is_empty()) {
            prompt.push_str(&format!("Focus on: {}\n\n", g.trim()));
        }
        prompt.push_str("Page text:\n");
        prompt.push_str(truncate_at_boundary(text, self.max_page_chars));
        if let Some(markup) = html {
            prompt.push_str("\n\nPage markup:\n");
            prompt.push_str(truncate_at_boundary(markup, self.max_page_chars));
        }

        info!(url = %url, guided = guidance.is_some(), "Asking planner for verbs");
        let response = provider
            .chat(&[ChatMessage::system(EXTRACT_SYSTEM_PROMPT), ChatMessage::user(&prompt)])
            .await?;
        let verbs = parse_verbs(response.text())?;
        debug!(url = %url, count = verbs.len(), "Planner verbs parsed");
        Ok(verbs)
    }

    async fn plan(&self, verb: &Verb, html: &str, current_url: &str) -> Result<Option<ExecutionPlan>> {
        let provider = self.provider()?;

        let verb_json = serde_json::to_string(verb)?;
        let prompt = format!(
            "Page URL: {}\n\nVerb:\n{}\n\nPage markup:\n{}",
            current_url,
            verb_json,
            truncate_at_boundary(html, self.max_page_chars)
        );

        info!(verb = %verb.name, url = %current_url, "Asking planner for an execution plan");
        let response = provider
            .chat(&[ChatMessage::system(PLAN_SYSTEM_PROMPT), ChatMessage::user(&prompt)])
            .await?;
        parse_plan(response.text(), &verb.name)
    }
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary.
pub fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fence(reply: &str) -> &str {
    let Some(start) = reply.find("```") else {
        return reply.trim();
    };
    let after_marker = start + 3;
    // Skip optional language tag on the fence line
    let content_start = reply[after_marker..]
        .find('\n')
        .map(|i| after_marker + i + 1)
        .unwrap_or(after_marker);
    match reply[content_start..].find("```") {
        Some(end) => reply[content_start..content_start + end].trim(),
        None => reply[content_start..].trim(),
    }
}

/// First JSON value in a model reply; prose before or after it is ignored.
fn first_json_value(reply: &str) -> Option<Value> {
    let body = strip_code_fence(reply);
    if body.starts_with("null") {
        return Some(Value::Null);
    }
    let start = body.find(|c: char| c == '[' || c == '{')?;
    serde_json::Deserializer::from_str(&body[start..])
        .into_iter::<Value>()
        .next()
        .and_then(|v| v.ok())
}

pub fn parse_verbs(reply: &str) -> Result<Vec<Verb>> {
    let value = first_json_value(reply)
        .ok_or_else(|| Error::Provider("planner reply contained no JSON verb list".to_string()))?;

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("verbs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::Provider(
                    "planner reply is an object without a 'verbs' array".to_string(),
                ))
            }
        },
        Value::Null => Vec::new(),
        other => {
            return Err(Error::Provider(format!(
                "planner reply is not a verb list: {}",
                other
            )))
        }
    };

    Ok(verbs_from_values(&entries, 1))
}

fn verbs_from_values(entries: &[Value], depth: usize) -> Vec<Verb> {
    let verbs = entries.iter().filter_map(|entry| verb_from_value(entry, depth));
    let mut verbs = VerbCache::from_verbs(verbs).into_verbs();
    verbs.truncate(MAX_VERBS);
    verbs
}

fn verb_from_value(entry: &Value, depth: usize) -> Option<Verb> {
    let raw_name = entry.get("name").and_then(Value::as_str).unwrap_or("");
    let name = sanitize_verb_name(raw_name);
    if name.is_empty() {
        warn!(entry = %entry, "Skipping planner verb without a usable name");
        return None;
    }

    let target = entry
        .get("target")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let verb_type = match entry.get("type").and_then(Value::as_str) {
        Some(t) => match serde_json::from_value::<VerbType>(Value::String(t.to_ascii_lowercase())) {
            Ok(vt) => vt,
            Err(_) => {
                warn!(verb = %name, verb_type = %t, "Skipping planner verb with unknown type");
                return None;
            }
        },
        None if target.is_some() => VerbType::Navigate,
        None => VerbType::Action,
    };

    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let mut verb = Verb::new(&name, &description, verb_type);
    if let Some(t) = target {
        verb = verb.with_target(t);
    }
    if let Some(params) = entry.get("params").and_then(Value::as_array) {
        let params: Vec<String> = params.iter().filter_map(Value::as_str).map(str::to_string).collect();
        verb = verb.with_params(params);
    }
    if let Some(children) = entry.get("subverbs").and_then(Value::as_array) {
        if depth >= MAX_VERB_DEPTH {
            warn!(verb = %name, depth, "Dropping planner subverbs nested too deeply");
        } else {
            let subverbs = verbs_from_values(children, depth + 1);
            if !subverbs.is_empty() {
                verb = verb.with_subverbs(subverbs);
            }
        }
    }
    Some(verb)
}

pub fn parse_plan(reply: &str, verb_name: &str) -> Result<Option<ExecutionPlan>> {
    let value = first_json_value(reply).ok_or_else(|| {
        Error::Provider(format!("planner reply for verb '{}' contained no JSON plan", verb_name))
    })?;
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| Error::Provider(format!("unusable plan for verb '{}': {}", verb_name, e)))
}
