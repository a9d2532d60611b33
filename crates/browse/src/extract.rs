//! Structural verb extraction.
//!
//! Turns page markup into at most [`MAX_VERBS`] verbs without any external
//! help: links become `navigate` verbs, forms become `form` verbs, and
//! standalone controls with an explicit handler become `action` verbs.
//! Malformed markup never fails; whatever html5ever recovers is used.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;
use verbtab_core::types::MAX_VERB_NAME_LEN;
use verbtab_core::{Verb, VerbCache, VerbType};

pub const MAX_VERBS: usize = 20;

const MIN_LINK_TEXT: usize = 3;
const MAX_LINK_TEXT: usize = 100;
const MIN_ACTION_TEXT: usize = 2;

/// Result of a structural pass: the verbs plus the page text it was given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub verbs: Vec<Verb>,
    pub text: String,
}

pub fn extract(html: &str, text: &str, base_url: &str) -> Extraction {
    let document = Html::parse_document(html);

    let mut verbs = link_verbs(&document, base_url);
    verbs.extend(form_verbs(&document, base_url));
    verbs.extend(action_verbs(&document));

    let mut verbs = VerbCache::from_verbs(verbs.into_iter().filter(|v| !v.name.is_empty())).into_verbs();
    verbs.truncate(MAX_VERBS);

    Extraction {
        verbs,
        text: text.to_string(),
    }
}

/// Lower-case, keep `[a-z0-9 -]`, turn whitespace runs into single hyphens,
/// trim hyphens and cap the length. Applying it twice changes nothing.
pub fn sanitize_verb_name(raw: &str) -> String {
    let kept: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .collect();

    let hyphenated = kept.split_whitespace().collect::<Vec<_>>().join("-");

    let mut collapsed = String::with_capacity(hyphenated.len());
    for c in hyphenated.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches('-');
    let capped = &trimmed[..trimmed.len().min(MAX_VERB_NAME_LEN)];
    capped.trim_end_matches('-').to_string()
}

/// Resolve `href` against `base`. Absolute references and references that
/// cannot be resolved come back unchanged.
pub fn resolve_href(base: &str, href: &str) -> String {
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_string(),
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Visible text with whitespace runs collapsed.
fn visible_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn attr<'a>(el: &'a ElementRef, name: &str) -> Option<&'a str> {
    el.value().attr(name).map(str::trim).filter(|v| !v.is_empty())
}

/// `javascript:` and bare `#` references do not lead anywhere.
fn is_navigable(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    !(href.is_empty() || href == "#" || lower.starts_with("javascript:"))
}

fn inside_form(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "form")
}

fn input_type(el: &ElementRef) -> String {
    el.value().attr("type").unwrap_or("").trim().to_ascii_lowercase()
}

fn link_verbs(document: &Html, base_url: &str) -> Vec<Verb> {
    let mut verbs = Vec::new();
    for a in document.select(&selector("a[href]")) {
        let href = a.value().attr("href").unwrap_or("").trim();
        if !is_navigable(href) {
            continue;
        }
        let text = visible_text(&a);
        let len = text.chars().count();
        if !(MIN_LINK_TEXT..=MAX_LINK_TEXT).contains(&len) {
            continue;
        }
        verbs.push(Verb::navigate(&sanitize_verb_name(&text), &text, &resolve_href(base_url, href)));
    }
    verbs
}

fn form_verbs(document: &Html, base_url: &str) -> Vec<Verb> {
    let field_sel = selector("input[name], textarea[name], select[name]");
    let control_sel = selector("button, input");

    let mut verbs = Vec::new();
    for (index, form) in document.select(&selector("form")).enumerate() {
        let params: Vec<String> = form
            .select(&field_sel)
            .filter(|f| !matches!(input_type(f).as_str(), "submit" | "button"))
            .filter_map(|f| f.value().attr("name").map(str::to_string))
            .collect();

        let label = form
            .select(&control_sel)
            .find(|c| match c.value().name() {
                "button" => matches!(input_type(c).as_str(), "" | "submit"),
                _ => input_type(c) == "submit",
            })
            .map(|c| {
                let text = visible_text(&c);
                if text.is_empty() {
                    attr(&c, "value").unwrap_or("").to_string()
                } else {
                    text
                }
            })
            .unwrap_or_default();

        let mut name = sanitize_verb_name(&label);
        if name.is_empty() {
            name = format!("form-{}", index);
        }

        let target = match attr(&form, "action") {
            Some(action) => resolve_href(base_url, action),
            None => base_url.to_string(),
        };

        let description = if label.is_empty() {
            format!("Form {} ({})", index, params.join(", "))
        } else {
            format!("{} ({})", label, params.join(", "))
        };

        verbs.push(
            Verb::new(&name, &description, VerbType::Form)
                .with_params(params)
                .with_target(&target),
        );
    }
    verbs
}

fn action_verbs(document: &Html) -> Vec<Verb> {
    let candidates = selector("button, input, a, [role=button]");

    let mut verbs = Vec::new();
    for el in document.select(&candidates) {
        let tag = el.value().name();
        let clickable = match tag {
            "button" => true,
            "input" => matches!(input_type(&el).as_str(), "button" | "submit"),
            // Anchors with a real href are links, handled above.
            "a" => !el.value().attr("href").map(str::trim).map(is_navigable).unwrap_or(false),
            _ => el.value().attr("role") == Some("button"),
        };
        if !clickable || inside_form(&el) {
            continue;
        }

        let text = if tag == "input" {
            attr(&el, "value").unwrap_or("").to_string()
        } else {
            visible_text(&el)
        };
        if text.chars().count() < MIN_ACTION_TEXT {
            continue;
        }

        let Some(handler) = attr(&el, "onclick").or_else(|| attr(&el, "data-action")) else {
            continue;
        };

        verbs.push(Verb::new(&sanitize_verb_name(&text), &text, VerbType::Action).with_target(handler));
    }
    verbs
}
