//! Rule-driven normalization of crawled contents.
//!
//! The rule document is the crawler's `options` JSON:
//!
//! ```json
//! {
//!   "RemoveTags": { "div": { "Operator": "Or", "Attribute": "class",
//!                            "Predicates": [{ "Operator": "Contains", "Value": "ads" }] } },
//!   "RemoveTagAttributes": { "Disabled": false, "Tags": {
//!       "img": { "src": { "Predicates": [], "Actions": [
//!           { "Operator": "Replaces", "Value": "^http:", "Replacement": "https:" } ] } } } },
//!   "RemoveWhitespaces": true,
//!   "NormalizeHeadings": false,
//!   "NormalizeSummary": false,
//!   "Updates": { "Source": { "Predicates": [{ "Operator": "Equals", "Value": "" }],
//!                            "Actions": [{ "Operator": "Sets", "Value": "@crawler.Title" }] } }
//! }
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::content::{Content, non_blank};
use crate::crawler::ContentNormalizer;
use crate::evaluate::{ExpressionContext, ExpressionEvaluator, PathEvaluator, resolve};
use crate::expression::{Action, ActionKind, Combinator, Predicate, being, get, get_str};
use crate::model::CrawlerInfo;
use crate::tags::{
    Attribute, Element, close_dangling_element, first_inner_html, remove_elements,
    rewrite_attributes, strip_tags,
};

const SUMMARY_MAX_CHARS: usize = 250;
const EMPTY_TAGS: &[&str] = &["<a></a>", "<span></span>", "<p></p>", "<div></div>"];

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("WHITESPACE regex"));
static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("BETWEEN_TAGS regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)h([1-4])\b").expect("HEADING regex"));

#[derive(Debug, Clone)]
pub struct TagRule {
    pub combinator: Combinator,
    /// Attribute whose value the predicates are evaluated against.
    pub attribute: String,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Default)]
pub struct ActionRule {
    pub combinator: Combinator,
    pub predicates: Vec<Predicate>,
    pub actions: Vec<Action>,
}

pub struct NormalizingAdapter {
    remove_tags: HashMap<String, TagRule>,
    remove_tag_attributes_disabled: bool,
    remove_tag_attributes: HashMap<String, HashMap<String, ActionRule>>,
    updates: Vec<(String, ActionRule)>,
    remove_whitespaces: bool,
    normalize_headings: bool,
    normalize_summary: bool,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Default for NormalizingAdapter {
    fn default() -> Self {
        Self {
            remove_tags: HashMap::new(),
            remove_tag_attributes_disabled: false,
            remove_tag_attributes: HashMap::new(),
            updates: Vec::new(),
            remove_whitespaces: true,
            normalize_headings: false,
            normalize_summary: false,
            evaluator: Arc::new(PathEvaluator),
        }
    }
}

impl std::fmt::Debug for NormalizingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizingAdapter")
            .field("remove_tags", &self.remove_tags.len())
            .field("remove_tag_attributes", &self.remove_tag_attributes.len())
            .field("updates", &self.updates.len())
            .field("remove_whitespaces", &self.remove_whitespaces)
            .field("normalize_headings", &self.normalize_headings)
            .field("normalize_summary", &self.normalize_summary)
            .finish()
    }
}

impl NormalizingAdapter {
    /// Builds the rule tables from a crawler's `options`. Never fails: an
    /// unparsable document yields the default rules and malformed entries
    /// are skipped.
    pub fn new(options: Option<&str>) -> Self {
        let Some(raw) = options.filter(|raw| !raw.trim().is_empty()) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(err) => {
                tracing::debug!(%err, "crawler options are not valid JSON; using default rules");
                Self::default()
            }
        }
    }

    pub fn for_crawler(crawler: &CrawlerInfo) -> Self {
        Self::new(crawler.options.as_deref())
    }

    pub fn from_value(options: &Value) -> Self {
        let mut adapter = Self::default();
        if !options.is_object() {
            tracing::debug!("crawler options are not a JSON object; using default rules");
            return adapter;
        }

        if let Some(Value::Object(tags)) = get(options, "RemoveTags") {
            for (tag, rule) in tags {
                let predicates = parse_predicates(rule);
                let attribute = get_str(rule, "Attribute")
                    .map(str::to_owned)
                    .or_else(|| predicates.iter().find_map(|p| p.attribute.clone()))
                    .unwrap_or_else(|| "class".to_owned());
                adapter.remove_tags.insert(
                    tag.to_ascii_lowercase(),
                    TagRule {
                        combinator: Combinator::parse(get_str(rule, "Operator")),
                        attribute,
                        predicates,
                    },
                );
            }
        }

        if let Some(section) = get(options, "RemoveTagAttributes") {
            adapter.remove_tag_attributes_disabled =
                get(section, "Disabled").and_then(Value::as_bool).unwrap_or(false);
            if let Some(Value::Object(tags)) = get(section, "Tags") {
                for (tag, attributes) in tags {
                    let Value::Object(attributes) = attributes else {
                        tracing::debug!(tag = %tag, "skipping malformed attribute rules");
                        continue;
                    };
                    let rules = attributes
                        .iter()
                        .map(|(name, rule)| (name.to_ascii_lowercase(), parse_action_rule(rule)))
                        .collect::<HashMap<_, _>>();
                    adapter
                        .remove_tag_attributes
                        .insert(tag.to_ascii_lowercase(), rules);
                }
            }
        }

        if let Some(Value::Object(fields)) = get(options, "Updates") {
            adapter.updates = fields
                .iter()
                .map(|(field, rule)| (field.clone(), parse_action_rule(rule)))
                .collect();
        }

        let flag = |key: &str, default: bool| {
            get(options, key)
                .and_then(Value::as_bool)
                .unwrap_or(default)
        };
        adapter.remove_whitespaces = flag("RemoveWhitespaces", true);
        adapter.normalize_headings = flag("NormalizeHeadings", false);
        adapter.normalize_summary = flag("NormalizeSummary", false);

        adapter
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Cleans the HTML body, derives the summary, applies field updates and
    /// finally stamps identity and categories via [`Content::normalize`].
    pub fn normalize(&self, content: &mut Content, crawler: &CrawlerInfo) {
        if let Some(details) = content.details.as_deref() {
            let mut html = details.to_owned();

            if !self.remove_tags.is_empty() {
                html = remove_elements(&html, |element| self.is_removable(element));
            }

            if !self.remove_tag_attributes_disabled && !self.remove_tag_attributes.is_empty() {
                html = rewrite_attributes(&html, |element| {
                    self.rewritten_attributes(element, &*content, crawler)
                });
            }

            if self.remove_whitespaces {
                html = remove_whitespaces(&html);
            }

            if self.normalize_headings {
                html = demote_headings(&html);
            }

            html = close_dangling_element(html);
            content.details = Some(html);
        }

        if self.normalize_summary || non_blank(content.summary.as_deref()).is_none() {
            content.summary = Some(derive_summary(content));
        }

        self.apply_updates(content, crawler);
        content.normalize(crawler, true);
    }

    fn is_removable(&self, element: &Element) -> bool {
        let Some(rule) = self.remove_tags.get(&element.name) else {
            return false;
        };
        let Some(attribute) = element.attribute(&rule.attribute) else {
            return false;
        };
        being(Some(attribute.value.as_str()), rule.combinator, &rule.predicates)
    }

    fn rewritten_attributes(
        &self,
        element: &Element,
        content: &Content,
        crawler: &CrawlerInfo,
    ) -> Option<Vec<Attribute>> {
        let rules = self.remove_tag_attributes.get(&element.name)?;
        if !element
            .attributes
            .iter()
            .any(|attr| rules.contains_key(&attr.name.to_ascii_lowercase()))
        {
            return None;
        }

        let mut attributes = element.attributes.clone();
        let mut dropped = Vec::new();
        for attr in &element.attributes {
            let Some(rule) = rules.get(&attr.name.to_ascii_lowercase()) else {
                continue;
            };
            let being = being(Some(attr.value.as_str()), rule.combinator, &rule.predicates);

            for action in &rule.actions {
                let target = action.attribute.as_deref().unwrap_or(&attr.name);
                let current = attributes
                    .iter()
                    .find(|a| a.name.eq_ignore_ascii_case(target))
                    .map(|a| a.value.clone());
                let context = ExpressionContext {
                    content,
                    crawler,
                    current: current.as_deref(),
                };
                let Some(value) = self.apply_action(action, current.as_deref(), &context) else {
                    continue;
                };
                match attributes
                    .iter_mut()
                    .find(|a| a.name.eq_ignore_ascii_case(target))
                {
                    Some(existing) => existing.value = value,
                    None => attributes.push(Attribute::new(target.to_ascii_lowercase(), value)),
                }
            }

            if being {
                dropped.push(attr.name.to_ascii_lowercase());
            }
        }

        attributes.retain(|attr| !dropped.contains(&attr.name.to_ascii_lowercase()));
        Some(attributes)
    }

    fn apply_updates(&self, content: &mut Content, crawler: &CrawlerInfo) {
        for (field, rule) in &self.updates {
            if !being(content.field(field), rule.combinator, &rule.predicates) {
                continue;
            }

            for action in &rule.actions {
                let target = action.attribute.as_deref().unwrap_or(field);
                let current = content.field(target).map(str::to_owned);
                let context = ExpressionContext {
                    content,
                    crawler,
                    current: current.as_deref(),
                };
                let Some(value) = self.apply_action(action, current.as_deref(), &context) else {
                    continue;
                };
                if !content.set_field(target, Some(value)) {
                    tracing::debug!(field = target, "update targets an unknown content field");
                }
            }
        }
    }

    /// New value produced by `action`, or `None` when the action is a no-op.
    fn apply_action(
        &self,
        action: &Action,
        current: Option<&str>,
        context: &ExpressionContext<'_>,
    ) -> Option<String> {
        let evaluator = self.evaluator.as_ref();
        match action.kind {
            ActionKind::Set => resolve(evaluator, action.value.as_deref(), context),
            ActionKind::Replace => {
                let current = current?;
                let pattern = resolve(evaluator, action.value.as_deref(), context)?;
                if pattern.is_empty() {
                    return None;
                }
                let replacement = match action.replacement.as_deref() {
                    Some(raw) => resolve(evaluator, Some(raw), context)?,
                    None => String::new(),
                };
                let regex = match &action.pattern {
                    Some(regex) => Some(Cow::Borrowed(regex)),
                    None if action.is_dynamic() => Regex::new(&pattern).ok().map(Cow::Owned),
                    None => None,
                };
                Some(match regex {
                    Some(regex) => regex.replace_all(current, replacement.as_str()).into_owned(),
                    None => current.replace(&pattern, &replacement),
                })
            }
        }
    }
}

#[async_trait]
impl ContentNormalizer for NormalizingAdapter {
    async fn normalize(&self, content: &mut Content, crawler: &CrawlerInfo) -> anyhow::Result<()> {
        NormalizingAdapter::normalize(self, content, crawler);
        Ok(())
    }
}

fn parse_predicates(rule: &Value) -> Vec<Predicate> {
    get(rule, "Predicates")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Predicate::from_json).collect())
        .unwrap_or_default()
}

fn parse_action_rule(rule: &Value) -> ActionRule {
    ActionRule {
        combinator: Combinator::parse(get_str(rule, "Operator")),
        predicates: parse_predicates(rule),
        actions: get(rule, "Actions")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Action::from_json).collect())
            .unwrap_or_default(),
    }
}

fn remove_whitespaces(html: &str) -> String {
    let collapsed = WHITESPACE.replace_all(html, " ");
    let mut html = BETWEEN_TAGS.replace_all(&collapsed, "><").into_owned();
    loop {
        let before = html.len();
        for empty in EMPTY_TAGS {
            html = html.replace(empty, "");
        }
        if html.len() == before {
            break;
        }
    }
    html.trim().to_owned()
}

/// Shifts h1-h4 down one level in a single pass, so nested headings keep
/// their relative order.
fn demote_headings(html: &str) -> String {
    HEADING
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let level = caps[2].parse::<u8>().unwrap_or(1) + 1;
            format!("<{}h{level}", &caps[1])
        })
        .into_owned()
}

fn derive_summary(content: &Content) -> String {
    let details = content.details.as_deref().unwrap_or_default();

    let source = first_inner_html(details, "p")
        .or_else(|| {
            details
                .find("<br")
                .map(|idx| details[..idx].to_owned())
                .filter(|head| !strip_tags(head).is_empty())
        })
        .or_else(|| first_inner_html(details, "div"))
        .or_else(|| non_blank(content.summary.as_deref()).map(str::to_owned))
        .unwrap_or_else(|| details.to_owned());

    let truncated = source.chars().take(SUMMARY_MAX_CHARS).collect::<String>();
    strip_tags(&truncated)
}
