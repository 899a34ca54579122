//! Dynamic `@`-expressions used by rule actions.
//!
//! A rule value such as `@content.Title` or `@current.ToLower()` is resolved
//! at normalization time against the content being processed, the crawler
//! configuration and the value currently under rewrite.

use anyhow::Context as _;
use serde_json::Value;

use crate::content::Content;
use crate::model::CrawlerInfo;

pub struct ExpressionContext<'a> {
    pub content: &'a Content,
    pub crawler: &'a CrawlerInfo,
    pub current: Option<&'a str>,
}

pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluates `expression` (without the leading `@`).
    fn evaluate(
        &self,
        expression: &str,
        context: &ExpressionContext<'_>,
    ) -> anyhow::Result<Option<String>>;
}

/// Resolves a rule value: literals pass through, `@`-expressions are
/// evaluated and any failure yields `None`.
pub fn resolve(
    evaluator: &dyn ExpressionEvaluator,
    raw: Option<&str>,
    context: &ExpressionContext<'_>,
) -> Option<String> {
    let raw = raw?;
    let Some(expression) = raw.strip_prefix('@') else {
        return Some(raw.to_owned());
    };

    match evaluator.evaluate(expression.trim(), context) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(expression = raw, error = %format!("{err:#}"), "expression evaluation failed");
            None
        }
    }
}

/// Evaluates dotted field paths rooted at `content`, `crawler` or
/// `current`, optionally followed by `ToLower()`, `ToUpper()` or `Trim()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathEvaluator;

impl ExpressionEvaluator for PathEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        context: &ExpressionContext<'_>,
    ) -> anyhow::Result<Option<String>> {
        let mut segments = expression.split('.').map(str::trim).peekable();
        let root = segments
            .next()
            .filter(|root| !root.is_empty())
            .ok_or_else(|| anyhow::anyhow!("empty expression"))?;

        // Text fields are read directly; anything else walks the serialized content.
        let fast_field = segments
            .peek()
            .and_then(|name| context.content.text_field(&normalize_key(name)));
        let mut value = match root.to_ascii_lowercase().as_str() {
            "content" => match fast_field {
                Some(text) => {
                    segments.next();
                    text.as_deref()
                        .map_or(Value::Null, |text| Value::String(text.to_owned()))
                }
                None => serde_json::to_value(context.content).context("serialize content")?,
            },
            "crawler" => serde_json::to_value(context.crawler).context("serialize crawler")?,
            "current" | "value" => context
                .current
                .map_or(Value::Null, |current| Value::String(current.to_owned())),
            other => anyhow::bail!("unknown expression root: {other}"),
        };

        let mut methods = Vec::new();
        for segment in segments {
            if let Some(method) = segment.strip_suffix("()") {
                methods.push(method.to_ascii_lowercase());
                continue;
            }
            if !methods.is_empty() {
                anyhow::bail!("field access after method call: {segment}");
            }
            value = field(&value, segment)
                .ok_or_else(|| anyhow::anyhow!("unknown field: {segment}"))?
                .clone();
        }

        let Some(mut text) = scalar_text(&value)? else {
            return Ok(None);
        };
        for method in methods {
            text = match method.as_str() {
                "tolower" => text.to_lowercase(),
                "toupper" => text.to_uppercase(),
                "trim" => text.trim().to_owned(),
                other => anyhow::bail!("unknown method: {other}()"),
            };
        }
        Ok(Some(text))
    }
}

fn field<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            let wanted = normalize_key(segment);
            map.iter()
                .find(|(key, _)| normalize_key(key) == wanted)
                .map(|(_, v)| v)
        }
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn scalar_text(value: &Value) -> anyhow::Result<Option<String>> {
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| scalar_text(item).ok().flatten())
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => anyhow::bail!("expression resolves to an object"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str, content: &Content, current: Option<&str>) -> Option<String> {
        let crawler = CrawlerInfo {
            title: "My Blog".to_owned(),
            ..CrawlerInfo::default()
        };
        let context = ExpressionContext {
            content,
            crawler: &crawler,
            current,
        };
        resolve(&PathEvaluator, Some(expression), &context)
    }

    #[test]
    fn literals_pass_through() {
        assert_eq!(eval("plain", &Content::default(), None).as_deref(), Some("plain"));
    }

    #[test]
    fn content_and_crawler_fields_resolve() {
        let content = Content {
            title: Some(" Hello ".to_owned()),
            source_url: Some("https://x".to_owned()),
            ..Content::default()
        };
        assert_eq!(eval("@content.Title", &content, None).as_deref(), Some(" Hello "));
        assert_eq!(
            eval("@content.Title.Trim().ToUpper()", &content, None).as_deref(),
            Some("HELLO")
        );
        assert_eq!(eval("@content.SourceURL", &content, None).as_deref(), Some("https://x"));
        assert_eq!(eval("@crawler.Title", &content, None).as_deref(), Some("My Blog"));
        assert_eq!(eval("@current.ToLower()", &content, Some("ABC")).as_deref(), Some("abc"));
    }

    #[test]
    fn non_text_content_fields_resolve_through_serialization() {
        let content = Content {
            details: Some("<p>body</p>".to_owned()),
            other_categories: vec!["a".to_owned(), "b".to_owned()],
            ..Content::default()
        };
        assert_eq!(
            eval("@content.other_categories.1", &content, None).as_deref(),
            Some("b")
        );
        assert_eq!(eval("@content.OtherCategories", &content, None).as_deref(), Some("a,b"));
        assert_eq!(eval("@content.Details", &content, None).as_deref(), Some("<p>body</p>"));
        assert_eq!(eval("@content.Details.Nope", &content, None), None);
    }

    #[test]
    fn null_and_failures_yield_none() {
        let content = Content::default();
        assert_eq!(eval("@content.Title", &content, None), None);
        assert_eq!(eval("@content.Nope", &content, None), None);
        assert_eq!(eval("@nowhere.Title", &content, None), None);
        assert_eq!(eval("@current.Explode()", &content, Some("x")), None);
        assert_eq!(eval("@", &content, None), None);
    }
}
