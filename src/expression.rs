use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    /// `"Or"` (any case) selects [`Combinator::Or`]; everything else is AND.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(raw) if raw.trim().eq_ignore_ascii_case("or") => Self::Or,
            _ => Self::And,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Contains,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    CastAsBoolean,
}

impl Operator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contain" | "contains" | "iscontains" => Some(Self::Contains),
            "equal" | "equals" | "isequals" | "eq" => Some(Self::Equals),
            "notequal" | "notequals" | "isnotequals" | "ne" => Some(Self::NotEquals),
            "startwith" | "startswith" | "isstartswith" => Some(Self::StartsWith),
            "endwith" | "endswith" | "isendswith" => Some(Self::EndsWith),
            "castasboolean" | "asboolean" | "boolean" | "bool" => Some(Self::CastAsBoolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Replace,
    Set,
}

impl ActionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "replace" | "replaces" => Some(Self::Replace),
            "set" | "sets" => Some(Self::Set),
            _ => None,
        }
    }
}

/// A predicate: tests a value against `value` with `operator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub attribute: Option<String>,
    pub operator: Operator,
    pub value: String,
}

impl Predicate {
    /// Parses `{Operator, Value, Attribute?}`. Returns `None` for anything
    /// that is not a recognized predicate.
    pub fn from_json(raw: &Value) -> Option<Self> {
        let operator = Operator::parse(get_str(raw, "Operator")?)?;
        Some(Self {
            attribute: get_str(raw, "Attribute").map(str::to_owned),
            operator,
            value: get_str(raw, "Value").unwrap_or_default().to_owned(),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.operator == Operator::CastAsBoolean {
            return self.value.trim().eq_ignore_ascii_case("true");
        }

        let value = value.to_lowercase();
        let expected = self.value.to_lowercase();
        match self.operator {
            Operator::Contains => value.contains(&expected),
            Operator::Equals => value == expected,
            Operator::NotEquals => value != expected,
            Operator::StartsWith => value.starts_with(&expected),
            Operator::EndsWith => value.ends_with(&expected),
            Operator::CastAsBoolean => false,
        }
    }
}

/// An action: rewrites `attribute` (or the value under evaluation).
#[derive(Debug, Clone)]
pub struct Action {
    pub attribute: Option<String>,
    pub kind: ActionKind,
    pub value: Option<String>,
    pub replacement: Option<String>,
    /// `value` compiled once for literal `Replaces` patterns. `None` for
    /// `@`-expressions and for patterns that are not valid regexes.
    pub pattern: Option<Regex>,
}

impl Action {
    pub fn from_json(raw: &Value) -> Option<Self> {
        let kind = ActionKind::parse(get_str(raw, "Operator")?)?;
        let value = get_str(raw, "Value").map(str::to_owned);
        let pattern = match (kind, value.as_deref()) {
            (ActionKind::Replace, Some(value)) if !value.is_empty() && !value.starts_with('@') => {
                Regex::new(value).ok()
            }
            _ => None,
        };
        Some(Self {
            attribute: get_str(raw, "Attribute").map(str::to_owned),
            kind,
            value,
            replacement: get_str(raw, "Replacement").map(str::to_owned),
            pattern,
        })
    }

    /// Whether `value` is evaluated per use rather than fixed.
    pub fn is_dynamic(&self) -> bool {
        self.value.as_deref().is_some_and(|value| value.starts_with('@'))
    }
}

/// Whether `value` satisfies `predicates` under `combinator`.
///
/// A missing value never matches. With no predicates the result is false
/// for both combinators.
pub fn being(value: Option<&str>, combinator: Combinator, predicates: &[Predicate]) -> bool {
    let Some(value) = value else {
        return false;
    };

    let mut result = false;
    for predicate in predicates {
        result = predicate.matches(value);
        match combinator {
            Combinator::Or if result => return true,
            Combinator::And if !result => return false,
            _ => {}
        }
    }
    result
}

/// Looks up `key` in a JSON object, falling back to a case-insensitive match.
pub(crate) fn get<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    let object = raw.as_object()?;
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

pub(crate) fn get_str<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    get(raw, key)?.as_str()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn predicate(operator: Operator, value: &str) -> Predicate {
        Predicate {
            attribute: None,
            operator,
            value: value.to_owned(),
        }
    }

    #[test]
    fn operators_compare_ignoring_case() {
        assert!(predicate(Operator::Contains, "AD").matches("sidebar-ad"));
        assert!(predicate(Operator::Equals, "Banner").matches("BANNER"));
        assert!(predicate(Operator::NotEquals, "x").matches("y"));
        assert!(predicate(Operator::StartsWith, "HTTP").matches("http://a"));
        assert!(predicate(Operator::EndsWith, ".GIF").matches("a.gif"));
        assert!(!predicate(Operator::EndsWith, ".gif").matches("a.png"));
    }

    #[test]
    fn cast_as_boolean_reads_predicate_value() {
        assert!(predicate(Operator::CastAsBoolean, "True").matches("anything"));
        assert!(!predicate(Operator::CastAsBoolean, "false").matches("true"));
        assert!(!predicate(Operator::CastAsBoolean, "yes").matches("true"));
    }

    #[test]
    fn being_or_is_true_when_any_matches() {
        let predicates = vec![
            predicate(Operator::Equals, "a"),
            predicate(Operator::Contains, "b"),
        ];
        assert!(being(Some("xbx"), Combinator::Or, &predicates));
        assert!(!being(Some("xyz"), Combinator::Or, &predicates));
    }

    #[test]
    fn being_and_fails_on_first_mismatch() {
        let predicates = vec![
            predicate(Operator::StartsWith, "a"),
            predicate(Operator::EndsWith, "z"),
        ];
        assert!(being(Some("abcz"), Combinator::And, &predicates));
        assert!(!being(Some("abc"), Combinator::And, &predicates));
    }

    #[test]
    fn being_with_no_predicates_is_false() {
        assert!(!being(Some("value"), Combinator::And, &[]));
        assert!(!being(Some("value"), Combinator::Or, &[]));
    }

    #[test]
    fn being_with_missing_value_is_false() {
        let predicates = vec![predicate(Operator::NotEquals, "x")];
        assert!(!being(None, Combinator::Or, &predicates));
    }

    #[test]
    fn operator_synonyms_and_unknown_names() {
        assert_eq!(Operator::parse("IsContains"), Some(Operator::Contains));
        assert_eq!(Operator::parse(" contain "), Some(Operator::Contains));
        assert_eq!(Operator::parse("isNotEquals"), Some(Operator::NotEquals));
        assert_eq!(Operator::parse("matches"), None);
        assert_eq!(ActionKind::parse("Replaces"), Some(ActionKind::Replace));
        assert_eq!(ActionKind::parse("SET"), Some(ActionKind::Set));
        assert_eq!(Combinator::parse(Some("OR")), Combinator::Or);
        assert_eq!(Combinator::parse(None), Combinator::And);
    }

    #[test]
    fn from_json_drops_unrecognized_entries() {
        assert!(Predicate::from_json(&json!({"Operator": "Bogus", "Value": "x"})).is_none());
        assert!(Predicate::from_json(&json!({"Value": "x"})).is_none());
        assert!(Predicate::from_json(&json!("Contains")).is_none());

        let parsed = Predicate::from_json(&json!({"operator": "Contains", "value": "ad"}));
        assert_eq!(parsed, Some(predicate(Operator::Contains, "ad")));

        let action = Action::from_json(&json!({"Operator": "Sets", "Attribute": "alt", "Value": "@content.Title"}));
        assert_eq!(action.map(|a| a.kind), Some(ActionKind::Set));
        assert!(Action::from_json(&json!({"Operator": "Contains"})).is_none());
    }

    #[test]
    fn replace_patterns_compile_once_when_literal() {
        let literal = Action::from_json(&json!({"Operator": "Replaces", "Value": "^http:"}));
        assert!(literal.is_some_and(|a| a.pattern.is_some_and(|p| p.is_match("http://x"))));

        let invalid = Action::from_json(&json!({"Operator": "Replaces", "Value": "(draft"}));
        assert!(invalid.is_some_and(|a| a.pattern.is_none()));

        let dynamic = Action::from_json(&json!({"Operator": "Replaces", "Value": "@current"}));
        assert!(dynamic.is_some_and(|a| a.pattern.is_none() && a.is_dynamic()));

        let set = Action::from_json(&json!({"Operator": "Sets", "Value": "x"}));
        assert!(set.is_some_and(|a| a.pattern.is_none()));
    }
}
