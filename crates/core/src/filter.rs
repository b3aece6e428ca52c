//! Scoping requests and the filter expressions built from them.
//!
//! A query can be narrowed by document (`source`) and by indexing corpus
//! (`corpus_id`). Both constraints end up in one boolean expression in the
//! vector table's filter syntax, e.g.
//!
//! ```text
//! ((metadata['source'] = 'a.pdf' OR metadata['source'] = 'b.pdf')) AND (metadata['corpus_id'] = 'c1')
//! ```
//!
//! Multi-value membership is always written as a disjunction of equality
//! clauses rather than `IN (...)`, and an empty request yields no filter at
//! all rather than an always-false predicate.

use crate::error::ConfigError;
use serde_json::Value;

pub const SOURCE_FIELD: &str = "source";
pub const CORPUS_FIELD: &str = "corpus_id";

/// What part of the indexed documents a query may see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeRequest {
    /// No restriction.
    #[default]
    All,
    /// A pre-formed filter expression, passed through verbatim.
    Raw(String),
    /// Restrict to chunks whose `source` is one of these filenames.
    Sources(Vec<String>),
}

impl ScopeRequest {
    pub fn raw(expression: impl Into<String>) -> Self {
        Self::Raw(expression.into())
    }

    pub fn source(name: impl Into<String>) -> Self {
        Self::Sources(vec![name.into()])
    }

    pub fn sources<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Sources(names.into_iter().map(Into::into).collect())
    }

    /// Accepts `null`, a raw expression string, a bare list of filenames, or
    /// an object `{"source": "a.pdf"}` / `{"source": ["a.pdf", "b.pdf"]}`.
    /// Any other object key is rejected so that a request never looks scoped
    /// while silently matching everything.
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::All),
            Value::String(expression) => Ok(Self::Raw(expression.clone())),
            Value::Array(items) => Ok(Self::Sources(scalar_list(items)?)),
            Value::Object(map) => {
                if let Some(unknown) = map.keys().find(|key| key.as_str() != SOURCE_FIELD) {
                    return Err(ConfigError::UnrecognizedScope(unknown.clone()));
                }
                match map.get(SOURCE_FIELD) {
                    None => Ok(Self::All),
                    Some(Value::Array(items)) => Ok(Self::Sources(scalar_list(items)?)),
                    Some(single) => Ok(Self::Sources(vec![scalar_string(single)?])),
                }
            }
            other => Err(ConfigError::InvalidScope(format!(
                "expected null, string, list or object, got {other}"
            ))),
        }
    }

    pub fn is_all(&self) -> bool {
        match self {
            ScopeRequest::All => true,
            ScopeRequest::Raw(expression) => expression.trim().is_empty(),
            ScopeRequest::Sources(names) => names.is_empty(),
        }
    }
}

fn scalar_list(items: &[Value]) -> Result<Vec<String>, ConfigError> {
    items.iter().map(scalar_string).collect()
}

fn scalar_string(value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(ConfigError::InvalidScope(format!(
            "source values must be scalars, got {other}"
        ))),
    }
}

/// Quotes a value as a single-quoted literal, doubling embedded quotes.
pub fn quote_literal(value: impl ToString) -> String {
    format!("'{}'", value.to_string().replace('\'', "''"))
}

/// Reference to a metadata field in filter syntax.
pub fn field_ref(field: &str) -> String {
    format!("metadata['{field}']")
}

pub fn equals_clause(field: &str, value: &str) -> String {
    format!("{} = {}", field_ref(field), quote_literal(value))
}

/// `(f = v1 OR f = v2 ...)`; a single value gives a bare equality clause.
/// Duplicate values are dropped, keeping first occurrence order.
pub fn any_of_clause(field: &str, values: &[String]) -> Option<String> {
    let mut distinct: Vec<&str> = Vec::with_capacity(values.len());
    for value in values {
        if !distinct.contains(&value.as_str()) {
            distinct.push(value);
        }
    }

    match distinct.as_slice() {
        [] => None,
        [single] => Some(equals_clause(field, single)),
        many => Some(format!(
            "({})",
            many.iter()
                .map(|value| equals_clause(field, value))
                .collect::<Vec<_>>()
                .join(" OR ")
        )),
    }
}

/// Joins the non-empty clauses with AND, parenthesizing each operand.
pub fn and_all<I>(clauses: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let clauses: Vec<String> = clauses
        .into_iter()
        .filter(|clause| !clause.trim().is_empty())
        .collect();

    match clauses.len() {
        0 => None,
        1 => clauses.into_iter().next(),
        _ => Some(format!("({})", clauses.join(") AND ("))),
    }
}

/// Filter for the scoping request alone.
pub fn scope_filter(scope: &ScopeRequest) -> Option<String> {
    match scope {
        ScopeRequest::All => None,
        ScopeRequest::Raw(expression) => {
            let trimmed = expression.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        ScopeRequest::Sources(names) => any_of_clause(SOURCE_FIELD, names),
    }
}

/// ANDs a corpus clause onto `base`; an absent or blank corpus leaves `base`
/// untouched.
pub fn with_corpus(base: Option<String>, corpus_id: Option<&str>) -> Option<String> {
    match corpus_id.map(str::trim).filter(|id| !id.is_empty()) {
        None => base,
        Some(corpus) => and_all(base.into_iter().chain([equals_clause(CORPUS_FIELD, corpus)])),
    }
}

/// Combined filter for a scoping request and an optional corpus.
pub fn build_filter(scope: &ScopeRequest, corpus_id: Option<&str>) -> Option<String> {
    with_corpus(scope_filter(scope), corpus_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(value: Value) -> ScopeRequest {
        ScopeRequest::from_json(&value).expect("scope should parse")
    }

    #[test]
    fn single_source_is_one_equality_clause() {
        let filter = build_filter(&scope(json!({"source": "alpha.pdf"})), None);
        assert_eq!(filter.as_deref(), Some("metadata['source'] = 'alpha.pdf'"));
    }

    #[test]
    fn multiple_sources_are_a_parenthesized_disjunction() {
        let filter = build_filter(&scope(json!({"source": ["a.pdf", "b.pdf"]})), None);
        assert_eq!(
            filter.as_deref(),
            Some("(metadata['source'] = 'a.pdf' OR metadata['source'] = 'b.pdf')")
        );
    }

    #[test]
    fn bare_list_scopes_by_source() {
        let filter = build_filter(&scope(json!(["a.pdf", "b.pdf", "c.pdf"])), None);
        let filter = filter.expect("filter expected");
        assert_eq!(filter.matches(" OR ").count(), 2);
        assert!(filter.starts_with('(') && filter.ends_with(')'));
    }

    #[test]
    fn quotes_in_filenames_are_doubled() {
        let filter = build_filter(&ScopeRequest::source("o'brien's notes.pdf"), None);
        assert_eq!(
            filter.as_deref(),
            Some("metadata['source'] = 'o''brien''s notes.pdf'")
        );
    }

    #[test]
    fn empty_requests_produce_no_filter() {
        assert_eq!(build_filter(&scope(Value::Null), None), None);
        assert_eq!(build_filter(&scope(json!({})), None), None);
        assert_eq!(build_filter(&scope(json!([])), None), None);
        assert_eq!(build_filter(&scope(json!({"source": []})), None), None);
        assert_eq!(build_filter(&scope(json!("   ")), None), None);
        assert_eq!(build_filter(&ScopeRequest::All, None), None);
    }

    #[test]
    fn raw_expressions_pass_through_trimmed() {
        let filter = build_filter(&scope(json!("  metadata['page'] > 3 ")), None);
        assert_eq!(filter.as_deref(), Some("metadata['page'] > 3"));
    }

    #[test]
    fn corpus_is_anded_with_source_clause() {
        let filter = build_filter(&ScopeRequest::source("a.pdf"), Some("c1"));
        assert_eq!(
            filter.as_deref(),
            Some("(metadata['source'] = 'a.pdf') AND (metadata['corpus_id'] = 'c1')")
        );

        let filter = build_filter(&ScopeRequest::sources(["a.pdf", "b.pdf"]), Some("c1"));
        assert_eq!(
            filter.as_deref(),
            Some(
                "((metadata['source'] = 'a.pdf' OR metadata['source'] = 'b.pdf')) \
                 AND (metadata['corpus_id'] = 'c1')"
            )
        );
    }

    #[test]
    fn raw_disjunction_is_grouped_before_the_corpus_clause() {
        let filter = build_filter(
            &ScopeRequest::raw("source = 'a.pdf' OR source = 'b.pdf'"),
            Some("c1"),
        );
        assert_eq!(
            filter.as_deref(),
            Some("(source = 'a.pdf' OR source = 'b.pdf') AND (metadata['corpus_id'] = 'c1')")
        );
    }

    #[test]
    fn corpus_alone_is_a_single_clause() {
        assert_eq!(
            build_filter(&ScopeRequest::All, Some("c1")).as_deref(),
            Some("metadata['corpus_id'] = 'c1'")
        );
    }

    #[test]
    fn missing_corpus_leaves_source_filter_unchanged() {
        let request = ScopeRequest::sources(["a.pdf", "b.pdf"]);
        assert_eq!(build_filter(&request, None), scope_filter(&request));
        assert_eq!(build_filter(&request, Some("  ")), scope_filter(&request));
    }

    #[test]
    fn non_string_values_are_stringified() {
        let filter = build_filter(&scope(json!({"source": 42})), None);
        assert_eq!(filter.as_deref(), Some("metadata['source'] = '42'"));
    }

    #[test]
    fn duplicate_sources_collapse() {
        let filter = build_filter(&ScopeRequest::sources(["a.pdf", "a.pdf"]), None);
        assert_eq!(filter.as_deref(), Some("metadata['source'] = 'a.pdf'"));
    }

    #[test]
    fn unknown_scope_keys_are_rejected() {
        let result = ScopeRequest::from_json(&json!({"source": "a.pdf", "page": 2}));
        assert!(matches!(result, Err(ConfigError::UnrecognizedScope(key)) if key == "page"));

        let result = ScopeRequest::from_json(&json!({"metadata": {"source": "a.pdf"}}));
        assert!(matches!(result, Err(ConfigError::UnrecognizedScope(_))));
    }

    #[test]
    fn nested_source_values_are_rejected() {
        let result = ScopeRequest::from_json(&json!({"source": [{"name": "a.pdf"}]}));
        assert!(matches!(result, Err(ConfigError::InvalidScope(_))));
        assert!(ScopeRequest::from_json(&json!(7)).is_err());
    }
}
