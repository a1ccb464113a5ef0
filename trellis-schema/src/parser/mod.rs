//! Parser for selection documents.

mod grammar;

use pest::Parser;
use pest::iterators::Pair;
use smol_str::SmolStr;

use crate::ast::{SelectionNode, SelectionTree};
use crate::error::{SchemaError, SchemaResult};

pub use grammar::{Rule, SelectionParser};

/// Parse a selection document into a [`SelectionTree`].
///
/// Accepts an anonymous `{ ... }` selection or a `query Name { ... }` operation.
pub fn parse_selection(input: &str) -> SchemaResult<SelectionTree> {
    let mut pairs = SelectionParser::parse(Rule::document, input).map_err(|e| {
        let (offset, len) = match e.location {
            pest::error::InputLocation::Pos(pos) => (pos, 0),
            pest::error::InputLocation::Span((start, end)) => (start, end - start),
        };
        SchemaError::syntax(input, offset, len, e.variant.message().to_string())
    })?;

    let document = pairs
        .next()
        .ok_or_else(|| SchemaError::syntax(input, 0, input.len(), "empty document"))?;

    let mut tree = SelectionTree::new();
    for pair in document.into_inner() {
        if pair.as_rule() != Rule::operation {
            continue;
        }
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::selection_set {
                tree.roots = parse_selection_set(inner, input)?;
            }
        }
    }

    tracing::trace!(roots = tree.roots.len(), depth = tree.depth(), "parsed selection");
    Ok(tree)
}

fn parse_selection_set(pair: Pair<'_, Rule>, input: &str) -> SchemaResult<Vec<SelectionNode>> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::field)
        .map(|p| parse_field(p, input))
        .collect()
}

fn parse_field(pair: Pair<'_, Rule>, input: &str) -> SchemaResult<SelectionNode> {
    let mut alias: Option<SmolStr> = None;
    let mut node: Option<SelectionNode> = None;
    let mut arguments = Vec::new();
    let mut children = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::alias => {
                alias = Some(SmolStr::new(inner.as_str().trim()));
            }
            Rule::name => {
                node = Some(SelectionNode::field(inner.as_str()));
            }
            Rule::arguments => {
                for argument in inner.into_inner() {
                    arguments.push(parse_argument(argument, input)?);
                }
            }
            Rule::selection_set => {
                children = parse_selection_set(inner, input)?;
            }
            _ => {}
        }
    }

    let mut node =
        node.ok_or_else(|| SchemaError::syntax(input, 0, input.len(), "field without a name"))?;
    node.alias = alias;
    node.arguments.extend(arguments);
    node.children = children;
    Ok(node)
}

fn parse_argument(
    pair: Pair<'_, Rule>,
    input: &str,
) -> SchemaResult<(SmolStr, serde_json::Value)> {
    let span = pair.as_span();
    let mut inner = pair.into_inner();

    let name = inner
        .next()
        .map(|p| SmolStr::new(p.as_str()))
        .ok_or_else(|| missing(input, &span, "argument without a name"))?;
    let value = inner
        .next()
        .ok_or_else(|| missing(input, &span, "argument without a value"))?;

    Ok((name, parse_value(value, input)?))
}

fn missing(input: &str, span: &pest::Span<'_>, message: &str) -> SchemaError {
    SchemaError::syntax(input, span.start(), span.end() - span.start(), message)
}

fn parse_value(pair: Pair<'_, Rule>, input: &str) -> SchemaResult<serde_json::Value> {
    use serde_json::Value;

    let span = pair.as_span();
    let invalid = |message: String| {
        SchemaError::syntax(input, span.start(), span.end() - span.start(), message)
    };

    match pair.as_rule() {
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            unescape(raw).map(Value::String).map_err(invalid)
        }
        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| invalid(format!("invalid integer: {}", e))),
        Rule::float => {
            let parsed = pair
                .as_str()
                .parse::<f64>()
                .map_err(|e| invalid(format!("invalid float: {}", e)))?;
            serde_json::Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| invalid("float is not finite".to_string()))
        }
        Rule::boolean => Ok(Value::Bool(pair.as_str() == "true")),
        Rule::null => Ok(Value::Null),
        Rule::enum_value => Ok(Value::String(pair.as_str().to_string())),
        other => Err(invalid(format!("unexpected {:?}", other))),
    }
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| format!("invalid unicode escape `\\u{}`", hex))?;
                let ch = char::from_u32(code)
                    .ok_or_else(|| format!("invalid unicode scalar `\\u{}`", hex))?;
                out.push(ch);
            }
            other => return Err(format!("invalid escape `\\{}`", other.unwrap_or(' '))),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_anonymous_selection() {
        let tree = parse_selection("{ users { id userSubscribedTo { id } } }").unwrap();

        let expected = SelectionTree::new().root(
            SelectionNode::field("users")
                .fields(["id"])
                .select(SelectionNode::field("userSubscribedTo").fields(["id"])),
        );
        assert_eq!(tree, expected);
    }

    #[test]
    fn test_parse_named_query_with_arguments_and_alias() {
        let tree = parse_selection(
            r#"query Lookup {
                me: user(id: "0b7f6c34-8f0e-4c39-9c52-2a3f0b0d9a11") { name }
                memberType(id: business) { discount }
            }"#,
        )
        .unwrap();

        assert_eq!(tree.roots.len(), 2);
        let me = &tree.roots[0];
        assert_eq!(me.name, "user");
        assert_eq!(me.response_key(), "me");
        assert_eq!(me.str_arg("id"), Some("0b7f6c34-8f0e-4c39-9c52-2a3f0b0d9a11"));

        let member = &tree.roots[1];
        assert_eq!(member.str_arg("id"), Some("business"));
    }

    #[test]
    fn test_parse_scalar_argument_values() {
        let tree = parse_selection(r#"{ f(a: 1, b: -2.5, c: true, d: null, e: "x\ny") }"#).unwrap();
        let args = &tree.roots[0].arguments;

        assert_eq!(args["a"], serde_json::json!(1));
        assert_eq!(args["b"], serde_json::json!(-2.5));
        assert_eq!(args["c"], serde_json::json!(true));
        assert_eq!(args["d"], serde_json::Value::Null);
        assert_eq!(args["e"], serde_json::json!("x\ny"));
    }

    #[test]
    fn test_syntax_error_reports_span() {
        let err = parse_selection("{ users { id }").unwrap_err();
        match err {
            SchemaError::SyntaxError { span, .. } => assert_eq!(span.offset(), 14),
            other => panic!("Expected SyntaxError, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_selection_set_is_rejected() {
        assert!(parse_selection("{ }").is_err());
        assert!(parse_selection("{ users { } }").is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"a\"b"#).unwrap(), "a\"b");
        assert_eq!(unescape(r"\u0041").unwrap(), "A");
        assert!(unescape(r"\q").is_err());
    }
}
