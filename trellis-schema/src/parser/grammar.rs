//! Pest grammar parser for selection documents.

use pest_derive::Parser;

/// The selection document parser.
#[derive(Parser)]
#[grammar = "parser/selection.pest"]
pub struct SelectionParser;

#[cfg(test)]
mod tests {
    use super::*;
    use pest::Parser;

    #[test]
    fn test_parse_name() {
        assert!(SelectionParser::parse(Rule::name, "userSubscribedTo").is_ok());
        assert!(SelectionParser::parse(Rule::name, "_private").is_ok());
        assert!(SelectionParser::parse(Rule::name, "9lives").is_err());
    }

    #[test]
    fn test_parse_field_with_arguments() {
        let result = SelectionParser::parse(
            Rule::field,
            r#"me: user(id: "7d1c", limit: 3) { id }"#,
        );
        assert!(result.is_ok(), "Failed to parse field: {:?}", result.err());
    }

    #[test]
    fn test_parse_values() {
        assert!(SelectionParser::parse(Rule::string, r#""a \"quoted\" word""#).is_ok());
        assert!(SelectionParser::parse(Rule::float, "-1.5e3").is_ok());
        assert!(SelectionParser::parse(Rule::int, "-42").is_ok());
        assert!(SelectionParser::parse(Rule::boolean, "true").is_ok());
    }

    #[test]
    fn test_parse_document() {
        let input = r#"
            query Everything {
                # all users with their edges
                users { id, userSubscribedTo { id } }
            }
        "#;
        let result = SelectionParser::parse(Rule::document, input);
        assert!(result.is_ok(), "Failed to parse document: {:?}", result.err());
    }
}
