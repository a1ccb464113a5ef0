//! Query results with per-field errors.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::QueryError;

/// One step of a response path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// An object key (the field's alias if it has one).
    Field(String),
    /// A list position.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Location of a value in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// The response root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend with an object key.
    pub fn field(&self, name: &str) -> Self {
        let mut path = self.clone();
        path.0.push(PathSegment::Field(name.to_string()));
        path
    }

    /// Extend with a list index.
    pub fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.0.push(PathSegment::Index(index));
        path
    }

    /// Segments, root first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// An error attached to one field of the response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Where the `null` it caused sits.
    pub path: Path,
    /// Error code, e.g. `T5006`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl FieldError {
    /// Attach a query error to a path.
    pub fn new(path: Path, error: &QueryError) -> Self {
        Self {
            path,
            code: error.code.code(),
            message: error.message.clone(),
        }
    }
}

/// The result of executing a selection tree: data plus any field errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Resolved data; `null` when the request was rejected outright.
    pub data: Value,
    /// Field errors, in the order they were raised.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl Response {
    /// A response rejected before any field ran.
    pub fn rejected(error: &QueryError) -> Self {
        Self {
            data: Value::Null,
            errors: vec![FieldError::new(Path::root(), error)],
        }
    }

    /// Check if every field resolved without error.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Look up a value by a slash-separated JSON pointer, e.g. `/users/0/id`.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.data.pointer(pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_path_display() {
        let path = Path::root().field("users").index(2).field("posts");
        assert_eq!(path.to_string(), "users.2.posts");
    }

    #[test]
    fn test_response_serialization() {
        let error = QueryError::database("refused");
        let response = Response {
            data: json!({ "user": null }),
            errors: vec![FieldError::new(Path::root().field("user"), &error)],
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "data": { "user": null },
                "errors": [{ "path": ["user"], "code": "T5005", "message": "refused" }]
            })
        );
    }

    #[test]
    fn test_ok_response_omits_errors() {
        let response = Response {
            data: json!({ "users": [] }),
            errors: vec![],
        };
        assert!(response.is_ok());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "data": { "users": [] } })
        );
    }
}
