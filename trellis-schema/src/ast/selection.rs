//! Selection trees: the requested shape of a query.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};

/// A requested field, with its arguments and nested selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionNode {
    /// Field name.
    pub name: SmolStr,
    /// Response key override.
    pub alias: Option<SmolStr>,
    /// Arguments in source order.
    pub arguments: IndexMap<SmolStr, serde_json::Value>,
    /// Nested fields (empty for scalar leaves).
    pub children: Vec<SelectionNode>,
}

impl SelectionNode {
    /// Create a leaf selection for a field.
    pub fn field(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Set the response alias.
    pub fn alias(mut self, alias: impl Into<SmolStr>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an argument.
    pub fn arg(mut self, name: impl Into<SmolStr>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Add a nested selection.
    pub fn select(mut self, child: SelectionNode) -> Self {
        self.children.push(child);
        self
    }

    /// Add several leaf fields at once.
    pub fn fields(mut self, names: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        self.children.extend(names.into_iter().map(Self::field));
        self
    }

    /// The key this field is written under in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.name.as_str())
    }

    /// Get a string argument.
    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(|v| v.as_str())
    }

    /// Check whether a direct child selects the given field.
    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|child| child.name == name)
    }

    /// Check if this is a leaf selection.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Nesting depth, counting this node as 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Self::depth).max().unwrap_or(0)
    }
}

/// The full selection of one query: its root fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionTree {
    /// Root fields in request order.
    pub roots: Vec<SelectionNode>,
}

impl SelectionTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root field.
    pub fn root(mut self, node: SelectionNode) -> Self {
        self.roots.push(node);
        self
    }

    /// Parse a tree from query text.
    pub fn parse(input: &str) -> SchemaResult<Self> {
        crate::parser::parse_selection(input)
    }

    /// Maximum depth across all roots.
    pub fn depth(&self) -> usize {
        self.roots.iter().map(SelectionNode::depth).max().unwrap_or(0)
    }

    /// Reject trees nested deeper than `limit`.
    pub fn check_depth(&self, limit: usize) -> SchemaResult<()> {
        let depth = self.depth();
        if depth > limit {
            return Err(SchemaError::DepthExceeded { depth, limit });
        }
        Ok(())
    }

    /// Check if there are no root fields.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl FromIterator<SelectionNode> for SelectionTree {
    fn from_iter<T: IntoIterator<Item = SelectionNode>>(iter: T) -> Self {
        Self {
            roots: iter.into_iter().collect(),
        }
    }
}
