//! Static inspection of a selection before the root fetch.

use trellis_schema::{EdgeSet, EntityKind, SelectionNode, config::SelectionConfig};

/// Decides which edges a root fetch should join.
///
/// Only the first level under the root field is inspected: an edge is joined
/// when the client selected it directly on the root entity and storage can
/// join it. Deeper edges are left to the loaders.
#[derive(Debug, Clone, Copy)]
pub struct FieldSelectionAnalyzer {
    eager_join: bool,
}

impl Default for FieldSelectionAnalyzer {
    fn default() -> Self {
        Self { eager_join: true }
    }
}

impl FieldSelectionAnalyzer {
    /// Create an analyzer from configuration.
    pub fn new(config: &SelectionConfig) -> Self {
        Self {
            eager_join: config.eager_join,
        }
    }

    /// Edges to join for a root field selecting entities of `root`.
    pub fn analyze(&self, root_field: &SelectionNode, root: EntityKind) -> EdgeSet {
        if !self.eager_join {
            return EdgeSet::new();
        }
        root.edges()
            .filter(|edge| edge.spec().joinable && root_field.has_child(edge.field()))
            .collect()
    }
}
