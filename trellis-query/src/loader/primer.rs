//! Seeding loaders from eagerly joined rows.

use tracing::debug;
use trellis_schema::{EdgeSet, Multiplicity};

use super::set::RequestLoaderSet;
use crate::traits::Row;

/// What a priming pass stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimeReport {
    /// Entity rows newly seeded.
    pub entities: usize,
    /// Edge entries newly seeded, empty lists included.
    pub edges: usize,
}

/// Seeds a request's loaders from a root fetch that joined some edges.
///
/// For every joined edge each parent row gets an edge entry, even when
/// nothing matched, so resolving that edge later needs no fetch at all.
pub struct Primer<'a> {
    loaders: &'a RequestLoaderSet,
}

impl<'a> Primer<'a> {
    /// Create a primer over a loader set.
    pub fn new(loaders: &'a RequestLoaderSet) -> Self {
        Self { loaders }
    }

    /// Seed entity and edge loaders from rows fetched with `joined`.
    pub fn prime_rows(&self, rows: &[Row], joined: &EdgeSet) -> PrimeReport {
        let mut report = PrimeReport::default();

        for row in rows {
            if self.loaders.prime_entity(&row.entity) {
                report.entities += 1;
            }

            let Some(parent) = row.entity.key().and_then(|key| key.as_id()) else {
                continue;
            };

            for edge in joined {
                let spec = edge.spec();
                if spec.source != row.entity.kind() {
                    continue;
                }
                let related = row.joined(edge).unwrap_or_default();
                let ids: Vec<_> = related
                    .iter()
                    .filter_map(|entity| entity.key_field(spec.related_key))
                    .filter_map(|key| key.as_id())
                    .collect();

                // Target rows joined in directly are worth keeping too.
                if spec.link == spec.target {
                    for entity in related {
                        if self.loaders.prime_entity(entity) {
                            report.entities += 1;
                        }
                    }
                }

                let stored = match spec.multiplicity {
                    Multiplicity::Many => self
                        .loaders
                        .many_edge(edge)
                        .is_some_and(|loader| loader.prime(parent, ids)),
                    Multiplicity::One => match (self.loaders.one_edge(edge), ids.first()) {
                        (Some(loader), Some(id)) => loader.prime(parent, *id),
                        (Some(loader), None) => loader.prime_absent(parent),
                        (None, _) => false,
                    },
                };
                if stored {
                    report.edges += 1;
                }
            }
        }

        debug!(
            rows = rows.len(),
            edges = joined.len(),
            primed_entities = report.entities,
            primed_edges = report.edges,
            "primed loaders from joined rows"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::traits::{Predicate, Store};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use trellis_schema::{Edge, EntityKind, Subscription, TrellisConfig, User};
    use uuid::Uuid;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            balance: 0.0,
        }
    }

    #[tokio::test]
    async fn test_primed_edges_skip_fetches() {
        let ann = user("ann");
        let bob = user("bob");
        let store = Arc::new(
            MemoryStore::new()
                .with(ann.clone())
                .with(bob.clone())
                .with(Subscription {
                    subscriber_id: ann.id,
                    author_id: bob.id,
                }),
        );
        let loaders = RequestLoaderSet::new(store.clone(), &TrellisConfig::default());

        let joins: EdgeSet = [Edge::UserSubscribedTo, Edge::UserProfile].into_iter().collect();
        let rows = store
            .find_many(EntityKind::User, Predicate::All, &joins)
            .await
            .unwrap();
        let report = Primer::new(&loaders).prime_rows(&rows, &joins);

        assert_eq!(report, PrimeReport { entities: 2, edges: 4 });

        store.reset_calls();
        let followed = loaders.user_subscribed_to().load(ann.id).await.unwrap();
        let none = loaders.user_subscribed_to().load(bob.id).await.unwrap();
        let profile = loaders.user_profile().load(ann.id).await.unwrap();

        assert_eq!(followed, Some(vec![bob.id]));
        assert_eq!(none, Some(vec![]));
        assert_eq!(profile, None);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_priming_does_not_override_existing_entries() {
        let ann = user("ann");
        let store = Arc::new(MemoryStore::new().with(ann.clone()));
        let loaders = RequestLoaderSet::new(store.clone(), &TrellisConfig::default());

        loaders.user_posts().prime(ann.id, vec![Uuid::nil()]);

        let joins: EdgeSet = [Edge::UserPosts].into_iter().collect();
        let rows = store
            .find_many(EntityKind::User, Predicate::All, &joins)
            .await
            .unwrap();
        let report = Primer::new(&loaders).prime_rows(&rows, &joins);

        assert_eq!(report.edges, 0);
        assert_eq!(
            loaders.user_posts().load(ann.id).await.unwrap(),
            Some(vec![Uuid::nil()])
        );
    }
}
