//! Root query execution.
//!
//! A [`QueryExecutor`] runs a [`SelectionTree`] against a [`Store`]. Every
//! call builds a fresh [`RequestContext`], so loader caches never outlive the
//! request that filled them.
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_query::{QueryExecutor, store::MemoryStore};
//! use trellis_schema::{TrellisConfig, User};
//! use uuid::Uuid;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! store.put(User { id: Uuid::nil(), name: "ann".into(), balance: 1.5 });
//!
//! let executor = QueryExecutor::new(store, TrellisConfig::default());
//! let response = executor.execute_str("{ users { name } }").await;
//!
//! assert!(response.is_ok());
//! assert_eq!(response.pointer("/users/0/name").unwrap(), "ann");
//! # });
//! ```

mod response;

pub use response::{FieldError, Path, PathSegment, Response};

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use trellis_schema::{
    Entity, EntityKey, EntityKind, FieldKind, LookupPolicy, SchemaError, SelectionNode,
    SelectionTree, TrellisConfig,
};

use crate::error::QueryError;
use crate::loader::{Primer, RequestLoaderSet};
use crate::mutation::Mutations;
use crate::relations::{FieldSelectionAnalyzer, Related, RelationResolver};
use crate::traits::{BoxFuture, Predicate, Store};

/// Per-request state: the store handle and a fresh loader set.
pub struct RequestContext {
    store: Arc<dyn Store>,
    config: Arc<TrellisConfig>,
    loaders: RequestLoaderSet,
}

impl RequestContext {
    /// Create a context with its own loaders.
    pub fn new(store: Arc<dyn Store>, config: Arc<TrellisConfig>) -> Self {
        let loaders = RequestLoaderSet::new(store.clone(), &config);
        Self {
            store,
            config,
            loaders,
        }
    }

    /// The request's loaders.
    pub fn loaders(&self) -> &RequestLoaderSet {
        &self.loaders
    }

    /// The storage handle.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    /// A relation resolver over this request's loaders.
    pub fn resolver(&self) -> RelationResolver<'_> {
        RelationResolver::new(&self.loaders)
    }

    /// Write operations that keep this request's loaders consistent.
    pub fn mutations(&self) -> Mutations<'_> {
        Mutations::new(self)
    }
}

/// Executes selection trees against a store.
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn Store>,
    config: Arc<TrellisConfig>,
}

impl QueryExecutor {
    /// Create an executor.
    pub fn new(store: Arc<dyn Store>, config: TrellisConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Build a fresh request context.
    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.store.clone(), self.config.clone())
    }

    /// Parse and execute query text.
    pub async fn execute_str(&self, query: &str) -> Response {
        match SelectionTree::parse(query) {
            Ok(tree) => self.execute(&tree).await,
            Err(err) => Response::rejected(&QueryError::from(err)),
        }
    }

    /// Execute a tree in a new request context.
    pub async fn execute(&self, tree: &SelectionTree) -> Response {
        let ctx = self.context();
        self.execute_in(&ctx, tree).await
    }

    /// Execute a tree in a caller-provided context.
    pub async fn execute_in(&self, ctx: &RequestContext, tree: &SelectionTree) -> Response {
        if let Err(err) = tree.check_depth(ctx.config().selection.max_depth) {
            return Response::rejected(&QueryError::from(err));
        }

        let execution = Execution::new(ctx);
        let values = join_all(tree.roots.iter().map(|node| execution.root_field(node))).await;

        let mut data = Map::new();
        for (node, value) in tree.roots.iter().zip(values) {
            data.insert(node.response_key().to_string(), value);
        }
        let errors = execution.errors.into_inner();

        debug!(
            roots = tree.roots.len(),
            batches = ctx.loaders().total_batches(),
            errors = errors.len(),
            "query executed"
        );
        Response {
            data: Value::Object(data),
            errors,
        }
    }
}

/// One pass over a selection tree.
struct Execution<'a> {
    ctx: &'a RequestContext,
    analyzer: FieldSelectionAnalyzer,
    errors: Mutex<Vec<FieldError>>,
}

impl<'a> Execution<'a> {
    fn new(ctx: &'a RequestContext) -> Self {
        Self {
            ctx,
            analyzer: FieldSelectionAnalyzer::new(&ctx.config().selection),
            errors: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, path: &Path, error: &QueryError) {
        debug!(%path, "field failed\n{}", error.display_full());
        self.errors.lock().push(FieldError::new(path.clone(), error));
    }

    async fn root_field(&self, node: &SelectionNode) -> Value {
        let path = Path::root().field(node.response_key());
        match node.name.as_str() {
            "users" => self.list_root(EntityKind::User, node, path).await,
            "posts" => self.list_root(EntityKind::Post, node, path).await,
            "profiles" => self.list_root(EntityKind::Profile, node, path).await,
            "memberTypes" => self.list_root(EntityKind::MemberType, node, path).await,
            "user" => self.lookup_root(EntityKind::User, node, path).await,
            "post" => self.lookup_root(EntityKind::Post, node, path).await,
            "profile" => self.lookup_root(EntityKind::Profile, node, path).await,
            "memberType" => self.lookup_root(EntityKind::MemberType, node, path).await,
            "__typename" => Value::from("Query"),
            other => {
                self.record(&path, &QueryError::from(SchemaError::unknown_field("Query", other)));
                Value::Null
            }
        }
    }

    /// Fetch every row of `kind` in one call, joining the edges the
    /// selection asks for, then seed the loaders from the result.
    async fn list_root(&self, kind: EntityKind, node: &SelectionNode, path: Path) -> Value {
        if !self.require_selection(kind, node, &path) {
            return Value::Null;
        }

        let joins = self.analyzer.analyze(node, kind);
        let rows = match self.ctx.store().find_many(kind, Predicate::All, &joins).await {
            Ok(rows) => rows,
            Err(err) => {
                self.record(&path, &err);
                return Value::Null;
            }
        };
        Primer::new(self.ctx.loaders()).prime_rows(&rows, &joins);

        let items = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| self.object(row.entity, &node.children, path.index(i)));
        Value::Array(join_all(items).await)
    }

    async fn lookup_root(&self, kind: EntityKind, node: &SelectionNode, path: Path) -> Value {
        if !self.require_selection(kind, node, &path) {
            return Value::Null;
        }

        let Some(raw) = node.str_arg("id") else {
            self.record(&path, &QueryError::invalid_argument("id", "a string id is required"));
            return Value::Null;
        };
        let key = match EntityKey::parse(kind, raw) {
            Ok(key) => key,
            Err(message) => {
                self.record(&path, &QueryError::invalid_argument("id", message));
                return Value::Null;
            }
        };

        match self.ctx.store().find_unique(kind, key).await {
            Ok(Some(row)) => {
                self.ctx.loaders().prime_entity(&row.entity);
                self.object(row.entity, &node.children, path).await
            }
            Ok(None) => Value::Null,
            Err(err) => {
                match self.ctx.config().lookup.policy {
                    LookupPolicy::Strict => self.record(&path, &err),
                    LookupPolicy::NullOnError => {
                        warn!(entity = %kind, %key, error = %err, "lookup failed; returning null");
                    }
                }
                Value::Null
            }
        }
    }

    fn require_selection(&self, kind: EntityKind, node: &SelectionNode, path: &Path) -> bool {
        if node.is_leaf() {
            let err = QueryError::invalid_select(kind.name(), node.name.as_str())
                .with_suggestion(format!("Select at least one field of {}", kind));
            self.record(path, &err);
            return false;
        }
        true
    }

    /// Resolve the selected fields of one row. Siblings run concurrently so
    /// their loads land in the same batch.
    fn object<'b>(
        &'b self,
        entity: Entity,
        selection: &'b [SelectionNode],
        path: Path,
    ) -> BoxFuture<'b, Value> {
        Box::pin(async move {
            let values = join_all(
                selection
                    .iter()
                    .map(|node| self.field(&entity, node, path.field(node.response_key()))),
            )
            .await;

            let mut object = Map::new();
            for (node, value) in selection.iter().zip(values) {
                object.insert(node.response_key().to_string(), value);
            }
            Value::Object(object)
        })
    }

    fn field<'b>(
        &'b self,
        entity: &'b Entity,
        node: &'b SelectionNode,
        path: Path,
    ) -> BoxFuture<'b, Value> {
        Box::pin(async move {
            let kind = entity.kind();
            if node.name == "__typename" {
                return Value::from(kind.name());
            }

            match kind.field(&node.name) {
                Some(FieldKind::Scalar) => {
                    if !node.is_leaf() {
                        let error = QueryError::invalid_select(kind.name(), node.name.as_str());
                        self.record(&path, &error);
                        return Value::Null;
                    }
                    entity.scalar(&node.name).unwrap_or(Value::Null)
                }
                Some(FieldKind::Relation(edge)) => {
                    if !self.require_selection(edge.spec().target, node, &path) {
                        return Value::Null;
                    }
                    match self.ctx.resolver().resolve(edge, entity).await {
                        Ok(Related::One(Some(related))) => {
                            self.object(related, &node.children, path).await
                        }
                        Ok(Related::One(None)) => Value::Null,
                        Ok(Related::Many(related)) => {
                            let items = related.into_iter().enumerate().map(|(i, row)| {
                                self.object(row, &node.children, path.index(i))
                            });
                            Value::Array(join_all(items).await)
                        }
                        Err(err) => {
                            self.record(&path, &err);
                            Value::Null
                        }
                    }
                }
                None => {
                    let error = SchemaError::unknown_field(kind.name(), node.name.as_str());
                    self.record(&path, &QueryError::from(error));
                    Value::Null
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use trellis_schema::{MemberType, MemberTypeId, Post, Profile, Subscription, User};
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        ann: User,
        bob: User,
        post: Post,
        profile: Profile,
    }

    fn fixture() -> Fixture {
        let ann = User {
            id: Uuid::from_u128(1),
            name: "ann".into(),
            balance: 10.0,
        };
        let bob = User {
            id: Uuid::from_u128(2),
            name: "bob".into(),
            balance: 20.0,
        };
        let post = Post {
            id: Uuid::from_u128(10),
            title: "first".into(),
            content: "hello".into(),
            author_id: ann.id,
        };
        let profile = Profile {
            id: Uuid::from_u128(20),
            is_male: false,
            year_of_birth: 1991,
            user_id: ann.id,
            member_type_id: MemberTypeId::Business,
        };
        let store = Arc::new(
            MemoryStore::new()
                .with(ann.clone())
                .with(bob.clone())
                .with(post.clone())
                .with(profile.clone())
                .with(MemberType {
                    id: MemberTypeId::Business,
                    discount: 7.5,
                    posts_limit_per_month: 100,
                })
                .with(Subscription {
                    subscriber_id: bob.id,
                    author_id: ann.id,
                }),
        );
        Fixture {
            store,
            ann,
            bob,
            post,
            profile,
        }
    }

    fn executor(store: &Arc<MemoryStore>, config: TrellisConfig) -> QueryExecutor {
        QueryExecutor::new(store.clone(), config)
    }

    #[tokio::test]
    async fn test_scalar_and_nested_fields() {
        let f = fixture();
        let response = executor(&f.store, TrellisConfig::default())
            .execute_str(&format!(
                r#"{{ user(id: "{}") {{ name posts {{ title }} profile {{ yearOfBirth memberType {{ id discount }} }} }} }}"#,
                f.ann.id
            ))
            .await;

        assert_eq!(response.errors, vec![]);
        assert_eq!(
            response.data,
            json!({
                "user": {
                    "name": "ann",
                    "posts": [{ "title": "first" }],
                    "profile": {
                        "yearOfBirth": 1991,
                        "memberType": { "id": "business", "discount": 7.5 }
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_aliases_and_typename() {
        let f = fixture();
        let response = executor(&f.store, TrellisConfig::default())
            .execute_str(&format!(
                r#"{{ author: post(id: "{}") {{ __typename heading: title }} }}"#,
                f.post.id
            ))
            .await;

        assert_eq!(
            response.data,
            json!({ "author": { "__typename": "Post", "heading": "first" } })
        );
    }

    #[tokio::test]
    async fn test_unknown_field_is_field_error() {
        let f = fixture();
        let response = executor(&f.store, TrellisConfig::default())
            .execute_str("{ users { id email } }")
            .await;

        assert_eq!(response.errors.len(), 2);
        assert!(response.errors.iter().all(|e| e.code == ErrorCode::InvalidSelect.code()));
        assert_eq!(response.pointer("/users/0/email"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_invalid_id_is_argument_error() {
        let f = fixture();
        let response = executor(&f.store, TrellisConfig::default())
            .execute_str(r#"{ user(id: "not-a-uuid") { id } }"#)
            .await;

        assert_eq!(response.data, json!({ "user": null }));
        assert_eq!(response.errors[0].code, ErrorCode::InvalidArgument.code());
        assert_eq!(response.errors[0].path.to_string(), "user");
    }

    #[tokio::test]
    async fn test_missing_lookup_is_null_without_error() {
        let f = fixture();
        let response = executor(&f.store, TrellisConfig::default())
            .execute_str(&format!(r#"{{ profile(id: "{}") {{ id }} }}"#, Uuid::from_u128(99)))
            .await;

        assert!(response.is_ok());
        assert_eq!(response.data, json!({ "profile": null }));
    }

    #[tokio::test]
    async fn test_lookup_failure_policy() {
        let f = fixture();
        f.store.fail_reads(EntityKind::Profile, QueryError::connection("refused"));
        let query = format!(r#"{{ profile(id: "{}") {{ id }} }}"#, f.profile.id);

        let strict = executor(&f.store, TrellisConfig::default()).execute_str(&query).await;
        assert_eq!(strict.data, json!({ "profile": null }));
        assert_eq!(strict.errors[0].code, ErrorCode::ConnectionFailed.code());

        let mut config = TrellisConfig::default();
        config.lookup.policy = LookupPolicy::NullOnError;
        let lenient = executor(&f.store, config).execute_str(&query).await;
        assert_eq!(lenient.data, json!({ "profile": null }));
        assert!(lenient.is_ok());
    }

    #[tokio::test]
    async fn test_batch_failure_nulls_only_affected_fields() {
        let f = fixture();
        f.store.fail_reads(EntityKind::Post, QueryError::connection("refused"));

        let response = executor(&f.store, TrellisConfig::default())
            .execute_str(&format!(
                r#"{{ user(id: "{}") {{ name subscribedToUser {{ name }} }} post(id: "{}") {{ id }} }}"#,
                f.ann.id, f.post.id
            ))
            .await;

        assert_eq!(
            response.data,
            json!({
                "user": { "name": "ann", "subscribedToUser": [{ "name": "bob" }] },
                "post": null
            })
        );
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].path.to_string(), "post");
    }

    #[tokio::test]
    async fn test_member_type_lookup_by_enum() {
        let f = fixture();
        let response = executor(&f.store, TrellisConfig::default())
            .execute_str("{ memberType(id: business) { postsLimitPerMonth } }")
            .await;

        assert_eq!(response.data, json!({ "memberType": { "postsLimitPerMonth": 100 } }));
    }

    #[tokio::test]
    async fn test_depth_limit_rejects_request() {
        let f = fixture();
        let mut config = TrellisConfig::default();
        config.selection.max_depth = 2;

        let response = executor(&f.store, config)
            .execute_str("{ users { posts { id } } }")
            .await;

        assert_eq!(response.data, Value::Null);
        assert_eq!(response.errors[0].code, ErrorCode::InvalidSelect.code());
    }

    #[tokio::test]
    async fn test_each_execution_gets_fresh_loaders() {
        let f = fixture();
        let executor = executor(&f.store, TrellisConfig::default());
        let query = format!(r#"{{ user(id: "{}") {{ posts {{ id }} }} }}"#, f.bob.id);

        executor.execute_str(&query).await;
        executor.execute_str(&query).await;

        assert_eq!(f.store.find_many_calls(EntityKind::Post).len(), 2);
    }
}
