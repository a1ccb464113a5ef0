//! Single-record writes.
//!
//! Each write checks that the entities it references exist before touching
//! storage, so a dangling reference surfaces as
//! [`ErrorCode::PreconditionFailed`](crate::error::ErrorCode::PreconditionFailed)
//! rather than as a storage error. After a write, the loader entries it could
//! have made stale are dropped so later reads in the same request see it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use trellis_schema::{
    Entity, EntityKey, EntityKind, Id, MemberType, MemberTypeId, Post, Profile, Subscription, User,
};
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};
use crate::executor::RequestContext;
use crate::loader::{LoaderName, Record, RequestLoaderSet};

/// Input for [`Mutations::create_user`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    /// Display name.
    pub name: String,
    /// Starting balance.
    pub balance: f64,
}

/// Input for [`Mutations::create_post`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Author; must exist.
    pub author_id: Id,
}

/// Input for [`Mutations::create_profile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileInput {
    /// Gender flag.
    pub is_male: bool,
    /// Year of birth.
    pub year_of_birth: i32,
    /// Owner; must exist and have no profile yet.
    pub user_id: Id,
    /// Membership; must exist.
    pub member_type_id: MemberTypeId,
}

/// Partial update for a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUserInput {
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New balance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

/// Partial update for a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePostInput {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Partial update for a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProfileInput {
    /// New gender flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_male: Option<bool>,
    /// New year of birth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_of_birth: Option<i32>,
    /// New membership; must exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_type_id: Option<MemberTypeId>,
}

/// Write operations bound to one request.
pub struct Mutations<'a> {
    ctx: &'a RequestContext,
}

impl<'a> Mutations<'a> {
    /// Bind to a request context.
    pub fn new(ctx: &'a RequestContext) -> Self {
        Self { ctx }
    }

    fn loaders(&self) -> &RequestLoaderSet {
        self.ctx.loaders()
    }

    /// Create a user.
    pub async fn create_user(&self, input: CreateUserInput) -> QueryResult<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: input.name,
            balance: input.balance,
        };
        let user = self.insert(user).await?;
        self.loaders().users().prime(user.id, user.clone());
        debug!(user = %user.id, "user created");
        Ok(user)
    }

    /// Create a post for an existing author.
    pub async fn create_post(&self, input: CreatePostInput) -> QueryResult<Post> {
        self.require::<User>(input.author_id).await?;

        let post = Post {
            id: Uuid::new_v4(),
            title: input.title,
            content: input.content,
            author_id: input.author_id,
        };
        let post = self.insert(post).await?;
        self.loaders().user_posts().clear(&post.author_id);
        debug!(post = %post.id, author = %post.author_id, "post created");
        Ok(post)
    }

    /// Create the profile of an existing user.
    pub async fn create_profile(&self, input: CreateProfileInput) -> QueryResult<Profile> {
        self.require::<User>(input.user_id).await?;
        self.require::<MemberType>(input.member_type_id).await?;

        let profile = Profile {
            id: Uuid::new_v4(),
            is_male: input.is_male,
            year_of_birth: input.year_of_birth,
            user_id: input.user_id,
            member_type_id: input.member_type_id,
        };
        let profile = self.insert(profile).await?;
        self.loaders().user_profile().clear(&profile.user_id);
        debug!(profile = %profile.id, user = %profile.user_id, "profile created");
        Ok(profile)
    }

    /// Update a user.
    pub async fn change_user(&self, id: Id, input: ChangeUserInput) -> QueryResult<User> {
        let user: User = self.patch(id, &input).await?;
        let users = self.loaders().users();
        users.clear(&id);
        users.prime(id, user.clone());
        Ok(user)
    }

    /// Update a post.
    pub async fn change_post(&self, id: Id, input: ChangePostInput) -> QueryResult<Post> {
        let post: Post = self.patch(id, &input).await?;
        let posts = self.loaders().posts();
        posts.clear(&id);
        posts.prime(id, post.clone());
        Ok(post)
    }

    /// Update a profile.
    pub async fn change_profile(&self, id: Id, input: ChangeProfileInput) -> QueryResult<Profile> {
        if let Some(member_type) = input.member_type_id {
            self.require::<MemberType>(member_type).await?;
        }
        let profile: Profile = self.patch(id, &input).await?;
        let profiles = self.loaders().profiles();
        profiles.clear(&id);
        profiles.prime(id, profile.clone());
        Ok(profile)
    }

    /// Delete a user along with their posts, profile and subscriptions.
    pub async fn delete_user(&self, id: Id) -> QueryResult<bool> {
        let deleted = self.ctx.store().delete(EntityKind::User, id.into()).await?;
        if deleted {
            self.loaders().clear_all();
        }
        Ok(deleted)
    }

    /// Delete a post.
    pub async fn delete_post(&self, id: Id) -> QueryResult<bool> {
        let deleted = self.ctx.store().delete(EntityKind::Post, id.into()).await?;
        if deleted {
            self.loaders().posts().clear(&id);
            self.loaders().get(LoaderName::UserPosts).clear_all();
        }
        Ok(deleted)
    }

    /// Delete a profile.
    pub async fn delete_profile(&self, id: Id) -> QueryResult<bool> {
        let deleted = self.ctx.store().delete(EntityKind::Profile, id.into()).await?;
        if deleted {
            self.loaders().profiles().clear(&id);
            self.loaders().get(LoaderName::UserProfile).clear_all();
        }
        Ok(deleted)
    }

    /// Make `user_id` a subscriber of `author_id`. Returns the subscriber.
    pub async fn subscribe_to(&self, user_id: Id, author_id: Id) -> QueryResult<User> {
        let subscriber = self.require::<User>(user_id).await?;
        self.require::<User>(author_id).await?;

        let link = Subscription {
            subscriber_id: user_id,
            author_id,
        };
        self.ctx.store().insert(Entity::Subscription(link)).await?;
        self.forget_subscription(link);
        debug!(subscriber = %user_id, author = %author_id, "subscribed");
        Ok(subscriber)
    }

    /// Remove a subscription. `Ok(false)` when there was none.
    pub async fn unsubscribe_from(&self, user_id: Id, author_id: Id) -> QueryResult<bool> {
        let link = Subscription {
            subscriber_id: user_id,
            author_id,
        };
        let deleted = self.ctx.store().delete_subscription(link).await?;
        if deleted {
            self.forget_subscription(link);
        }
        Ok(deleted)
    }

    fn forget_subscription(&self, link: Subscription) {
        self.loaders().user_subscribed_to().clear(&link.subscriber_id);
        self.loaders().subscribed_to_user().clear(&link.author_id);
    }

    /// Fetch a referenced row, failing the precondition if it is absent.
    async fn require<T: Record>(&self, key: T::Key) -> QueryResult<T> {
        let key: EntityKey = key.into();
        let row = self.ctx.store().find_unique(T::KIND, key).await?;
        row.and_then(|row| T::from_entity(row.entity))
            .ok_or_else(|| QueryError::precondition(T::KIND.name(), key))
    }

    async fn insert<T: Record + Into<Entity>>(&self, record: T) -> QueryResult<T> {
        let stored = self.ctx.store().insert(record.into()).await?;
        T::from_entity(stored).ok_or_else(|| {
            QueryError::internal(format!("store returned a different kind for {}", T::KIND))
        })
    }

    async fn patch<T: Record<Key = Id>>(&self, id: Id, input: &impl Serialize) -> QueryResult<T> {
        let patch = match serde_json::to_value(input) {
            Ok(Value::Object(columns)) => columns,
            Ok(_) => Map::new(),
            Err(e) => return Err(QueryError::invalid_argument("dto", e.to_string())),
        };
        let updated = self.ctx.store().update(T::KIND, id.into(), patch).await?;
        updated
            .and_then(T::from_entity)
            .ok_or_else(|| {
                QueryError::not_found(T::KIND.name()).with_context(format!("update {}", id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::executor::QueryExecutor;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use trellis_schema::TrellisConfig;

    fn context(store: &Arc<MemoryStore>) -> RequestContext {
        QueryExecutor::new(store.clone(), TrellisConfig::default()).context()
    }

    fn basic() -> MemberType {
        MemberType {
            id: MemberTypeId::Basic,
            discount: 0.0,
            posts_limit_per_month: 10,
        }
    }

    #[tokio::test]
    async fn test_create_post_requires_author() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);

        let err = ctx
            .mutations()
            .create_post(CreatePostInput {
                title: "t".into(),
                content: "c".into(),
                author_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::PreconditionFailed);
        assert!(!err.is_transient());
        assert!(store.is_empty(EntityKind::Post));
    }

    #[tokio::test]
    async fn test_create_profile_requires_member_type() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let user = ctx
            .mutations()
            .create_user(CreateUserInput {
                name: "ann".into(),
                balance: 0.0,
            })
            .await
            .unwrap();

        let input = CreateProfileInput {
            is_male: true,
            year_of_birth: 1990,
            user_id: user.id,
            member_type_id: MemberTypeId::Basic,
        };
        let err = ctx.mutations().create_profile(input.clone()).await.unwrap_err();
        assert!(err.is_precondition());

        store.put(basic());
        let profile = ctx.mutations().create_profile(input).await.unwrap();
        assert_eq!(profile.user_id, user.id);
    }

    #[tokio::test]
    async fn test_created_post_is_visible_in_same_request() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let user = ctx
            .mutations()
            .create_user(CreateUserInput {
                name: "ann".into(),
                balance: 0.0,
            })
            .await
            .unwrap();

        assert_eq!(ctx.resolver().posts_of(user.id).await.unwrap(), vec![]);

        let post = ctx
            .mutations()
            .create_post(CreatePostInput {
                title: "t".into(),
                content: "c".into(),
                author_id: user.id,
            })
            .await
            .unwrap();

        assert_eq!(ctx.resolver().posts_of(user.id).await.unwrap(), vec![post]);
    }

    #[tokio::test]
    async fn test_change_user_patches_and_refreshes() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let user = ctx
            .mutations()
            .create_user(CreateUserInput {
                name: "ann".into(),
                balance: 1.0,
            })
            .await
            .unwrap();

        let changed = ctx
            .mutations()
            .change_user(
                user.id,
                ChangeUserInput {
                    name: Some("anna".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(changed.name, "anna");
        assert_eq!(changed.balance, 1.0);
        assert_eq!(ctx.loaders().users().load(user.id).await.unwrap(), Some(changed));
    }

    #[tokio::test]
    async fn test_change_missing_record_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);

        let err = ctx
            .mutations()
            .change_post(Uuid::new_v4(), ChangePostInput::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let m = ctx.mutations();
        let ann = m
            .create_user(CreateUserInput {
                name: "ann".into(),
                balance: 0.0,
            })
            .await
            .unwrap();
        let bob = m
            .create_user(CreateUserInput {
                name: "bob".into(),
                balance: 0.0,
            })
            .await
            .unwrap();

        assert!(ctx.resolver().subscribed_to(ann.id).await.unwrap().is_empty());

        let subscriber = m.subscribe_to(ann.id, bob.id).await.unwrap();
        assert_eq!(subscriber, ann);
        assert_eq!(ctx.resolver().subscribed_to(ann.id).await.unwrap(), vec![bob.clone()]);
        assert_eq!(ctx.resolver().subscribers_of(bob.id).await.unwrap(), vec![ann.clone()]);

        assert!(m.unsubscribe_from(ann.id, bob.id).await.unwrap());
        assert!(!m.unsubscribe_from(ann.id, bob.id).await.unwrap());
        assert!(ctx.resolver().subscribed_to(ann.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_requires_both_users() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let ann = ctx
            .mutations()
            .create_user(CreateUserInput {
                name: "ann".into(),
                balance: 0.0,
            })
            .await
            .unwrap();

        let err = ctx.mutations().subscribe_to(ann.id, Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(store.is_empty(EntityKind::Subscription));
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let m = ctx.mutations();

        assert!(!m.delete_user(Uuid::new_v4()).await.unwrap());
        assert!(!m.delete_post(Uuid::new_v4()).await.unwrap());
        assert!(!m.delete_profile(Uuid::new_v4()).await.unwrap());
    }

    #[test]
    fn test_inputs_deserialize_camel_case() {
        let input: CreateProfileInput = serde_json::from_value(serde_json::json!({
            "isMale": false,
            "yearOfBirth": 2001,
            "userId": "00000000-0000-0000-0000-000000000001",
            "memberTypeId": "business"
        }))
        .unwrap();
        assert_eq!(input.member_type_id, MemberTypeId::Business);

        let change: ChangeProfileInput =
            serde_json::from_value(serde_json::json!({ "yearOfBirth": 1999 })).unwrap();
        assert_eq!(change.year_of_birth, Some(1999));
        assert_eq!(change.is_male, None);
    }
}
