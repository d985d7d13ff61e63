use std::collections::HashMap;

use async_trait::async_trait;
use pointer_history_protocol::Predicate;
use thiserror::Error;
use tracing::debug;

use crate::config::UserConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEmail {
    pub address: String,
    pub verified: bool,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("identity store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user_by_name(&self, username: &str) -> Result<User, IdentityError>;
    /// Every address on the account, in the store's order.
    async fn emails_for_user(&self, user_id: i64) -> Result<Vec<UserEmail>, IdentityError>;
}

/// Rewrites `@username` references in author and committer predicates into
/// an alternation of the user's verified email addresses.
///
/// Leaves are rewritten in place one at a time; the first lookup failure
/// stops the walk and leaves later leaves untouched.
pub async fn expand_usernames(query: &mut Predicate, store: &dyn UserStore) -> Result<(), IdentityError> {
    for leaf in query.leaves_mut() {
        let matcher = match leaf {
            Predicate::AuthorMatches(m) | Predicate::CommitterMatches(m) => m,
            _ => continue,
        };

        let expanded = expand_usernames_to_emails(store, std::slice::from_ref(&matcher.expr)).await?;
        matcher.expr = format!("({})", expanded.join(")|("));
    }
    Ok(())
}

/// Expands each `@username` value to the user's verified addresses, escaped
/// for use in a regular expression.
///
/// For `["foo", "@alice"]` where alice has verified `alice@example.com` and
/// `alice@example.org`, the result is
/// `["foo", "alice@example\.com", "alice@example\.org"]`. Values that are not
/// username references, unknown users, and users without a verified address
/// pass through unchanged.
pub async fn expand_usernames_to_emails(
    store: &dyn UserStore,
    values: &[String],
) -> Result<Vec<String>, IdentityError> {
    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        match expand_one(store, value).await? {
            Some(emails) if !emails.is_empty() => expanded.extend(emails),
            _ => expanded.push(value.clone()),
        }
    }
    Ok(expanded)
}

async fn expand_one(store: &dyn UserStore, value: &str) -> Result<Option<Vec<String>>, IdentityError> {
    let Some(username) = value.strip_prefix('@') else {
        return Ok(None);
    };

    let user = match store.user_by_name(username).await {
        Ok(user) => user,
        Err(IdentityError::NotFound(_)) => {
            debug!(username, "no such user, leaving reference unexpanded");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let emails = store.emails_for_user(user.id).await?;
    let verified: Vec<String> = emails
        .into_iter()
        .filter(|e| e.verified)
        .map(|e| regex::escape(&e.address))
        .collect();

    debug!(
        username,
        verified_count = verified.len(),
        "expanded username reference"
    );
    Ok(Some(verified))
}

/// A fixed set of users, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticUserStore {
    users: HashMap<String, User>,
    emails: HashMap<i64, Vec<UserEmail>>,
    next_id: i64,
}

impl StaticUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(users: &[UserConfig]) -> Self {
        users.iter().fold(Self::new(), |store, user| {
            store.with_user(user.username.clone(), user.emails.clone())
        })
    }

    /// Registers a user. Registering a name again replaces its emails and
    /// keeps its id.
    pub fn with_user(mut self, username: impl Into<String>, emails: Vec<UserEmail>) -> Self {
        let username = username.into();
        let id = match self.users.get(&username) {
            Some(user) => user.id,
            None => {
                self.next_id += 1;
                self.next_id
            }
        };
        self.users.insert(
            username.clone(),
            User {
                id,
                username,
            },
        );
        self.emails.insert(id, emails);
        self
    }
}

#[async_trait]
impl UserStore for StaticUserStore {
    async fn user_by_name(&self, username: &str) -> Result<User, IdentityError> {
        self.users
            .get(username)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(username.to_string()))
    }

    async fn emails_for_user(&self, user_id: i64) -> Result<Vec<UserEmail>, IdentityError> {
        Ok(self.emails.get(&user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use pointer_history_protocol::Matcher;
    use pretty_assertions::assert_eq;

    fn email(address: &str, verified: bool) -> UserEmail {
        UserEmail {
            address: address.to_string(),
            verified,
        }
    }

    fn store() -> StaticUserStore {
        StaticUserStore::new()
            .with_user(
                "alice",
                vec![
                    email("alice@example.com", true),
                    email("alice@internal", false),
                    email("alice@example.org", true),
                ],
            )
            .with_user("ghost", vec![email("ghost@example.com", false)])
    }

    /// Fails every lookup for `broken`, delegates everything else.
    struct FlakyStore(StaticUserStore);

    #[async_trait]
    impl UserStore for FlakyStore {
        async fn user_by_name(&self, username: &str) -> Result<User, IdentityError> {
            if username == "broken" {
                return Err(IdentityError::Store(anyhow!("connection reset")));
            }
            self.0.user_by_name(username).await
        }

        async fn emails_for_user(&self, user_id: i64) -> Result<Vec<UserEmail>, IdentityError> {
            self.0.emails_for_user(user_id).await
        }
    }

    fn author(expr: &str) -> Predicate {
        Predicate::AuthorMatches(Matcher::new(expr, true))
    }

    #[tokio::test]
    async fn expands_to_verified_emails_in_store_order() {
        let mut query = author("@alice");
        expand_usernames(&mut query, &store()).await.expect("expand");
        assert_eq!(query, author(r"(alice@example\.com)|(alice@example\.org)"));
    }

    #[tokio::test]
    async fn unknown_user_and_plain_values_pass_through() {
        let values = vec!["foo".to_string(), "@nobody".to_string(), "@alice".to_string()];
        let expanded = expand_usernames_to_emails(&store(), &values).await.expect("expand");
        assert_eq!(
            expanded,
            vec![
                "foo".to_string(),
                "@nobody".to_string(),
                r"alice@example\.com".to_string(),
                r"alice@example\.org".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn user_without_verified_email_keeps_token() {
        let mut query = Predicate::CommitterMatches(Matcher::new("@ghost", false));
        expand_usernames(&mut query, &store()).await.expect("expand");
        assert_eq!(query, Predicate::CommitterMatches(Matcher::new("(@ghost)", false)));
    }

    #[tokio::test]
    async fn only_identity_leaves_are_rewritten() {
        let mut query = Predicate::and(vec![
            Predicate::MessageMatches(Matcher::new("@alice", true)),
            Predicate::not(Predicate::CommitterMatches(Matcher::new("@alice", true))),
        ]);
        expand_usernames(&mut query, &store()).await.expect("expand");
        assert_eq!(
            query,
            Predicate::and(vec![
                Predicate::MessageMatches(Matcher::new("@alice", true)),
                Predicate::not(Predicate::CommitterMatches(Matcher::new(
                    r"(alice@example\.com)|(alice@example\.org)",
                    true
                ))),
            ])
        );
    }

    #[tokio::test]
    async fn reregistered_user_keeps_distinct_id() {
        let store = StaticUserStore::new()
            .with_user("a", vec![email("a1@x", true)])
            .with_user("a", vec![email("a2@x", true)])
            .with_user("b", vec![email("b@x", true)]);

        let a = store.user_by_name("a").await.expect("a");
        let b = store.user_by_name("b").await.expect("b");
        assert_ne!(a.id, b.id);
        assert_eq!(store.emails_for_user(a.id).await.expect("a emails"), vec![email("a2@x", true)]);
        assert_eq!(store.emails_for_user(b.id).await.expect("b emails"), vec![email("b@x", true)]);

        let mut query = author("@a");
        expand_usernames(&mut query, &store).await.expect("expand");
        assert_eq!(query, author(r"(a2@x)"));
    }

    #[tokio::test]
    async fn store_failure_stops_the_walk() {
        let mut query = Predicate::or(vec![author("@alice"), author("@broken"), author("@alice")]);
        let err = expand_usernames(&mut query, &FlakyStore(store()))
            .await
            .expect_err("should fail");
        assert!(matches!(err, IdentityError::Store(_)));
        assert_eq!(
            query,
            Predicate::or(vec![
                author(r"(alice@example\.com)|(alice@example\.org)"),
                author("@broken"),
                author("@alice"),
            ])
        );
    }
}
