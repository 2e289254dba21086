use crate::{auth::password::Hasher, error::AuthError, models::User};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// UserStorer Trait
///
/// The persistence contract the auth engine depends on. Every module goes through it:
/// login and logout use `load`, registration uses `create`, confirm and recover look users
/// up by selector, and remember-me keeps hashed tokens per PID.
///
/// **Send + Sync + async_trait** keep the trait object (`Arc<dyn UserStorer>`) usable
/// across Axum's task boundaries.
#[async_trait]
pub trait UserStorer: Send + Sync {
    // --- Core ---
    async fn load(&self, pid: &str) -> Result<User, AuthError>;
    // Overwrites an existing user. Fails with `UserNotFound` for unknown PIDs.
    async fn save(&self, user: User) -> Result<(), AuthError>;
    // Inserts a new user. Fails with `UserExists` when the PID is taken.
    async fn create(&self, user: User) -> Result<(), AuthError>;

    // --- Confirm & Recover ---
    async fn load_by_confirm_selector(&self, selector: &str) -> Result<User, AuthError>;
    async fn load_by_recover_selector(&self, selector: &str) -> Result<User, AuthError>;

    // --- Remember ---
    async fn add_remember_token(&self, pid: &str, hash: String) -> Result<(), AuthError>;
    async fn del_remember_tokens(&self, pid: &str) -> Result<(), AuthError>;
    /// Consumes a token. A token can be used once; `TokenNotFound` otherwise.
    async fn use_remember_token(&self, pid: &str, hash: &str) -> Result<(), AuthError>;

    /// One line per stored record, for `-debugdb` request logging.
    async fn dump(&self) -> Vec<String> {
        Vec::new()
    }
}

/// StorerState
///
/// The concrete type used to share the storer across the application state.
pub type StorerState = Arc<dyn UserStorer>;

/// MemStorer
///
/// Map-backed stand-in for a real database. Users are keyed by PID; remember tokens are
/// kept as a list of hashes per PID. Everything is lost on restart.
#[derive(Default)]
pub struct MemStorer {
    users: RwLock<HashMap<String, User>>,
    tokens: RwLock<HashMap<String, Vec<String>>>,
}

impl MemStorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// seeded
    ///
    /// A store holding one confirmed demo account (`rick@councilofricks.com` / `1234`),
    /// so the private page can be reached without going through registration.
    pub fn seeded(hasher: &Hasher) -> Result<Self, AuthError> {
        let store = Self::new();
        let mut rick = User::new("rick@councilofricks.com", "Rick", hasher.hash("1234")?);
        rick.confirmed = true;
        store.users.write().insert(rick.email.clone(), rick);
        Ok(store)
    }

    fn find_by(&self, predicate: impl Fn(&User) -> bool) -> Result<User, AuthError> {
        self.users
            .read()
            .values()
            .find(|u| predicate(u))
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }
}

#[async_trait]
impl UserStorer for MemStorer {
    async fn load(&self, pid: &str) -> Result<User, AuthError> {
        self.users
            .read()
            .get(pid)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn save(&self, user: User) -> Result<(), AuthError> {
        let mut users = self.users.write();
        match users.get_mut(user.pid()) {
            Some(existing) => {
                *existing = user;
                Ok(())
            }
            None => Err(AuthError::UserNotFound),
        }
    }

    async fn create(&self, user: User) -> Result<(), AuthError> {
        let mut users = self.users.write();
        if users.contains_key(user.pid()) {
            return Err(AuthError::UserExists);
        }
        users.insert(user.pid().to_string(), user);
        Ok(())
    }

    async fn load_by_confirm_selector(&self, selector: &str) -> Result<User, AuthError> {
        self.find_by(|u| u.confirm_selector.as_deref() == Some(selector))
    }

    async fn load_by_recover_selector(&self, selector: &str) -> Result<User, AuthError> {
        self.find_by(|u| u.recover_selector.as_deref() == Some(selector))
    }

    async fn add_remember_token(&self, pid: &str, hash: String) -> Result<(), AuthError> {
        self.tokens
            .write()
            .entry(pid.to_string())
            .or_default()
            .push(hash);
        Ok(())
    }

    async fn del_remember_tokens(&self, pid: &str) -> Result<(), AuthError> {
        self.tokens.write().remove(pid);
        Ok(())
    }

    async fn use_remember_token(&self, pid: &str, hash: &str) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write();
        let list = tokens.get_mut(pid).ok_or(AuthError::TokenNotFound)?;
        let position = list
            .iter()
            .position(|stored| stored == hash)
            .ok_or(AuthError::TokenNotFound)?;
        list.swap_remove(position);
        if list.is_empty() {
            tokens.remove(pid);
        }
        Ok(())
    }

    async fn dump(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .users
            .read()
            .values()
            .map(|u| format!("user: {u:?}"))
            .collect();
        lines.extend(
            self.tokens
                .read()
                .iter()
                .map(|(pid, hashes)| format!("tokens: {pid} => {} remember token(s)", hashes.len())),
        );
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_duplicate_pid() {
        let store = MemStorer::new();
        store
            .create(User::new("a@b.com", "A", "hash".into()))
            .await
            .unwrap();

        let err = store
            .create(User::new("a@b.com", "Other", "hash".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserExists));
    }

    #[tokio::test]
    async fn save_requires_existing_user() {
        let store = MemStorer::new();
        let err = store
            .save(User::new("ghost@b.com", "", String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn remember_tokens_are_single_use() {
        let store = MemStorer::new();
        store.add_remember_token("a@b.com", "h1".into()).await.unwrap();
        store.add_remember_token("a@b.com", "h2".into()).await.unwrap();

        store.use_remember_token("a@b.com", "h1").await.unwrap();
        assert!(matches!(
            store.use_remember_token("a@b.com", "h1").await,
            Err(AuthError::TokenNotFound)
        ));

        store.del_remember_tokens("a@b.com").await.unwrap();
        assert!(matches!(
            store.use_remember_token("a@b.com", "h2").await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn selector_lookup() {
        let store = MemStorer::new();
        let mut user = User::new("a@b.com", "A", "hash".into());
        user.confirm_selector = Some("sel".into());
        store.create(user).await.unwrap();

        let found = store.load_by_confirm_selector("sel").await.unwrap();
        assert_eq!(found.email, "a@b.com");
        assert!(store.load_by_recover_selector("sel").await.is_err());
    }

    #[tokio::test]
    async fn seeded_store_has_confirmed_demo_user() {
        let hasher = Hasher::low_cost();
        let store = MemStorer::seeded(&hasher).unwrap();
        let rick = store.load("rick@councilofricks.com").await.unwrap();

        assert_eq!(rick.name, "Rick");
        assert!(rick.confirmed);
        assert!(hasher.verify(&rick.password, "1234"));
        assert_eq!(store.dump().await.len(), 1);
    }
}
