//! Registered users and their bindings to sessions and games
//!
//! The registry is the only owner of user records. Sessions and games refer
//! to users by id, and a user refers to its session and game by id, so a
//! dropped connection never leaves a dangling reference behind.
//!
//! All mutating operations are meant to run under the registry's write lock,
//! which makes check-and-insert (registration) and check-and-bind (login)
//! atomic for other connection workers. Credential hashes are checked with
//! the lock released.

use crate::session::SessionId;
use log::debug;
use shared::{GameId, UserId, UserSummary};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    credential_hash: String,
    pub session: Option<SessionId>,
    pub game: Option<GameId>,
}

impl User {
    pub fn is_online(&self) -> bool {
        self.session.is_some()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    NameTaken(String),
    UnknownUser(String),
    WrongCredentials,
    AlreadyLoggedIn(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NameTaken(name) => write!(f, "user {} is already registered", name),
            AuthError::UnknownUser(name) => write!(f, "user {} is not registered", name),
            AuthError::WrongCredentials => write!(f, "wrong username or password"),
            AuthError::AlreadyLoggedIn(name) => write!(f, "user {} is already logged in", name),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct UserRegistry {
    users: HashMap<UserId, User>,
    by_name: HashMap<String, UserId>,
    next_user_id: UserId,
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            by_name: HashMap::new(),
            next_user_id: 1,
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registers a new user with an already computed credential hash
    ///
    /// The hash is produced by [`crate::credentials::hash`] before taking the lock,
    /// so the lock only covers the existence check and the insert.
    pub fn register(&mut self, name: &str, credential_hash: String) -> Result<UserId, AuthError> {
        if self.exists(name) {
            return Err(AuthError::NameTaken(name.to_string()));
        }

        let id = self.next_user_id;
        self.next_user_id += 1;

        self.by_name.insert(name.to_string(), id);
        self.users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                credential_hash,
                session: None,
                game: None,
            },
        );
        debug!("Registered user {} with id {}", name, id);
        Ok(id)
    }

    /// Looks up a user for login, returning its id and stored credential hash
    ///
    /// The hash is verified outside the lock, then the user is bound with
    /// [`UserRegistry::bind`].
    pub fn credentials_of(&self, name: &str) -> Result<(UserId, String), AuthError> {
        let user = self
            .by_name
            .get(name)
            .and_then(|id| self.users.get(id))
            .ok_or_else(|| AuthError::UnknownUser(name.to_string()))?;
        if user.is_online() {
            return Err(AuthError::AlreadyLoggedIn(name.to_string()));
        }
        Ok((user.id, user.credential_hash.clone()))
    }

    /// Binds an already verified user to `session`
    ///
    /// Fails without mutating if another session bound the user in between.
    pub fn bind(&mut self, id: UserId, session: SessionId) -> Result<(), AuthError> {
        let user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AuthError::UnknownUser(id.to_string()))?;
        if user.session.is_some_and(|bound| bound != session) {
            return Err(AuthError::AlreadyLoggedIn(user.name.clone()));
        }

        user.session = Some(session);
        Ok(())
    }

    /// Clears the session binding, returning the user that was bound
    pub fn unbind(&mut self, session: SessionId) -> Option<UserId> {
        let user = self
            .users
            .values_mut()
            .find(|user| user.session == Some(session))?;
        user.session = None;
        Some(user.id)
    }

    pub fn set_game(&mut self, user_id: UserId, game: Option<GameId>) {
        if let Some(user) = self.users.get_mut(&user_id) {
            user.game = game;
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<&User> {
        self.users.get(&user_id)
    }

    pub fn session_of(&self, user_id: UserId) -> Option<SessionId> {
        self.users.get(&user_id).and_then(|user| user.session)
    }

    /// Sessions of every online user except `exclude`
    pub fn online_sessions(&self, exclude: Option<UserId>) -> Vec<SessionId> {
        self.users
            .values()
            .filter(|user| Some(user.id) != exclude)
            .filter_map(|user| user.session)
            .collect()
    }

    /// Online users other than `exclude`, ordered by id
    pub fn online_users(&self, exclude: Option<UserId>) -> Vec<UserSummary> {
        let mut users: Vec<UserSummary> = self
            .users
            .values()
            .filter(|user| user.is_online() && Some(user.id) != exclude)
            .map(User::summary)
            .collect();
        users.sort_by_key(|user| user.id);
        users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials;

    fn token(c: char) -> String {
        c.to_string().repeat(shared::TOKEN_LEN)
    }

    fn registry_with(name: &str, c: char) -> UserRegistry {
        let mut registry = UserRegistry::new();
        registry
            .register(name, credentials::hash(&token(c)).unwrap())
            .unwrap();
        registry
    }

    fn login(
        registry: &mut UserRegistry,
        name: &str,
        token: &str,
        session: SessionId,
    ) -> Result<UserId, AuthError> {
        let (id, hashword) = registry.credentials_of(name)?;
        if !credentials::verify(token, &hashword) {
            return Err(AuthError::WrongCredentials);
        }
        registry.bind(id, session)?;
        Ok(id)
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = registry_with("alice_party", 'a');
        assert!(registry.exists("alice_party"));

        let second = registry.register("alice_party", credentials::hash(&token('b')).unwrap());
        assert_eq!(second, Err(AuthError::NameTaken("alice_party".to_string())));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_login_binds_session() {
        let mut registry = registry_with("alice_party", 'a');

        let id = login(&mut registry, "alice_party", &token('a'), 7).unwrap();
        let user = registry.get(id).unwrap();
        assert_eq!(user.session, Some(7));
        assert_eq!(registry.session_of(id), Some(7));
    }

    #[test]
    fn test_failed_login_does_not_mutate() {
        let mut registry = registry_with("alice_party", 'a');

        assert_eq!(
            login(&mut registry, "alice_party", &token('b'), 1),
            Err(AuthError::WrongCredentials)
        );
        assert_eq!(
            login(&mut registry, "alice_party", "short", 1),
            Err(AuthError::WrongCredentials)
        );
        assert!(matches!(
            registry.credentials_of("nobody_here"),
            Err(AuthError::UnknownUser(_))
        ));
        assert!(registry.online_users(None).is_empty());
    }

    #[test]
    fn test_second_session_is_rejected() {
        let mut registry = registry_with("alice_party", 'a');

        let id = login(&mut registry, "alice_party", &token('a'), 1).unwrap();
        assert!(matches!(
            registry.credentials_of("alice_party"),
            Err(AuthError::AlreadyLoggedIn(_))
        ));
        assert_eq!(registry.online_sessions(None), vec![1]);
        assert_eq!(registry.bind(id, 1), Ok(()));
    }

    #[test]
    fn test_bind_rechecks_after_lookup() {
        let mut registry = registry_with("alice_party", 'a');

        // two workers looked the user up before either bound it
        let (id, _) = registry.credentials_of("alice_party").unwrap();
        let (same, _) = registry.credentials_of("alice_party").unwrap();
        assert_eq!(id, same);

        assert_eq!(registry.bind(id, 1), Ok(()));
        assert_eq!(
            registry.bind(same, 2),
            Err(AuthError::AlreadyLoggedIn("alice_party".to_string()))
        );
        assert_eq!(registry.session_of(id), Some(1));
    }

    #[test]
    fn test_unbind_keeps_user_record() {
        let mut registry = registry_with("alice_party", 'a');
        let id = login(&mut registry, "alice_party", &token('a'), 3).unwrap();

        assert_eq!(registry.unbind(3), Some(id));
        assert_eq!(registry.unbind(3), None);
        assert!(registry.exists("alice_party"));
        assert!(!registry.get(id).unwrap().is_online());

        // the record survives, so the same credentials log in again
        assert_eq!(login(&mut registry, "alice_party", &token('a'), 4), Ok(id));
    }

    #[test]
    fn test_online_users_excludes_caller() {
        let mut registry = registry_with("alice_party", 'a');
        registry
            .register("bobby_party", credentials::hash(&token('b')).unwrap())
            .unwrap();
        registry
            .register("carol_party", credentials::hash(&token('c')).unwrap())
            .unwrap();

        let alice = login(&mut registry, "alice_party", &token('a'), 1).unwrap();
        let bob = login(&mut registry, "bobby_party", &token('b'), 2).unwrap();

        let others = registry.online_users(Some(alice));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].id, bob);
        assert_eq!(others[0].name, "bobby_party");
    }
}
