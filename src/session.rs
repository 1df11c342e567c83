//! Cookie-identified sessions.
//!
//! The browser only ever holds a random id; the values live in a
//! [`SessionStore`]. The default store is an in-process `DashMap`, so
//! sessions from different clients never contend on a shared lock.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "dirserve_session";
pub const AUTH_KEY: &str = "auth";

pub type SessionValues = HashMap<String, Value>;

#[derive(Error, Debug)]
#[error("failed to persist session {id}: {message}")]
pub struct SessionError {
    pub id: Uuid,
    pub message: String,
}

/// Backing storage for session values, keyed by session id.
pub trait SessionStore: Send + Sync {
    fn load(&self, id: &Uuid) -> Option<SessionValues>;
    fn save(&self, id: Uuid, values: SessionValues) -> Result<(), SessionError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, SessionValues>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &Uuid) -> Option<SessionValues> {
        self.sessions.get(id).map(|v| v.value().clone())
    }

    fn save(&self, id: Uuid, values: SessionValues) -> Result<(), SessionError> {
        self.sessions.insert(id, values);
        Ok(())
    }
}

/// One browser's session, loaded for the duration of a request.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    values: SessionValues,
}

impl Session {
    /// Loads the session named by the request cookie, or starts a fresh one
    /// when the cookie is missing, malformed or unknown to the store.
    pub fn load(store: &dyn SessionStore, jar: &CookieJar) -> Self {
        let existing = jar
            .get(SESSION_COOKIE)
            .and_then(|c| Uuid::parse_str(c.value()).ok())
            .and_then(|id| store.load(&id).map(|values| (id, values)));
        match existing {
            Some((id, values)) => Self { id, values },
            None => Self {
                id: Uuid::new_v4(),
                values: SessionValues::new(),
            },
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.get(AUTH_KEY), Some(Value::Bool(true)))
    }

    /// Writes the values back to the store and returns the jar carrying the
    /// session cookie.
    pub fn persist(&self, store: &dyn SessionStore, jar: CookieJar) -> Result<CookieJar, SessionError> {
        store.save(self.id, self.values.clone())?;
        Ok(jar.add(session_cookie(self.id)))
    }
}

fn session_cookie(id: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Jar with the session cookie expired.
pub fn clear_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/").build())
}
