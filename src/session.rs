use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::info;

use crate::flow::error::FlowError;

pub type SubscriptionToken = u64;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Who is editing, and whether they still may.
///
/// Passed into every workspace operation. A session with a token lifetime
/// expires once `issued_at + ttl` has passed; without one (authentication
/// disabled) it only ends through [`SessionContext::invalidate`].
pub struct SessionContext {
    user: String,
    issued_at: DateTime<Utc>,
    ttl: Option<Duration>,
    invalidated: AtomicBool,
    next_token: AtomicU64,
    listeners: DashMap<SubscriptionToken, Listener>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user", &self.user)
            .field("issued_at", &self.issued_at)
            .field("ttl", &self.ttl)
            .field("invalidated", &self.invalidated.load(Ordering::SeqCst))
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SessionContext {
    pub fn new(user: impl Into<String>, issued_at: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        Self {
            user: user.into(),
            issued_at,
            ttl,
            invalidated: AtomicBool::new(false),
            next_token: AtomicU64::new(1),
            listeners: DashMap::new(),
        }
    }

    /// A session for a workspace without authentication.
    pub fn anonymous() -> Self {
        Self::new("anonymous", Utc::now(), None)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| self.issued_at + ttl)
    }

    /// Register `listener` to run once when the session ends.
    pub fn on_invalidated(&self, listener: impl Fn() + Send + Sync + 'static) -> SubscriptionToken {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(token, Arc::new(listener));
        token
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.listeners.remove(&token).is_some()
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// End the session and notify listeners. Later calls do nothing.
    pub fn invalidate(&self) {
        if self.invalidated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Session of {} invalidated", self.user);
        // listeners may unsubscribe themselves; call them outside the map
        let listeners: Vec<Listener> = self.listeners.iter().map(|l| l.value().clone()).collect();
        self.listeners.clear();
        for listener in listeners {
            listener();
        }
    }

    /// Check the token lifetime at `now`, invalidating an expired session.
    pub fn validate(&self, now: DateTime<Utc>) -> bool {
        if self.is_invalidated() {
            return false;
        }
        if self.expires_at().is_some_and(|end| now >= end) {
            self.invalidate();
            return false;
        }
        true
    }

    pub fn ensure_valid(&self) -> Result<(), FlowError> {
        if self.validate(Utc::now()) {
            Ok(())
        } else {
            Err(FlowError::SessionInvalidated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn invalidation_notifies_each_listener_once() {
        let session = SessionContext::anonymous();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        session.on_invalidated(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = calls.clone();
        let token = session.on_invalidated(move || {
            c.fetch_add(10, Ordering::SeqCst);
        });
        assert!(session.unsubscribe(token));
        assert!(!session.unsubscribe(token));

        session.invalidate();
        session.invalidate();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.ensure_valid(), Err(FlowError::SessionInvalidated));
    }

    #[test]
    fn token_expires_after_its_lifetime() {
        let issued = Utc::now();
        let session = SessionContext::new("ana", issued, Some(Duration::minutes(30)));
        assert!(session.validate(issued + Duration::minutes(29)));
        assert!(!session.is_invalidated());

        assert!(!session.validate(issued + Duration::minutes(30)));
        assert!(session.is_invalidated());
    }

    #[test]
    fn without_lifetime_only_explicit_logout_ends_it() {
        let session = SessionContext::anonymous();
        assert!(session.validate(Utc::now() + Duration::days(3650)));
        assert!(session.ensure_valid().is_ok());
    }
}
