//! # Chat Sessions
//!
//! Paid sessions with a credit balance and a one-hour lifetime. Every
//! balance change goes through [`DocumentStore::transact`], so parallel
//! requests against one session can never spend more than it holds.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::Regime;
use crate::store::{mutation, DocumentStore, Query, StoreError, SESSIONS};

/// Lifetime of a new session, in seconds.
pub const SESSION_TTL_SECS: i64 = 60 * 60;

pub fn session_ttl() -> Duration {
    Duration::seconds(SESSION_TTL_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Exhausted,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlement_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_credits: u32,
    pub status: SessionStatus,
    pub current_regime: Regime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context_stack: Vec<String>,
}

impl ChatSession {
    /// Active, funded and not past its expiry.
    pub fn can_spend(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && self.remaining_credits > 0 && now < self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("corrupt session document: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Corrupt(e.to_string())
    }
}

/// Result of trying to take credit up front.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// Credit taken; the session as written.
    Reserved(ChatSession),
    /// The session exists but cannot spend (inactive, expired or short).
    Denied,
    /// No such session.
    Missing,
}

/// Session lifecycle over a [`DocumentStore`].
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn DocumentStore>,
}

impl SessionService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn start_session(
        &self,
        user_id: &str,
        entitlement_id: Option<&str>,
        credits: u32,
    ) -> Result<ChatSession, SessionError> {
        let now = Utc::now();
        let session = ChatSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entitlement_id: entitlement_id.map(str::to_string),
            start_time: now,
            expires_at: now + session_ttl(),
            remaining_credits: credits,
            status: SessionStatus::Active,
            current_regime: Regime::Nominal,
            last_activity: None,
            context_stack: Vec::new(),
        };
        self.store
            .set(SESSIONS, &session.session_id, serde_json::to_value(&session)?)
            .await?;
        log::info!("session {} started for {} with {} credits", session.session_id, user_id, credits);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, SessionError> {
        match self.store.get(SESSIONS, session_id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Spend `amount` credits atomically.
    ///
    /// Reaching zero marks the session EXHAUSTED. Asking for more than
    /// remains spends nothing and also marks it EXHAUSTED. Returns `None`
    /// when the session does not exist.
    pub async fn decrement_credit(&self, session_id: &str, amount: u32) -> Result<Option<ChatSession>, SessionError> {
        let id = session_id.to_string();
        let result = self
            .store
            .transact(
                SESSIONS,
                session_id,
                mutation(move |current| {
                    let doc = current.ok_or_else(|| StoreError::NotFound {
                        collection: SESSIONS.to_string(),
                        id: id.clone(),
                    })?;
                    let mut session: ChatSession = serde_json::from_value(doc.clone())
                        .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
                    if session.remaining_credits < amount {
                        session.status = SessionStatus::Exhausted;
                    } else {
                        session.remaining_credits -= amount;
                        if session.remaining_credits == 0 {
                            session.status = SessionStatus::Exhausted;
                        }
                    }
                    serde_json::to_value(&session).map_err(|e| StoreError::InvalidDocument(e.to_string()))
                }),
            )
            .await;

        match result {
            Ok(doc) => {
                let session: ChatSession = serde_json::from_value(doc)?;
                log::debug!(
                    "session {} decremented by {}: {} left ({:?})",
                    session.session_id,
                    amount,
                    session.remaining_credits,
                    session.status
                );
                Ok(Some(session))
            }
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(StoreError::InvalidDocument(e)) => Err(SessionError::Corrupt(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Take `amount` credits only if the session can spend them right now.
    ///
    /// Check and spend happen in one transaction, so of several parallel
    /// callers at most the funded number get [`Reservation::Reserved`].
    pub async fn reserve_credit(
        &self,
        session_id: &str,
        amount: u32,
        now: DateTime<Utc>,
    ) -> Result<Reservation, SessionError> {
        let id = session_id.to_string();
        let result = self
            .store
            .transact(
                SESSIONS,
                session_id,
                mutation(move |current| {
                    let doc = current.ok_or_else(|| StoreError::NotFound {
                        collection: SESSIONS.to_string(),
                        id: id.clone(),
                    })?;
                    let mut session: ChatSession = serde_json::from_value(doc.clone())
                        .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
                    if !session.can_spend(now) || session.remaining_credits < amount {
                        return Err(StoreError::Aborted(format!("session {id} cannot spend {amount}")));
                    }
                    session.remaining_credits -= amount;
                    if session.remaining_credits == 0 {
                        session.status = SessionStatus::Exhausted;
                    }
                    serde_json::to_value(&session).map_err(|e| StoreError::InvalidDocument(e.to_string()))
                }),
            )
            .await;

        match result {
            Ok(doc) => {
                let session: ChatSession = serde_json::from_value(doc)?;
                log::debug!(
                    "session {} reserved {}: {} left",
                    session.session_id,
                    amount,
                    session.remaining_credits
                );
                Ok(Reservation::Reserved(session))
            }
            Err(StoreError::Aborted(reason)) => {
                log::debug!("reservation denied: {}", reason);
                Ok(Reservation::Denied)
            }
            Err(StoreError::NotFound { .. }) => Ok(Reservation::Missing),
            Err(StoreError::InvalidDocument(e)) => Err(SessionError::Corrupt(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Give back credits taken by [`reserve_credit`](Self::reserve_credit).
    ///
    /// A session exhausted by the reservation becomes ACTIVE again; an
    /// EXPIRED one stays expired.
    pub async fn refund_credit(&self, session_id: &str, amount: u32) -> Result<Option<ChatSession>, SessionError> {
        let id = session_id.to_string();
        let result = self
            .store
            .transact(
                SESSIONS,
                session_id,
                mutation(move |current| {
                    let doc = current.ok_or_else(|| StoreError::NotFound {
                        collection: SESSIONS.to_string(),
                        id: id.clone(),
                    })?;
                    let mut session: ChatSession = serde_json::from_value(doc.clone())
                        .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
                    session.remaining_credits = session.remaining_credits.saturating_add(amount);
                    if session.status == SessionStatus::Exhausted && session.remaining_credits > 0 {
                        session.status = SessionStatus::Active;
                    }
                    serde_json::to_value(&session).map_err(|e| StoreError::InvalidDocument(e.to_string()))
                }),
            )
            .await;

        match result {
            Ok(doc) => Ok(Some(serde_json::from_value(doc)?)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(StoreError::InvalidDocument(e)) => Err(SessionError::Corrupt(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Keep the session alive without spending credit.
    pub async fn hold_session(&self, session_id: &str) -> Result<(), SessionError> {
        let patch = serde_json::json!({ "last_activity": Utc::now() });
        match self.store.update(SESSIONS, session_id, patch).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(SessionError::NotFound(session_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Record the regime the session is operating under.
    pub async fn set_regime(&self, session_id: &str, regime: Regime) -> Result<(), SessionError> {
        let patch = serde_json::json!({ "current_regime": regime });
        self.store.update(SESSIONS, session_id, patch).await?;
        Ok(())
    }

    /// Mark every ACTIVE session past its expiry as EXPIRED; returns their ids.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<String>, SessionError> {
        let query = Query::new().where_eq("status", "ACTIVE");
        let mut expired = Vec::new();
        for (id, doc) in self.store.query(SESSIONS, &query).await? {
            let session: ChatSession = serde_json::from_value(doc)?;
            if session.expires_at > now {
                continue;
            }
            self.store
                .update(SESSIONS, &id, serde_json::json!({ "status": SessionStatus::Expired }))
                .await?;
            expired.push(id);
        }
        if !expired.is_empty() {
            log::info!("expired {} stale sessions", expired.len());
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> SessionService {
        SessionService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_start_and_get() {
        let svc = service();
        let s = svc.start_session("u1", Some("sub_1"), 3).await.unwrap();
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.expires_at - s.start_time, session_ttl());
        assert_eq!(s.current_regime, Regime::Nominal);

        let loaded = svc.get_session(&s.session_id).await.unwrap().unwrap();
        assert_eq!(loaded, s);
        assert!(svc.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decrement_to_zero_exhausts() {
        let svc = service();
        let s = svc.start_session("u1", None, 2).await.unwrap();
        let after = svc.decrement_credit(&s.session_id, 1).await.unwrap().unwrap();
        assert_eq!(after.remaining_credits, 1);
        assert_eq!(after.status, SessionStatus::Active);
        let after = svc.decrement_credit(&s.session_id, 1).await.unwrap().unwrap();
        assert_eq!(after.remaining_credits, 0);
        assert_eq!(after.status, SessionStatus::Exhausted);
        assert!(!after.can_spend(Utc::now()));
    }

    #[tokio::test]
    async fn test_overdraw_exhausts_without_spending() {
        let svc = service();
        let s = svc.start_session("u1", None, 2).await.unwrap();
        let after = svc.decrement_credit(&s.session_id, 5).await.unwrap().unwrap();
        assert_eq!(after.remaining_credits, 2);
        assert_eq!(after.status, SessionStatus::Exhausted);
    }

    #[tokio::test]
    async fn test_decrement_missing_session() {
        assert!(service().decrement_credit("nope", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parallel_decrements_never_overspend() {
        let svc = service();
        let s = svc.start_session("u1", None, 10).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..25 {
            let svc = svc.clone();
            let id = s.session_id.clone();
            handles.push(tokio::spawn(async move { svc.decrement_credit(&id, 1).await.unwrap() }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let end = svc.get_session(&s.session_id).await.unwrap().unwrap();
        assert_eq!(end.remaining_credits, 0);
        assert_eq!(end.status, SessionStatus::Exhausted);
    }

    #[tokio::test]
    async fn test_hold_touches_activity_only() {
        let svc = service();
        let s = svc.start_session("u1", None, 4).await.unwrap();
        svc.hold_session(&s.session_id).await.unwrap();
        let after = svc.get_session(&s.session_id).await.unwrap().unwrap();
        assert!(after.last_activity.is_some());
        assert_eq!(after.remaining_credits, 4);
        assert!(matches!(svc.hold_session("nope").await, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expire_stale() {
        let svc = service();
        let a = svc.start_session("u1", None, 1).await.unwrap();
        let b = svc.start_session("u2", None, 1).await.unwrap();
        assert!(svc.expire_stale(Utc::now()).await.unwrap().is_empty());

        let later = Utc::now() + session_ttl() + Duration::minutes(1);
        let mut expired = svc.expire_stale(later).await.unwrap();
        expired.sort();
        let mut expected = vec![a.session_id.clone(), b.session_id.clone()];
        expected.sort();
        assert_eq!(expired, expected);
        for id in [a.session_id, b.session_id] {
            let s = svc.get_session(&id).await.unwrap().unwrap();
            assert_eq!(s.status, SessionStatus::Expired);
        }
        assert!(svc.expire_stale(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_can_spend_respects_expiry() {
        let svc = service();
        let s = svc.start_session("u1", None, 1).await.unwrap();
        assert!(s.can_spend(Utc::now()));
        assert!(!s.can_spend(s.expires_at));
    }

    #[tokio::test]
    async fn test_reserve_checks_and_spends_atomically() {
        let svc = service();
        let s = svc.start_session("u1", None, 1).await.unwrap();
        let now = Utc::now();
        let Reservation::Reserved(after) = svc.reserve_credit(&s.session_id, 1, now).await.unwrap() else {
            panic!("expected reservation");
        };
        assert_eq!(after.remaining_credits, 0);
        assert_eq!(after.status, SessionStatus::Exhausted);
        assert_eq!(svc.reserve_credit(&s.session_id, 1, now).await.unwrap(), Reservation::Denied);
        assert_eq!(svc.reserve_credit("nope", 1, now).await.unwrap(), Reservation::Missing);
    }

    #[tokio::test]
    async fn test_reserve_denies_expired_session() {
        let svc = service();
        let s = svc.start_session("u1", None, 5).await.unwrap();
        let reservation = svc.reserve_credit(&s.session_id, 1, s.expires_at).await.unwrap();
        assert_eq!(reservation, Reservation::Denied);
        let unchanged = svc.get_session(&s.session_id).await.unwrap().unwrap();
        assert_eq!(unchanged.remaining_credits, 5);
    }

    #[tokio::test]
    async fn test_parallel_reservations_never_overspend() {
        let svc = service();
        let s = svc.start_session("u1", None, 3).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let svc = svc.clone();
            let id = s.session_id.clone();
            handles.push(tokio::spawn(async move { svc.reserve_credit(&id, 1, Utc::now()).await.unwrap() }));
        }
        let mut reserved = 0;
        for h in handles {
            if matches!(h.await.unwrap(), Reservation::Reserved(_)) {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 3);
    }

    #[tokio::test]
    async fn test_refund_reactivates_exhausted_session() {
        let svc = service();
        let s = svc.start_session("u1", None, 1).await.unwrap();
        svc.reserve_credit(&s.session_id, 1, Utc::now()).await.unwrap();
        let back = svc.refund_credit(&s.session_id, 1).await.unwrap().unwrap();
        assert_eq!(back.remaining_credits, 1);
        assert_eq!(back.status, SessionStatus::Active);
        assert!(svc.refund_credit("nope", 1).await.unwrap().is_none());
    }
}
