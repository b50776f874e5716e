//! Credential storage, expiry tracking and refresh

use super::backend::SessionBackend;
use super::clock::{Clock, SystemClock};
use super::subscriber::{Subscriber, same_subscriber};
use crate::config::AuthConfig;
use crate::lock;
use bonsai_http::ClientError;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex};

type RefreshFuture = Shared<BoxFuture<'static, bool>>;

/// The in-flight refresh, tagged so a finished refresh only releases its own slot
#[derive(Default)]
struct RefreshSlot {
    generation: u64,
    in_flight: Option<RefreshFuture>,
}

/// A bearer token together with the expiry decoded from it
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    raw: String,
    expires_at: Option<i64>,
}

impl Credential {
    /// Wrap a raw token, reading `exp` from its payload
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let expires_at = bonsai_core::jwt::expires_at(&raw);
        Self { raw, expires_at }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Unix seconds, `None` when the token carries no `exp`
    pub const fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("raw", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

struct Inner {
    credential: Mutex<Option<Credential>>,
    subscribers: Mutex<Vec<Arc<dyn Subscriber>>>,
    refresh: Mutex<RefreshSlot>,
    backend: Arc<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
    refresh_ahead: i64,
}

/// Shared session state
///
/// Clones share the same credential, observers and in-flight refresh.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("credential", &*lock(&self.inner.credential))
            .field("subscribers", &lock(&self.inner.subscribers).len())
            .field("refresh_ahead", &self.inner.refresh_ahead)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Store backed by the wall clock and the default refresh-ahead window
    pub fn new(backend: impl SessionBackend + 'static) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: impl SessionBackend + 'static) -> SessionStoreBuilder {
        SessionStoreBuilder::new(Arc::new(backend))
    }

    /// Register an observer and immediately replay the current credential to it
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        lock(&self.inner.subscribers).push(Arc::clone(&subscriber));
        let current = self.credential();
        subscriber.notify(current.as_deref());
    }

    /// Remove the first registration of `subscriber`
    ///
    /// Returns false if it was not registered.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        let mut subscribers = lock(&self.inner.subscribers);
        match subscribers
            .iter()
            .position(|registered| same_subscriber(registered, subscriber))
        {
            Some(index) => {
                subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replace the credential and notify every observer
    ///
    /// Observers run after the lock is released, so they may call back
    /// into the store.
    pub fn set_credential(&self, raw: Option<String>) {
        let credential = raw.map(Credential::new);
        let current = credential.as_ref().map(|c| c.raw.clone());
        tracing::debug!(
            present = credential.is_some(),
            expires_at = ?credential.as_ref().and_then(Credential::expires_at),
            "credential updated"
        );
        *lock(&self.inner.credential) = credential;

        let subscribers = lock(&self.inner.subscribers).clone();
        for subscriber in &subscribers {
            subscriber.notify(current.as_deref());
        }
    }

    pub fn clear_credential(&self) {
        self.set_credential(None);
    }

    /// Raw bearer token, if any
    pub fn credential(&self) -> Option<String> {
        lock(&self.inner.credential)
            .as_ref()
            .map(|c| c.raw.clone())
    }

    /// Expiry of the current credential
    pub fn expires_at(&self) -> Option<i64> {
        lock(&self.inner.credential)
            .as_ref()
            .and_then(Credential::expires_at)
    }

    /// A credential is held and has not yet expired
    pub fn is_authenticated(&self) -> bool {
        let now = self.inner.clock.now();
        lock(&self.inner.credential)
            .as_ref()
            .is_some_and(|c| c.expires_at.is_none_or(|exp| now < exp))
    }

    fn has_headroom(&self) -> bool {
        let now = self.inner.clock.now();
        lock(&self.inner.credential)
            .as_ref()
            .is_some_and(|c| {
                c.expires_at
                    .is_none_or(|exp| exp.saturating_sub(now) > self.inner.refresh_ahead)
            })
    }

    /// Make sure a usable credential is held, refreshing if it is close to expiry
    ///
    /// Returns false when no credential could be obtained, in which case the
    /// store has been cleared. Concurrent callers share one refresh.
    pub async fn ensure_fresh(&self) -> bool {
        if self.has_headroom() {
            return true;
        }

        let refresh = {
            let mut slot = lock(&self.inner.refresh);
            if let Some(in_flight) = slot.in_flight.as_ref() {
                tracing::debug!("joining in-flight refresh");
                in_flight.clone()
            } else {
                slot.generation = slot.generation.wrapping_add(1);
                let generation = slot.generation;
                let store = self.clone();
                let refresh = async move {
                    let refreshed = store.refresh_now().await;
                    store.release_refresh(generation);
                    refreshed
                }
                .boxed()
                .shared();
                slot.in_flight = Some(refresh.clone());
                refresh
            }
        };

        refresh.await
    }

    /// Empty the slot unless a newer refresh has replaced this one
    fn release_refresh(&self, generation: u64) {
        let mut slot = lock(&self.inner.refresh);
        if slot.generation == generation {
            slot.in_flight = None;
        }
    }

    async fn refresh_now(&self) -> bool {
        match self.inner.backend.refresh().await {
            Ok(token) => {
                tracing::debug!("credential refreshed");
                self.set_credential(Some(token));
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "credential refresh failed, signing out");
                self.clear_credential();
                false
            }
        }
    }

    /// Sign in and store the issued credential
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let token = self.inner.backend.login(email, password).await?;
        tracing::info!("signed in");
        self.set_credential(Some(token));
        Ok(())
    }

    /// Invalidate the session server-side, then forget it locally
    ///
    /// The local credential is cleared even if the server call fails.
    pub async fn logout(&self) {
        if let Err(err) = self.inner.backend.logout().await {
            tracing::warn!(error = %err, "server-side logout failed");
        }
        self.clear_credential();
        tracing::info!("signed out");
    }

    /// Drop every observer and any pending refresh
    pub fn teardown(&self) {
        lock(&self.inner.subscribers).clear();
        lock(&self.inner.refresh).in_flight.take();
    }
}

/// Builder for [`SessionStore`]
pub struct SessionStoreBuilder {
    backend: Arc<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
    refresh_ahead: i64,
}

impl SessionStoreBuilder {
    fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            refresh_ahead: AuthConfig::REFRESH_AHEAD_SECS,
        }
    }

    /// Time source for expiry checks
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seconds of remaining validity below which `ensure_fresh` refreshes
    #[must_use]
    pub const fn refresh_ahead(mut self, secs: i64) -> Self {
        self.refresh_ahead = secs;
        self
    }

    pub fn build(self) -> SessionStore {
        SessionStore {
            inner: Arc::new(Inner {
                credential: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                refresh: Mutex::new(RefreshSlot::default()),
                backend: self.backend,
                clock: self.clock,
                refresh_ahead: self.refresh_ahead,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::backend::mock::MockSessionBackend;
    use crate::session::clock::ManualClock;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const NOW: i64 = 1_700_000_000;

    fn token(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
        format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig")
    }

    fn store_with(backend: MockSessionBackend, clock: &Arc<ManualClock>) -> SessionStore {
        SessionStore::builder(backend)
            .clock(Arc::clone(clock) as Arc<dyn Clock>)
            .build()
    }

    fn recorder() -> (Arc<dyn Subscriber>, Arc<Mutex<Vec<Option<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |credential: Option<&str>| {
            sink.lock().unwrap().push(credential.map(str::to_string));
        });
        (subscriber, seen)
    }

    struct SlowBackend {
        refreshes: Arc<AtomicUsize>,
        token: String,
    }

    #[async_trait]
    impl SessionBackend for SlowBackend {
        async fn login(&self, _: &str, _: &str) -> Result<String, ClientError> {
            Ok(self.token.clone())
        }

        async fn refresh(&self) -> Result<String, ClientError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.token.clone())
        }

        async fn logout(&self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    /// Holds the first two refreshes until released
    struct GatedBackend {
        refreshes: Arc<AtomicUsize>,
        release: Arc<Notify>,
        token: String,
    }

    #[async_trait]
    impl SessionBackend for GatedBackend {
        async fn login(&self, _: &str, _: &str) -> Result<String, ClientError> {
            Ok(self.token.clone())
        }

        async fn refresh(&self) -> Result<String, ClientError> {
            if self.refreshes.fetch_add(1, Ordering::SeqCst) < 2 {
                self.release.notified().await;
            }
            Ok(self.token.clone())
        }

        async fn logout(&self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[test]
    fn test_authenticated_until_expiry() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);

        store.set_credential(Some(token(NOW + 300)));
        assert!(store.is_authenticated());
        assert_eq!(store.expires_at(), Some(NOW + 300));

        clock.advance(299);
        assert!(store.is_authenticated());
        clock.advance(1);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_credential_without_exp_never_expires() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);

        store.set_credential(Some("opaque-token".to_string()));
        clock.advance(1_000_000);
        assert!(store.is_authenticated());
        assert_eq!(store.expires_at(), None);
    }

    #[test]
    fn test_clear_credential() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);

        store.set_credential(Some(token(NOW + 300)));
        store.clear_credential();
        assert!(!store.is_authenticated());
        assert_eq!(store.credential(), None);
        assert_eq!(store.expires_at(), None);
    }

    #[test]
    fn test_subscribe_replays_current_state() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);

        let (first, first_seen) = recorder();
        store.subscribe(Arc::clone(&first));
        assert_eq!(*first_seen.lock().unwrap(), vec![None]);

        let raw = token(NOW + 300);
        store.set_credential(Some(raw.clone()));

        let (second, second_seen) = recorder();
        store.subscribe(second);
        assert_eq!(*second_seen.lock().unwrap(), vec![Some(raw.clone())]);
        assert_eq!(*first_seen.lock().unwrap(), vec![None, Some(raw)]);
    }

    #[test]
    fn test_observers_notified_in_subscription_order() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            store.subscribe(Arc::new(move |credential: Option<&str>| {
                if credential.is_some() {
                    order.lock().unwrap().push(name);
                }
            }));
        }

        store.set_credential(Some(token(NOW + 300)));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);

        let (subscriber, seen) = recorder();
        store.subscribe(Arc::clone(&subscriber));
        store.subscribe(Arc::clone(&subscriber));

        assert!(store.unsubscribe(&subscriber));
        store.set_credential(Some("t".to_string()));
        // one registration left
        assert_eq!(seen.lock().unwrap().len(), 3);

        assert!(store.unsubscribe(&subscriber));
        assert!(!store.unsubscribe(&subscriber));
        store.clear_credential();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_observer_may_read_store() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);
        let reader = store.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        store.subscribe(Arc::new(move |_: Option<&str>| {
            sink.lock().unwrap().push(reader.credential());
        }));
        store.set_credential(Some("t".to_string()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("t".to_string())]
        );
    }

    #[tokio::test]
    async fn test_ensure_fresh_skips_refresh_with_headroom() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut backend = MockSessionBackend::new();
        backend.expect_refresh().times(0);
        let store = store_with(backend, &clock);

        store.set_credential(Some(token(NOW + 61)));
        assert!(store.ensure_fresh().await);
    }

    #[tokio::test]
    async fn test_ensure_fresh_refreshes_near_expiry() {
        let clock = Arc::new(ManualClock::new(NOW));
        let fresh = token(NOW + 3600);
        let returned = fresh.clone();
        let mut backend = MockSessionBackend::new();
        backend
            .expect_refresh()
            .times(1)
            .returning(move || Ok(returned.clone()));
        let store = store_with(backend, &clock);

        store.set_credential(Some(token(NOW + 60)));
        assert!(store.ensure_fresh().await);
        assert_eq!(store.credential(), Some(fresh));
    }

    #[tokio::test]
    async fn test_ensure_fresh_with_extreme_past_expiry_refreshes() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut backend = MockSessionBackend::new();
        backend
            .expect_refresh()
            .times(1)
            .returning(|| Ok(token(NOW + 3600)));
        let store = store_with(backend, &clock);

        store.set_credential(Some(token(i64::MIN)));
        assert!(!store.is_authenticated());
        assert!(store.ensure_fresh().await);
        assert_eq!(store.expires_at(), Some(NOW + 3600));
    }

    #[tokio::test]
    async fn test_ensure_fresh_with_extreme_future_expiry_keeps_credential() {
        let clock = Arc::new(ManualClock::new(-NOW));
        let mut backend = MockSessionBackend::new();
        backend.expect_refresh().times(0);
        let store = store_with(backend, &clock);

        store.set_credential(Some(token(i64::MAX)));
        assert!(store.ensure_fresh().await);
        assert_eq!(store.expires_at(), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_ensure_fresh_without_credential_uses_refresh_cookie() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut backend = MockSessionBackend::new();
        backend
            .expect_refresh()
            .times(1)
            .returning(|| Ok(token(NOW + 900)));
        let store = store_with(backend, &clock);

        assert!(store.ensure_fresh().await);
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn test_ensure_fresh_failure_clears_credential() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut backend = MockSessionBackend::new();
        backend
            .expect_refresh()
            .times(1)
            .returning(|| Err(ClientError::AuthenticationFailed("expired".to_string())));
        let store = store_with(backend, &clock);
        let (subscriber, seen) = recorder();

        store.set_credential(Some(token(NOW + 10)));
        store.subscribe(subscriber);
        assert!(!store.ensure_fresh().await);
        assert_eq!(store.credential(), None);
        assert_eq!(seen.lock().unwrap().last(), Some(&None));
    }

    #[tokio::test]
    async fn test_concurrent_ensure_fresh_refreshes_once() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let backend = SlowBackend {
            refreshes: Arc::clone(&refreshes),
            token: token(NOW + 3600),
        };
        let clock = Arc::new(ManualClock::new(NOW));
        let store = SessionStore::builder(backend)
            .clock(clock as Arc<dyn Clock>)
            .build();
        store.set_credential(Some(token(NOW + 30)));

        let clones: Vec<_> = (0..8).map(|_| store.clone()).collect();
        let results =
            futures::future::join_all(clones.iter().map(SessionStore::ensure_fresh)).await;

        assert_eq!(results, vec![true; 8]);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(store.expires_at(), Some(NOW + 3600));
        // the slot is released once the shared refresh completes
        assert!(lock(&store.inner.refresh).in_flight.is_none());
    }

    #[tokio::test]
    async fn test_refresh_abandoned_by_teardown_keeps_newer_slot() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let backend = GatedBackend {
            refreshes: Arc::clone(&refreshes),
            release: Arc::clone(&release),
            // still inside the refresh-ahead window, so every call wants a refresh
            token: token(NOW + 30),
        };
        let clock = Arc::new(ManualClock::new(NOW));
        let store = SessionStore::builder(backend)
            .clock(clock as Arc<dyn Clock>)
            .build();
        store.set_credential(Some(token(NOW + 30)));

        let mut first = Box::pin(store.ensure_fresh());
        assert!(futures::poll!(&mut first).is_pending());
        store.teardown();
        let mut second = Box::pin(store.ensure_fresh());
        assert!(futures::poll!(&mut second).is_pending());
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);

        release.notify_waiters();
        assert!(first.await);
        assert!(lock(&store.inner.refresh).in_flight.is_some());

        let third = store.ensure_fresh();
        assert_eq!(futures::future::join(second, third).await, (true, true));
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);
        assert!(lock(&store.inner.refresh).in_flight.is_none());
    }

    #[tokio::test]
    async fn test_login_stores_credential() {
        let clock = Arc::new(ManualClock::new(NOW));
        let raw = token(NOW + 900);
        let returned = raw.clone();
        let mut backend = MockSessionBackend::new();
        backend
            .expect_login()
            .times(1)
            .returning(move |email, password| {
                assert_eq!(email, "a@b.c");
                assert_eq!(password, "pw");
                Ok(returned.clone())
            });
        let store = store_with(backend, &clock);

        store.login("a@b.c", "pw").await.unwrap();
        assert_eq!(store.credential(), Some(raw));
    }

    #[tokio::test]
    async fn test_login_failure_leaves_store_empty() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut backend = MockSessionBackend::new();
        backend
            .expect_login()
            .returning(|_, _| Err(ClientError::AuthenticationFailed("bad".to_string())));
        let store = store_with(backend, &clock);

        assert!(store.login("a@b.c", "wrong").await.is_err());
        assert_eq!(store.credential(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut backend = MockSessionBackend::new();
        backend.expect_logout().times(1).returning(|| {
            Err(ClientError::ServerError {
                status: 500,
                message: "boom".to_string(),
            })
        });
        let store = store_with(backend, &clock);

        store.set_credential(Some(token(NOW + 900)));
        store.logout().await;
        assert_eq!(store.credential(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_teardown_drops_observers() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = store_with(MockSessionBackend::new(), &clock);
        let (subscriber, seen) = recorder();

        store.subscribe(subscriber);
        store.teardown();
        store.set_credential(Some("t".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new(token(NOW));
        let debug = format!("{credential:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("sig"));
    }
}
