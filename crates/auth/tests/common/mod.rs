#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokenward_auth::claims::{build_payload, TokenKind};
use tokenward_auth::directory::{MemoryDirectory, PasswordVerifier};
use tokenward_auth::{ConcurrencyPolicy, JwtSigner, SessionService, SessionServiceDeps, TokenConfig, TokenSigner};
use tokenward_core::error::CoreError;
use tokenward_core::memory::MemorySessionStore;
use tokenward_core::principal::PrincipalSnapshot;
use tokenward_core::security::SecurityEventKind;
use tokenward_core::session::{DeviceInfo, Session};
use tokenward_core::types::{PrincipalId, SessionId};
use tokenward_events::{SecurityEvent, SecurityEventSink};

pub const ACCESS_SECRET: &str = "access-secret-for-tests";
pub const REFRESH_SECRET: &str = "refresh-secret-for-tests";
pub const PASSWORD: &str = "correct horse battery staple";

/// Keeps every recorded event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<SecurityEventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: SecurityEventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn last(&self, kind: SecurityEventKind) -> Option<SecurityEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.kind == kind)
            .cloned()
    }
}

impl SecurityEventSink for RecordingSink {
    fn record(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Accepts exactly [`PASSWORD`].
pub struct FixedPasswords;

#[async_trait]
impl PasswordVerifier for FixedPasswords {
    async fn verify(&self, _principal: &PrincipalSnapshot, plaintext: &str) -> Result<bool, CoreError> {
        Ok(plaintext == PASSWORD)
    }
}

pub struct Harness {
    pub service: SessionService,
    pub store: Arc<MemorySessionStore>,
    pub directory: Arc<MemoryDirectory>,
    pub events: Arc<RecordingSink>,
}

pub fn token_config() -> TokenConfig {
    TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET)
}

pub async fn harness(policy: ConcurrencyPolicy) -> Harness {
    let store = Arc::new(MemorySessionStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let events = Arc::new(RecordingSink::default());
    directory.upsert(principal("acct_p")).await;

    let (service, _worker) = SessionService::start(
        SessionServiceDeps {
            store: store.clone(),
            signer: Arc::new(JwtSigner::new(token_config())),
            directory: directory.clone(),
            passwords: Arc::new(FixedPasswords),
            events: events.clone(),
        },
        policy,
    );

    Harness {
        service,
        store,
        directory,
        events,
    }
}

/// A service publishing to `events` instead of a [`RecordingSink`].
pub async fn service_with_sink(events: Arc<dyn SecurityEventSink>) -> SessionService {
    let directory = Arc::new(MemoryDirectory::new());
    directory.upsert(principal("acct_p")).await;
    let (service, _worker) = SessionService::start(
        SessionServiceDeps {
            store: Arc::new(MemorySessionStore::new()),
            signer: Arc::new(JwtSigner::new(token_config())),
            directory,
            passwords: Arc::new(FixedPasswords),
            events,
        },
        ConcurrencyPolicy::default(),
    );
    service
}

pub fn principal(id: &str) -> PrincipalSnapshot {
    PrincipalSnapshot::new(id, "Test Principal").with_roles(["member"])
}

pub fn device(id: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: Some(id.to_string()),
        device_name: Some(format!("{id} device")),
        platform: Some("ios".into()),
        user_agent: Some("tokenward-tests/1.0".into()),
        origin_ip: Some("203.0.113.7".into()),
    }
}

pub fn limit_only(max: u32) -> ConcurrencyPolicy {
    ConcurrencyPolicy {
        replace_by_device: false,
        max_active_sessions: Some(max),
    }
}

pub fn pid() -> PrincipalId {
    PrincipalId::new("acct_p")
}

impl Harness {
    pub async fn snapshot(&self) -> PrincipalSnapshot {
        use tokenward_auth::directory::PrincipalDirectory;
        self.directory.find(&pid()).await.unwrap().unwrap()
    }

    pub async fn row(&self, session_id: SessionId) -> Session {
        use tokenward_core::store::SessionStore;
        self.store.find(&pid(), &session_id).await.unwrap().unwrap()
    }

    pub async fn active_ids(&self) -> Vec<SessionId> {
        use tokenward_core::store::SessionStore;
        self.store
            .list_active(&pid())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect()
    }

    /// A correctly signed refresh token for `session_id` that is not the one
    /// the engine issued.
    pub async fn forged_refresh(&self, session_id: SessionId) -> String {
        let mut config = token_config();
        config.refresh_ttl = chrono::Duration::days(6);
        let signer = JwtSigner::new(config);
        let payload = build_payload(&self.snapshot().await, session_id, TokenKind::Refresh);
        signer.sign_refresh(&payload).await.unwrap().token
    }
}
