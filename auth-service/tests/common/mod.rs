#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use auth::TokenCodec;
use auth_service::lifecycle::Supervisor;
use auth_service::memory::InMemoryCredentialDirectory;
use auth_service::memory::InMemoryPairRegistry;
use auth_service::memory::InMemoryRevocationRegistry;
use auth_service::session::models::EmailAddress;
use auth_service::session::models::NewAccount;
use auth_service::session::service::SessionService;

pub const SECRET: &[u8] = b"test-secret-key-for-jwt-signing-at-least-32-bytes";

pub type MemorySessionService =
    SessionService<InMemoryCredentialDirectory, InMemoryPairRegistry, InMemoryRevocationRegistry>;

/// Session service wired to the in-memory backends, with handles on every part.
pub struct TestApp {
    pub service: Arc<MemorySessionService>,
    pub codec: Arc<TokenCodec>,
    pub credentials: Arc<InMemoryCredentialDirectory>,
    pub pairs: Arc<InMemoryPairRegistry>,
    pub revocations: Arc<InMemoryRevocationRegistry>,
    pub pair_supervisor: Arc<Supervisor>,
    pub revocation_supervisor: Arc<Supervisor>,
}

impl TestApp {
    /// Spawn with a 15 minute access lifetime and a one hour refresh lifetime.
    pub async fn spawn() -> Self {
        Self::with_ttls(Duration::from_secs(900), Duration::from_secs(3600)).await
    }

    pub async fn with_ttls(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let codec = Arc::new(
            TokenCodec::new(SECRET, access_ttl, refresh_ttl).expect("Failed to create codec"),
        );
        let pair_supervisor = Arc::new(Supervisor::new("test-pairs"));
        let revocation_supervisor = Arc::new(Supervisor::new("test-revocations"));

        let credentials = Arc::new(InMemoryCredentialDirectory::new());
        let pairs = Arc::new(InMemoryPairRegistry::new(
            refresh_ttl,
            Arc::clone(&pair_supervisor),
        ));
        let revocations = Arc::new(InMemoryRevocationRegistry::new(
            Arc::clone(&codec),
            Arc::clone(&revocation_supervisor),
        ));

        let service = Arc::new(SessionService::new(
            Arc::clone(&codec),
            Arc::clone(&credentials),
            Arc::clone(&pairs),
            Arc::clone(&revocations),
        ));

        Self {
            service,
            codec,
            credentials,
            pairs,
            revocations,
            pair_supervisor,
            revocation_supervisor,
        }
    }

    /// Register an account and return its email.
    pub async fn add_account(&self, email: &str, password: &str, role: &str) -> String {
        self.credentials
            .add_account(NewAccount::new(
                EmailAddress::new(email).expect("Invalid test email"),
                password,
                role,
            ))
            .await
            .expect("Failed to create test account");
        email.to_string()
    }
}
