use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth::TokenCodec;
use auth::TokenType;
use auth::UserInfo;

use crate::lifecycle::ShutdownError;
use crate::session::errors::SessionError;
use crate::session::errors::StorageError;
use crate::session::models::TokenPair;
use crate::session::ports::CredentialDirectory;
use crate::session::ports::PairRegistry;
use crate::session::ports::RevocationRegistry;
use crate::session::ports::SessionServicePort;

/// Domain service implementation for session operations.
///
/// Stateless coordinator over the token codec and the three collaborator
/// contracts. All serialization is left to the collaborators, which are expected
/// to offer atomic per-key operations.
pub struct SessionService<CD, PR, RR>
where
    CD: CredentialDirectory,
    PR: PairRegistry,
    RR: RevocationRegistry,
{
    codec: Arc<TokenCodec>,
    credentials: Arc<CD>,
    pairs: Arc<PR>,
    revocations: Arc<RR>,
}

impl<CD, PR, RR> SessionService<CD, PR, RR>
where
    CD: CredentialDirectory,
    PR: PairRegistry,
    RR: RevocationRegistry,
{
    /// Create a new session service with injected dependencies.
    ///
    /// # Arguments
    /// * `codec` - Token codec shared with the revocation registry
    /// * `credentials` - Account directory
    /// * `pairs` - Refresh-to-access pair registry
    /// * `revocations` - Revoked token registry
    pub fn new(
        codec: Arc<TokenCodec>,
        credentials: Arc<CD>,
        pairs: Arc<PR>,
        revocations: Arc<RR>,
    ) -> Self {
        Self {
            codec,
            credentials,
            pairs,
            revocations,
        }
    }

    fn issue_pair(&self, user: &UserInfo) -> Result<TokenPair, SessionError> {
        Ok(TokenPair {
            access_token: self.codec.create_access_token(user)?,
            refresh_token: self.codec.create_refresh_token(user)?,
        })
    }
}

#[async_trait]
impl<CD, PR, RR> SessionServicePort for SessionService<CD, PR, RR>
where
    CD: CredentialDirectory,
    PR: PairRegistry,
    RR: RevocationRegistry,
{
    async fn login(&self, email: &str, password: &str) -> Result<TokenPair, SessionError> {
        let user = match self.credentials.verify(email, password).await {
            Ok(Some(user)) => user,
            Ok(None) | Err(StorageError::NotFound(_)) => {
                tracing::debug!("Login rejected");
                return Err(SessionError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(error = %e, "Credential verification failed");
                return Err(e.into());
            }
        };

        let pair = self.issue_pair(&user)?;
        self.pairs
            .add_pair(&pair.access_token, &pair.refresh_token)
            .await?;

        tracing::info!(
            email = %user.email,
            role = %user.role,
            version = user.version,
            "Session opened"
        );

        Ok(pair)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        if !self.revocations.is_allowed(refresh_token).await? {
            tracing::debug!("Refresh rejected: token is revoked");
            return Err(SessionError::Revoked);
        }

        let claims = self.codec.decode(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(SessionError::InvalidClaims(format!(
                "expected a refresh token, got {}",
                claims.token_type
            )));
        }
        let user = claims.user_info();

        if !self
            .credentials
            .is_version_valid(&user.email, user.version)
            .await?
        {
            tracing::debug!(
                email = %user.email,
                version = user.version,
                "Refresh rejected: account version moved on"
            );
            return Err(SessionError::StaleVersion);
        }

        // The allowance check above and this write are separate registry calls;
        // only the caller whose claim lands may rotate.
        if !self.revocations.claim(refresh_token, claims.exp).await? {
            tracing::warn!(
                email = %user.email,
                "Refresh rejected: token already consumed by a concurrent rotation"
            );
            return Err(SessionError::Revoked);
        }

        let pair = self.issue_pair(&user)?;
        self.pairs
            .add_pair(&pair.access_token, &pair.refresh_token)
            .await?;

        match self.pairs.get_access_by_refresh(refresh_token).await {
            Ok(sibling) => self.revocations.add_tokens(&[sibling]).await?,
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(email = %user.email, "No sibling access token to revoke");
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(email = %user.email, version = user.version, "Session rotated");

        Ok(pair)
    }

    async fn validate_token(&self, token: &str) -> Result<bool, SessionError> {
        if !self.revocations.is_allowed(token).await? {
            return Ok(false);
        }

        Ok(self.codec.is_structurally_valid(token))
    }

    async fn logout(&self, tokens: &[String]) -> Result<(), SessionError> {
        self.revocations.add_tokens(tokens).await?;

        tracing::info!(tokens = tokens.len(), "Session closed");

        Ok(())
    }

    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        let (credentials, pairs, revocations) = tokio::join!(
            self.credentials.shut_down(grace),
            self.pairs.shut_down(grace),
            self.revocations.shut_down(grace)
        );

        ShutdownError::collect([credentials, pairs, revocations])
    }
}

#[cfg(test)]
mod tests {
    use mockall::mock;
    use mockall::Sequence;

    use super::*;

    mock! {
        pub TestCredentials {}

        #[async_trait]
        impl CredentialDirectory for TestCredentials {
            async fn verify(&self, email: &str, password: &str) -> Result<Option<UserInfo>, StorageError>;
            async fn is_version_valid(&self, email: &str, version: u64) -> Result<bool, StorageError>;
            async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError>;
        }
    }

    mock! {
        pub TestPairs {}

        #[async_trait]
        impl PairRegistry for TestPairs {
            async fn add_pair(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError>;
            async fn get_access_by_refresh(&self, refresh_token: &str) -> Result<String, StorageError>;
            async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError>;
        }
    }

    mock! {
        pub TestRevocations {}

        #[async_trait]
        impl RevocationRegistry for TestRevocations {
            async fn add_tokens(&self, tokens: &[String]) -> Result<(), StorageError>;
            async fn is_allowed(&self, token: &str) -> Result<bool, StorageError>;
            async fn claim(&self, token: &str, expires_at: i64) -> Result<bool, StorageError>;
            async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError>;
        }
    }

    type TestService = SessionService<MockTestCredentials, MockTestPairs, MockTestRevocations>;

    fn codec() -> Arc<TokenCodec> {
        Arc::new(
            TokenCodec::new(
                b"test_secret_key_at_least_32_bytes!",
                Duration::from_secs(900),
                Duration::from_secs(3600),
            )
            .expect("valid codec"),
        )
    }

    fn student() -> UserInfo {
        UserInfo::new("u1@example.com", "student", 1)
    }

    fn service(
        codec: Arc<TokenCodec>,
        credentials: MockTestCredentials,
        pairs: MockTestPairs,
        revocations: MockTestRevocations,
    ) -> TestService {
        SessionService::new(
            codec,
            Arc::new(credentials),
            Arc::new(pairs),
            Arc::new(revocations),
        )
    }

    #[tokio::test]
    async fn test_login_success() {
        let codec = codec();
        let mut credentials = MockTestCredentials::new();
        let mut pairs = MockTestPairs::new();
        let revocations = MockTestRevocations::new();

        credentials
            .expect_verify()
            .withf(|email, password| email == "u1@example.com" && password == "pw")
            .times(1)
            .returning(|_, _| Ok(Some(student())));

        pairs
            .expect_add_pair()
            .withf(|access, refresh| !access.is_empty() && !refresh.is_empty() && access != refresh)
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(Arc::clone(&codec), credentials, pairs, revocations);

        let pair = service.login("u1@example.com", "pw").await.expect("login succeeds");

        let access = codec.decode(&pair.access_token).unwrap();
        let refresh = codec.decode(&pair.refresh_token).unwrap();
        assert_eq!(access.user_info(), student());
        assert_eq!(access.token_type, TokenType::Access);
        assert_eq!(refresh.user_info(), student());
        assert_eq!(refresh.token_type, TokenType::Refresh);
    }

    #[tokio::test]
    async fn test_login_wrong_password_issues_nothing() {
        let mut credentials = MockTestCredentials::new();
        let mut pairs = MockTestPairs::new();

        credentials
            .expect_verify()
            .times(1)
            .returning(|_, _| Ok(None));
        pairs.expect_add_pair().times(0);

        let service = service(codec(), credentials, pairs, MockTestRevocations::new());

        let result = service.login("u1@example.com", "wrong").await;
        assert_eq!(result, Err(SessionError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_unknown_account_is_indistinguishable() {
        let mut credentials = MockTestCredentials::new();

        credentials
            .expect_verify()
            .times(1)
            .returning(|email, _| Err(StorageError::NotFound(email.to_string())));

        let service = service(
            codec(),
            credentials,
            MockTestPairs::new(),
            MockTestRevocations::new(),
        );

        let result = service.login("ghost@example.com", "pw").await;
        assert_eq!(result, Err(SessionError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_backend_failure() {
        let mut credentials = MockTestCredentials::new();

        credentials
            .expect_verify()
            .times(1)
            .returning(|_, _| Err(StorageError::Backend("connection refused".to_string())));

        let service = service(
            codec(),
            credentials,
            MockTestPairs::new(),
            MockTestRevocations::new(),
        );

        let result = service.login("u1@example.com", "pw").await;
        assert!(matches!(result, Err(SessionError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_revokes_sibling() {
        let codec = codec();
        let old_refresh = codec.create_refresh_token(&student()).unwrap();
        let old_access = codec.create_access_token(&student()).unwrap();
        let old_exp = codec.decode(&old_refresh).unwrap().exp;

        let mut seq = Sequence::new();
        let mut credentials = MockTestCredentials::new();
        let mut pairs = MockTestPairs::new();
        let mut revocations = MockTestRevocations::new();

        let presented = old_refresh.clone();
        revocations
            .expect_is_allowed()
            .withf(move |token| token == presented)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));

        credentials
            .expect_is_version_valid()
            .withf(|email, version| email == "u1@example.com" && *version == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));

        let presented = old_refresh.clone();
        revocations
            .expect_claim()
            .withf(move |token, expires_at| token == presented && *expires_at == old_exp)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));

        pairs
            .expect_add_pair()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let sibling = old_access.clone();
        pairs
            .expect_get_access_by_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(sibling.clone()));

        let sibling = old_access.clone();
        revocations
            .expect_add_tokens()
            .withf(move |tokens| tokens.len() == 1 && tokens[0] == sibling)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let service = service(Arc::clone(&codec), credentials, pairs, revocations);

        let pair = service.refresh(&old_refresh).await.expect("refresh succeeds");
        assert_ne!(pair.refresh_token, old_refresh);
        assert_eq!(codec.decode(&pair.access_token).unwrap().user_info(), student());
    }

    #[tokio::test]
    async fn test_refresh_without_sibling_still_rotates() {
        let codec = codec();
        let old_refresh = codec.create_refresh_token(&student()).unwrap();

        let mut credentials = MockTestCredentials::new();
        let mut pairs = MockTestPairs::new();
        let mut revocations = MockTestRevocations::new();

        revocations.expect_is_allowed().returning(|_| Ok(true));
        credentials.expect_is_version_valid().returning(|_, _| Ok(true));
        revocations.expect_claim().times(1).returning(|_, _| Ok(true));
        pairs.expect_add_pair().times(1).returning(|_, _| Ok(()));
        pairs
            .expect_get_access_by_refresh()
            .times(1)
            .returning(|refresh| Err(StorageError::NotFound(refresh.to_string())));
        revocations.expect_add_tokens().times(0);

        let service = service(codec, credentials, pairs, revocations);

        assert!(service.refresh(&old_refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_revoked_token() {
        let codec = codec();
        let old_refresh = codec.create_refresh_token(&student()).unwrap();

        let mut credentials = MockTestCredentials::new();
        let mut revocations = MockTestRevocations::new();

        revocations.expect_is_allowed().times(1).returning(|_| Ok(false));
        credentials.expect_is_version_valid().times(0);
        revocations.expect_claim().times(0);

        let service = service(codec, credentials, MockTestPairs::new(), revocations);

        let result = service.refresh(&old_refresh).await;
        assert_eq!(result, Err(SessionError::Revoked));
    }

    #[tokio::test]
    async fn test_refresh_stale_version() {
        let codec = codec();
        let old_refresh = codec.create_refresh_token(&student()).unwrap();

        let mut credentials = MockTestCredentials::new();
        let mut pairs = MockTestPairs::new();
        let mut revocations = MockTestRevocations::new();

        revocations.expect_is_allowed().returning(|_| Ok(true));
        credentials
            .expect_is_version_valid()
            .times(1)
            .returning(|_, _| Ok(false));
        revocations.expect_claim().times(0);
        pairs.expect_add_pair().times(0);

        let service = service(codec, credentials, pairs, revocations);

        let result = service.refresh(&old_refresh).await;
        assert_eq!(result, Err(SessionError::StaleVersion));
    }

    #[tokio::test]
    async fn test_refresh_lost_claim_mints_nothing() {
        let codec = codec();
        let old_refresh = codec.create_refresh_token(&student()).unwrap();

        let mut credentials = MockTestCredentials::new();
        let mut pairs = MockTestPairs::new();
        let mut revocations = MockTestRevocations::new();

        revocations.expect_is_allowed().returning(|_| Ok(true));
        credentials.expect_is_version_valid().returning(|_, _| Ok(true));
        revocations.expect_claim().times(1).returning(|_, _| Ok(false));
        pairs.expect_add_pair().times(0);
        pairs.expect_get_access_by_refresh().times(0);

        let service = service(codec, credentials, pairs, revocations);

        let result = service.refresh(&old_refresh).await;
        assert_eq!(result, Err(SessionError::Revoked));
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let codec = codec();
        let access = codec.create_access_token(&student()).unwrap();

        let mut credentials = MockTestCredentials::new();
        let mut revocations = MockTestRevocations::new();

        revocations.expect_is_allowed().returning(|_| Ok(true));
        credentials.expect_is_version_valid().times(0);

        let service = service(codec, credentials, MockTestPairs::new(), revocations);

        let result = service.refresh(&access).await;
        assert!(matches!(result, Err(SessionError::InvalidClaims(_))));
    }

    #[tokio::test]
    async fn test_refresh_garbage_token() {
        let mut revocations = MockTestRevocations::new();
        revocations.expect_is_allowed().returning(|_| Ok(true));

        let service = service(
            codec(),
            MockTestCredentials::new(),
            MockTestPairs::new(),
            revocations,
        );

        let result = service.refresh("not.a.token").await;
        assert!(matches!(result, Err(SessionError::InvalidClaims(_))));
    }

    #[tokio::test]
    async fn test_validate_token() {
        let codec = codec();
        let access = codec.create_access_token(&student()).unwrap();

        let mut revocations = MockTestRevocations::new();
        revocations.expect_is_allowed().returning(|_| Ok(true));

        let service = service(
            codec,
            MockTestCredentials::new(),
            MockTestPairs::new(),
            revocations,
        );

        assert_eq!(service.validate_token(&access).await, Ok(true));
        assert_eq!(service.validate_token("garbage").await, Ok(false));
    }

    #[tokio::test]
    async fn test_validate_revoked_token() {
        let codec = codec();
        let access = codec.create_access_token(&student()).unwrap();

        let mut revocations = MockTestRevocations::new();
        revocations.expect_is_allowed().times(1).returning(|_| Ok(false));

        let service = service(
            codec,
            MockTestCredentials::new(),
            MockTestPairs::new(),
            revocations,
        );

        assert_eq!(service.validate_token(&access).await, Ok(false));
    }

    #[tokio::test]
    async fn test_validate_backend_failure() {
        let mut revocations = MockTestRevocations::new();
        revocations
            .expect_is_allowed()
            .returning(|_| Err(StorageError::Backend("timeout".to_string())));

        let service = service(
            codec(),
            MockTestCredentials::new(),
            MockTestPairs::new(),
            revocations,
        );

        let result = service.validate_token("anything").await;
        assert!(matches!(result, Err(SessionError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_logout_revokes_every_token() {
        let mut revocations = MockTestRevocations::new();
        revocations
            .expect_add_tokens()
            .withf(|tokens| tokens == ["access".to_string(), "refresh".to_string()])
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            codec(),
            MockTestCredentials::new(),
            MockTestPairs::new(),
            revocations,
        );

        let result = service
            .logout(&["access".to_string(), "refresh".to_string()])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_logout_backend_failure() {
        let mut revocations = MockTestRevocations::new();
        revocations
            .expect_add_tokens()
            .returning(|_| Err(StorageError::Backend("write failed".to_string())));

        let service = service(
            codec(),
            MockTestCredentials::new(),
            MockTestPairs::new(),
            revocations,
        );

        let result = service.logout(&["access".to_string()]).await;
        assert!(matches!(result, Err(SessionError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_shut_down_aggregates_every_collaborator() {
        let mut credentials = MockTestCredentials::new();
        let mut pairs = MockTestPairs::new();
        let mut revocations = MockTestRevocations::new();

        credentials
            .expect_shut_down()
            .times(1)
            .returning(|_| Err(ShutdownError::single("accounts", "pool close failed")));
        pairs.expect_shut_down().times(1).returning(|_| Ok(()));
        revocations
            .expect_shut_down()
            .times(1)
            .returning(|_| Err(ShutdownError::single("revocations", "purge task aborted")));

        let service = service(codec(), credentials, pairs, revocations);

        let error = service
            .shut_down(Duration::from_secs(1))
            .await
            .expect_err("failures are reported");

        let components: Vec<_> = error.failures.iter().map(|f| f.component.as_str()).collect();
        assert_eq!(components, vec!["accounts", "revocations"]);
    }
}
