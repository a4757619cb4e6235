//! In-process implementations of the session storage contracts.
//!
//! Suitable for a single instance and for tests; state is lost on restart.

pub mod credentials;
pub mod pairs;
pub mod revocations;

pub use credentials::InMemoryCredentialDirectory;
pub use pairs::InMemoryPairRegistry;
pub use revocations::InMemoryRevocationRegistry;
