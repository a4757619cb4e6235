//! Session credential primitives.
//!
//! Pure building blocks for an authentication core, with no I/O:
//! - Password hashing (Argon2id), the one-way verify/compute capability
//! - Typed session claims and HS256 JWT encoding
//! - `TokenCodec`, which mints and validates access/refresh tokens
//!
//! Storage, rotation and revocation live in the services that use these pieces.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let hash = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify("my_password", &hash).unwrap());
//! ```
//!
//! ## Session Tokens
//! ```
//! use std::time::Duration;
//!
//! use auth::{TokenCodec, TokenType, UserInfo};
//!
//! let codec = TokenCodec::new(
//!     b"secret_key_at_least_32_bytes_long!",
//!     Duration::from_secs(15 * 60),
//!     Duration::from_secs(60 * 60),
//! )
//! .unwrap();
//!
//! let user = UserInfo::new("alice@example.com", "student", 1);
//! let refresh = codec.create_refresh_token(&user).unwrap();
//!
//! let claims = codec.decode(&refresh).unwrap();
//! assert_eq!(claims.token_type, TokenType::Refresh);
//! assert_eq!(claims.user_info(), user);
//! assert!(codec.is_structurally_valid(&refresh));
//! ```

pub mod jwt;
pub mod password;

// Re-export commonly used items
pub use jwt::Claims;
pub use jwt::JwtError;
pub use jwt::JwtHandler;
pub use jwt::TokenCodec;
pub use jwt::TokenType;
pub use jwt::UserInfo;
pub use password::PasswordError;
pub use password::PasswordHasher;
