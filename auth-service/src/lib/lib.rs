pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod outbound;

pub use domain::session;
pub use outbound::memory;
pub use outbound::repositories;
