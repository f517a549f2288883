pub mod auth;
pub mod metrics;
pub mod passwords;
pub mod readiness;
pub mod revocation;
pub mod rotation;
pub mod session;
pub mod token;
