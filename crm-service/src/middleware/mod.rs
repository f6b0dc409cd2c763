pub mod auth;

pub use auth::{admin_middleware, auth_middleware, AuthUser};
