//! Authentication module
//!
//! Registration, login, logout and the bearer-token gate that protects
//! the rest of the API.

pub mod gate;
pub mod handlers;
pub mod password;
pub mod revocation;
pub mod service;
pub mod token;
pub mod validation;

pub use gate::{require_auth, AuthContext};
pub use revocation::RevokedTokens;
pub use service::{AuthService, LoginOutcome};
pub use token::{Claims, IssuedToken, TokenIssuer};
