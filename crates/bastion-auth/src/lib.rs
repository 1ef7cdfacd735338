//! Bastion Auth — the multi-tenant authentication pipeline: portal
//! resolution, rate limiting, lockout, password policy, tokens,
//! sessions, recovery flows, onboarding and the audit trail.

pub mod audit;
pub mod change;
pub mod config;
pub mod error;
pub mod lockout;
pub mod maintenance;
pub mod password;
pub mod portal;
pub mod rate_limit;
pub mod registration;
pub mod reset;
pub mod service;
pub mod session;
pub mod token;

pub use audit::AuditLog;
pub use change::PasswordChangeFlow;
pub use config::AuthConfig;
pub use error::AuthError;
pub use lockout::{LockoutGuard, LockoutStatus};
pub use maintenance::{Maintenance, SweepReport};
pub use password::{PasswordIdentity, PasswordPolicy, StrengthReport};
pub use portal::PortalResolver;
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use registration::{RegisterTenant, Registration, RegistrationFlow};
pub use reset::{PasswordResetFlow, ResetTokenIssued, ResetTokenProblem, ResetTokenStatus};
pub use service::{AuthenticationService, LoginOutput, LoginRequest};
pub use session::SessionStore;
pub use token::{RefreshedAccess, TokenClaims, TokenIssuer, TokenPair, TokenType};
