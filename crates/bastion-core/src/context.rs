//! Request metadata supplied by the transport layer.

use serde::{Deserialize, Serialize};

/// Source address and user agent of the request being served.
///
/// The transport builds one of these per request and hands it to the
/// service layer explicitly; nothing in the core reads ambient request
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent,
        }
    }

    /// Context for work initiated by the platform itself (sweepers,
    /// operator tooling).
    pub fn system() -> Self {
        Self {
            ip_address: "system".into(),
            user_agent: None,
        }
    }
}
