//! Bearer-token lookup for authenticated downloads
//!
//! Token retrieval lives outside the download core. The executor only asks
//! a [`TokenProvider`] for the token of a task's organization and attaches
//! it as `Authorization: Bearer <token>`.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token configured for organization '{0}'")]
    UnknownOrg(String),

    #[error("token lookup failed: {0}")]
    Lookup(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Resolve the bearer token for an organization
    async fn token(&self, org: &str) -> Result<String>;
}

/// Fixed org → token table, usually filled from `FETCHQ_TOKEN_<ORG>` variables.
/// Org names match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        let tokens = tokens
            .into_iter()
            .map(|(org, token)| (org.to_lowercase(), token))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, org: &str) -> Result<String> {
        self.tokens
            .get(&org.to_lowercase())
            .cloned()
            .ok_or_else(|| AuthError::UnknownOrg(org.to_string()))
    }
}
