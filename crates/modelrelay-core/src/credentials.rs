//! Upstream access token providers
//!
//! The routing core never holds the token. Transports ask a
//! [`CredentialProvider`] for it on every call and drop it afterwards.

use std::env;

use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Environment variables checked for the upstream token, in order
pub const TOKEN_ENV_VARS: [&str; 2] = ["MODELRELAY_API_KEY", "GITHUB_TOKEN"];

/// Prefixes of GitHub-issued tokens
const GITHUB_TOKEN_PREFIXES: [&str; 5] = ["ghp_", "gho_", "ghu_", "ghs_", "github_pat_"];

/// Supplies the single upstream access token
pub trait CredentialProvider: Send + Sync {
    /// Current token
    fn token(&self) -> Result<Zeroizing<String>>;
}

/// Reads the token from the environment on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn token(&self) -> Result<Zeroizing<String>> {
        TOKEN_ENV_VARS
            .iter()
            .find_map(|var| env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .map(Zeroizing::new)
            .ok_or(Error::CredentialsMissing)
    }
}

/// Fixed token, for tests and embedding
pub struct StaticCredentials {
    token: Zeroizing<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("token", &redact(&self.token))
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn token(&self) -> Result<Zeroizing<String>> {
        if self.token.is_empty() {
            return Err(Error::CredentialsMissing);
        }
        Ok(self.token.clone())
    }
}

/// Whether a token has the shape of a GitHub-issued token
pub fn looks_like_github_token(token: &str) -> bool {
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// Redact a token down to its last four characters
pub fn redact(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        "***".to_string()
    } else {
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("***{}", suffix)
    }
}
