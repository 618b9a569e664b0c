//! Masking of secret option values in captured CLI output

/// Replacement written in place of every secret occurrence
pub const MASK: &str = "****";

/// Masks literal secret values in text destined for logs or error messages.
///
/// Secrets are replaced in the order they were collected. Never applied to the
/// arguments actually handed to a subprocess.
#[derive(Debug, Clone, Default)]
pub struct SecretRedactor {
    secrets: Vec<String>,
}

impl SecretRedactor {
    /// Create a redactor from a list of secrets; empty strings are dropped
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let secrets = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        Self { secrets }
    }

    /// Add one more secret
    pub fn push(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.is_empty() && !self.secrets.contains(&secret) {
            self.secrets.push(secret);
        }
    }

    /// True when there is nothing to mask
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Replace every literal occurrence of each secret with [`MASK`]
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for secret in &self.secrets {
            redacted = redacted.replace(secret.as_str(), MASK);
        }
        redacted
    }
}
