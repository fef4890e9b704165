//! # Configuration
//!
//! Negotiation policy configuration for the TLS channel builder.
//!
//! The protocol and cipher allow-lists are an explicit, immutable
//! configuration value handed to [`crate::transport::tls::TlsChannelBuilder`]
//! at construction. They are ordered strongest-first: the intersection with
//! what the provider supports preserves this order, so the strongest mutually
//! supported option is offered first in the handshake.
//!
//! ## Configuration Sources
//! - Direct instantiation with defaults (`TlsPolicy::default()`)
//! - TOML via `TlsPolicy::from_toml()`

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Ordered TLS negotiation allow-lists.
///
/// Entries the local provider does not support are silently skipped at
/// channel construction; an empty intersection is a hard error there.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsPolicy {
    /// Allowed protocol versions, strongest first.
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,

    /// Allowed cipher suites, strongest first.
    #[serde(default = "default_cipher_suites")]
    pub cipher_suites: Vec<String>,
}

fn default_protocols() -> Vec<String> {
    vec!["TLSv1.3".into(), "TLSv1.2".into()]
}

fn default_cipher_suites() -> Vec<String> {
    [
        "TLS13_CHACHA20_POLY1305_SHA256",
        "TLS13_AES_256_GCM_SHA384",
        "TLS13_AES_128_GCM_SHA256",
        "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            protocols: default_protocols(),
            cipher_suites: default_cipher_suites(),
        }
    }
}

impl TlsPolicy {
    /// Load a policy from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Rejects policies that cannot possibly negotiate anything.
    pub fn validate(&self) -> Result<()> {
        if self.protocols.is_empty() {
            return Err(ProtocolError::Config(
                "TLS policy allows no protocol versions".into(),
            ));
        }
        if self.cipher_suites.is_empty() {
            return Err(ProtocolError::Config(
                "TLS policy allows no cipher suites".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)]
    fn default_policy_is_valid_and_ordered() {
        let policy = TlsPolicy::default();
        policy.validate().expect("default policy must validate");
        assert_eq!(policy.protocols[0], "TLSv1.3");
        // TLS 1.3 suites lead the cipher list.
        assert!(policy.cipher_suites[0].starts_with("TLS13_"));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn policy_toml_roundtrip() {
        let policy = TlsPolicy {
            protocols: vec!["TLSv1.3".into()],
            cipher_suites: vec!["TLS13_AES_128_GCM_SHA256".into()],
        };
        let toml = toml::to_string(&policy).expect("serialize");
        let parsed = TlsPolicy::from_toml(&toml).expect("parse");
        assert_eq!(policy, parsed);
    }

    #[test]
    fn toml_defaults_fill_missing_fields() {
        let parsed = TlsPolicy::from_toml("protocols = [\"TLSv1.2\"]\n").unwrap();
        assert_eq!(parsed.protocols, vec!["TLSv1.2".to_string()]);
        assert!(!parsed.cipher_suites.is_empty());
    }

    #[test]
    fn empty_policy_rejected() {
        let policy = TlsPolicy {
            protocols: vec![],
            cipher_suites: vec!["TLS13_AES_128_GCM_SHA256".into()],
        };
        assert!(policy.validate().is_err());
    }
}
