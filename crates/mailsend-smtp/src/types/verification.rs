//! Certificate verification findings.

use std::fmt;

bitflags::bitflags! {
    /// Independent reasons a peer certificate failed verification.
    ///
    /// An empty set means the certificate verified.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VerificationResult: u32 {
        /// The certificate is outside its validity period.
        const EXPIRED = 0x01;
        /// The certificate has been revoked.
        const REVOKED = 0x02;
        /// The certificate is not valid for the requested server name.
        const HOSTNAME_MISMATCH = 0x04;
        /// The chain does not lead to a trusted anchor.
        const UNTRUSTED = 0x08;
    }
}

impl VerificationResult {
    /// Returns true if no finding was recorded.
    #[must_use]
    pub const fn is_verified(self) -> bool {
        self.is_empty()
    }

    /// Human-readable description of each finding, in flag order.
    ///
    /// `server_name` is named in the hostname mismatch line.
    #[must_use]
    pub fn findings(self, server_name: &str) -> Vec<String> {
        self.iter()
            .map(|flag| {
                if flag == Self::EXPIRED {
                    "server certificate has expired".to_string()
                } else if flag == Self::REVOKED {
                    "server certificate has been revoked".to_string()
                } else if flag == Self::HOSTNAME_MISMATCH {
                    format!("certificate name mismatch (expected {server_name})")
                } else if flag == Self::UNTRUSTED {
                    "self-signed or not signed by a trusted CA".to_string()
                } else {
                    format!("unknown verification failure {:#x}", flag.bits())
                }
            })
            .collect()
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("verified");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        f.write_str(&names.join(" | "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_verified() {
        let result = VerificationResult::empty();
        assert!(result.is_verified());
        assert!(result.findings("mail.example.com").is_empty());
        assert_eq!(result.to_string(), "verified");
    }

    #[test]
    fn expired_and_mismatch_decode_to_exactly_two_findings() {
        let result = VerificationResult::from_bits_truncate(
            VerificationResult::EXPIRED.bits() | VerificationResult::HOSTNAME_MISMATCH.bits(),
        );

        assert!(!result.is_verified());
        assert_eq!(
            result.findings("mail.example.com"),
            vec![
                "server certificate has expired".to_string(),
                "certificate name mismatch (expected mail.example.com)".to_string(),
            ]
        );
        assert_eq!(result.to_string(), "EXPIRED | HOSTNAME_MISMATCH");
    }

    #[test]
    fn all_flags() {
        assert_eq!(VerificationResult::all().findings("h").len(), 4);
    }
}
