//! Password verification.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// External collaborator deciding whether a password is correct.
pub trait CredentialVerifier: Send + Sync + 'static {
    fn verify(&self, user_id: &str, password: &str) -> bool;
}

/// Verifier backed by configured SHA-256 password digests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    digests: HashMap<String, [u8; 32]>,
}

impl StaticCredentials {
    /// Build from `user id -> hex digest`. Malformed digests are skipped
    /// (config validation rejects them earlier).
    pub fn from_hex(entries: &HashMap<String, String>) -> Self {
        let digests = entries
            .iter()
            .filter_map(|(user, digest)| {
                let bytes: [u8; 32] = hex::decode(digest).ok()?.try_into().ok()?;
                Some((user.clone(), bytes))
            })
            .collect();
        Self { digests }
    }

    pub fn digest(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, user_id: &str, password: &str) -> bool {
        let supplied: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        match self.digests.get(user_id) {
            // Fold every byte so timing does not reveal the matching prefix.
            Some(expected) => expected
                .iter()
                .zip(supplied.iter())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let mut entries = HashMap::new();
        entries.insert("alice".to_string(), StaticCredentials::digest("hunter2"));
        entries.insert("broken".to_string(), "zz".to_string());
        let creds = StaticCredentials::from_hex(&entries);

        assert!(creds.verify("alice", "hunter2"));
        assert!(!creds.verify("alice", "hunter3"));
        assert!(!creds.verify("bob", "hunter2"));
        assert!(!creds.verify("broken", ""));
    }
}
