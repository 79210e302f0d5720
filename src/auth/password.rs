// Salted password digests, stored as "salt$hex". The exact scheme is an
// internal detail of this module; callers only hash and verify.

use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Default)]
pub struct PasswordManager;

impl PasswordManager {
    pub fn new() -> Self {
        Self
    }

    pub fn hash(&self, password: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = Self::digest(&salt, password);
        format!("{salt}${digest}")
    }

    pub fn verify(&self, password: &str, stored: &str) -> bool {
        match stored.split_once('$') {
            Some((salt, digest)) => Self::digest(salt, password) == digest,
            None => false,
        }
    }

    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_hash_verifies_against_its_password_only() {
        let passwords = PasswordManager::new();
        let stored = passwords.hash("hunter2");
        assert!(passwords.verify("hunter2", &stored));
        assert!(!passwords.verify("hunter3", &stored));
    }

    #[test]
    fn equal_passwords_get_distinct_salts() {
        let passwords = PasswordManager::new();
        assert_ne!(passwords.hash("hunter2"), passwords.hash("hunter2"));
    }

    #[test]
    fn malformed_stored_values_never_verify() {
        let passwords = PasswordManager::new();
        assert!(!passwords.verify("hunter2", "no-separator"));
        assert!(!passwords.verify("hunter2", ""));
    }
}
