//! Password hashing and policy
//!
//! Argon2id with configurable cost parameters and an optional pepper.
//! Hashes produced under older parameters are upgraded on the next
//! successful verification.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{distributions::Alphanumeric, Rng};
use zeroize::Zeroizing;

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> AuthResult<String>;

    /// Returns whether `plain` matches `hashed`, plus a replacement hash when
    /// the stored one was produced with outdated parameters.
    fn verify_and_update(&self, plain: &str, hashed: &str) -> AuthResult<(bool, Option<String>)>;

    /// Random password for accounts that never set one
    fn generate(&self) -> String;
}

/// Argon2id password hasher
#[derive(Clone)]
pub struct Argon2Hasher {
    config: PasswordConfig,
}

impl Argon2Hasher {
    pub fn new(config: PasswordConfig) -> AuthResult<Self> {
        // Fail at startup rather than on the first login
        Self::params(&config)?;
        Ok(Self { config })
    }

    fn params(config: &PasswordConfig) -> AuthResult<Params> {
        Params::new(
            config.memory_cost,
            config.time_cost,
            config.parallelism,
            Some(config.hash_length as usize),
        )
        .map_err(|e| AuthError::Config(format!("Invalid Argon2 params: {}", e)))
    }

    fn argon2(&self) -> AuthResult<Argon2<'static>> {
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, Self::params(&self.config)?))
    }

    fn peppered(&self, password: &str) -> Zeroizing<String> {
        match &self.config.pepper {
            Some(pepper) => Zeroizing::new(format!("{}{}", password, pepper)),
            None => Zeroizing::new(password.to_string()),
        }
    }

    fn needs_rehash(&self, parsed: &PasswordHash<'_>) -> bool {
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }
        match Params::try_from(parsed) {
            Ok(params) => {
                params.m_cost() != self.config.memory_cost
                    || params.t_cost() != self.config.time_cost
                    || params.p_cost() != self.config.parallelism
                    || params.output_len() != Some(self.config.hash_length as usize)
            }
            Err(_) => true,
        }
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(self.peppered(password).as_bytes(), &salt)
            .map_err(|_| AuthError::PasswordHashingFailed)?;

        Ok(hash.to_string())
    }

    fn verify_and_update(&self, plain: &str, hashed: &str) -> AuthResult<(bool, Option<String>)> {
        // Unparseable hashes never match; they are not an error for the caller
        let Ok(parsed) = PasswordHash::new(hashed) else {
            return Ok((false, None));
        };

        // Parameters are read from the PHC string itself
        match Argon2::default().verify_password(self.peppered(plain).as_bytes(), &parsed) {
            Ok(()) => {
                let updated = if self.needs_rehash(&parsed) {
                    Some(self.hash(plain)?)
                } else {
                    None
                };
                Ok((true, updated))
            }
            Err(argon2::password_hash::Error::Password) => Ok((false, None)),
            Err(e) => {
                tracing::warn!(error = %e, "Password verification failed on stored hash");
                Ok((false, None))
            }
        }
    }

    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.config.generated_length.max(self.config.min_length))
            .map(char::from)
            .collect()
    }
}

/// Password acceptance rules
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl From<&PasswordConfig> for PasswordPolicy {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            min_length: config.min_length,
            max_length: config.max_length,
            require_uppercase: config.require_uppercase,
            require_lowercase: config.require_lowercase,
            require_digit: config.require_digit,
            require_special: config.require_special,
        }
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::from(&PasswordConfig::default())
    }
}

impl PasswordPolicy {
    /// Check `password`, optionally against the owner's e-mail
    pub fn validate(&self, password: &str, email: Option<&str>) -> AuthResult<()> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(AuthError::invalid_password(format!(
                "Password should be at least {} characters",
                self.min_length
            )));
        }
        if length > self.max_length {
            return Err(AuthError::invalid_password(format!(
                "Password should be at most {} characters",
                self.max_length
            )));
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            return Err(AuthError::invalid_password(
                "Password should contain an uppercase letter",
            ));
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            return Err(AuthError::invalid_password(
                "Password should contain a lowercase letter",
            ));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::invalid_password("Password should contain a digit"));
        }
        if self.require_special && password.chars().all(char::is_alphanumeric) {
            return Err(AuthError::invalid_password(
                "Password should contain a special character",
            ));
        }
        if let Some(email) = email {
            if !email.is_empty() && password.to_lowercase().contains(&email.to_lowercase()) {
                return Err(AuthError::invalid_password(
                    "Password should not contain e-mail",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PasswordConfig {
        PasswordConfig {
            memory_cost: 4096,
            time_cost: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::new(fast_config()).unwrap();
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert_eq!(hasher.verify_and_update("correct horse", &hash).unwrap(), (true, None));
        assert_eq!(hasher.verify_and_update("wrong horse", &hash).unwrap(), (false, None));
    }

    #[test]
    fn test_outdated_params_are_upgraded() {
        let old = Argon2Hasher::new(fast_config()).unwrap();
        let hash = old.hash("correct horse").unwrap();

        let current = Argon2Hasher::new(PasswordConfig {
            time_cost: 2,
            ..fast_config()
        })
        .unwrap();
        let (ok, updated) = current.verify_and_update("correct horse", &hash).unwrap();
        assert!(ok);
        let updated = updated.expect("hash should be upgraded");
        assert!(updated.contains("t=2"));
        assert_eq!(current.verify_and_update("correct horse", &updated).unwrap(), (true, None));
    }

    #[test]
    fn test_pepper_is_required_to_verify() {
        let peppered = Argon2Hasher::new(PasswordConfig {
            pepper: Some("pepper".into()),
            ..fast_config()
        })
        .unwrap();
        let plain = Argon2Hasher::new(fast_config()).unwrap();

        let hash = peppered.hash("secret pass").unwrap();
        assert!(peppered.verify_and_update("secret pass", &hash).unwrap().0);
        assert!(!plain.verify_and_update("secret pass", &hash).unwrap().0);
    }

    #[test]
    fn test_garbage_hash_does_not_match() {
        let hasher = Argon2Hasher::new(fast_config()).unwrap();
        assert_eq!(hasher.verify_and_update("x", "not-a-hash").unwrap(), (false, None));
    }

    #[test]
    fn test_generate() {
        let hasher = Argon2Hasher::new(fast_config()).unwrap();
        let a = hasher.generate();
        assert_eq!(a.len(), 32);
        assert_ne!(a, hasher.generate());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let result = Argon2Hasher::new(PasswordConfig {
            memory_cost: 1,
            ..fast_config()
        });
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_policy() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("long enough", None).is_ok());
        assert!(matches!(
            policy.validate("short", None),
            Err(AuthError::InvalidPassword { .. })
        ));
        assert!(policy
            .validate("xalice@example.comx", Some("Alice@Example.com"))
            .is_err());

        let strict = PasswordPolicy {
            require_uppercase: true,
            require_digit: true,
            ..PasswordPolicy::default()
        };
        assert!(strict.validate("lowercase only", None).is_err());
        assert!(strict.validate("Upper but no digit", None).is_err());
        assert!(strict.validate("Upper and 1 digit", None).is_ok());
    }
}
