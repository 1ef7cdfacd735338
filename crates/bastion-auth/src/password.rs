//! Password hashing, strength scoring and reuse history.
//!
//! Hashes are Argon2id in PHC format. An optional pepper (server-side
//! secret) is prepended to the password before hashing and must match
//! at verification time. Both operations run on the blocking pool.

use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use bastion_core::models::user::User;
use bastion_core::repository::{PasswordHistoryRepository, Store};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Passwords rejected outright regardless of composition.
const COMMON_PASSWORDS: &[&str] = &[
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "password",
    "password1",
    "password123",
    "password123!",
    "passw0rd",
    "p@ssw0rd",
    "p@ssword1",
    "qwerty",
    "qwerty123",
    "qwertyuiop",
    "letmein",
    "letmein1!",
    "welcome",
    "welcome1",
    "welcome123!",
    "admin",
    "admin123",
    "administrator",
    "iloveyou",
    "monkey",
    "dragon",
    "football",
    "baseball",
    "sunshine",
    "princess",
    "abc123",
    "111111",
    "000000",
    "trustno1",
    "changeme",
    "changeme123!",
];

const MIN_LENGTH: usize = 8;
const LONG_LENGTH: usize = 12;

/// Who the password belongs to, for personal-information checks.
#[derive(Debug, Clone, Copy)]
pub struct PasswordIdentity<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

/// Outcome of [`score_strength`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrengthReport {
    pub score: u8,
    pub feedback: Vec<String>,
    pub is_valid: bool,
}

/// Score a candidate password.
///
/// One point each for length of at least 12 and for every character
/// class present. Personal information costs two points; a common
/// password scores zero no matter what else it has.
pub fn score_strength(password: &str, identity: PasswordIdentity<'_>) -> StrengthReport {
    let mut score: u8 = 0;
    let mut feedback = Vec::new();

    let length = password.chars().count();
    if length < MIN_LENGTH {
        feedback.push(format!("Password must be at least {MIN_LENGTH} characters"));
    }
    if length >= LONG_LENGTH {
        score += 1;
    }

    let classes = [
        (password.chars().any(|c| c.is_lowercase()), "lowercase letter"),
        (password.chars().any(|c| c.is_uppercase()), "uppercase letter"),
        (password.chars().any(|c| c.is_ascii_digit()), "digit"),
        (
            password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
            "special character",
        ),
    ];
    for (present, label) in classes {
        if present {
            score += 1;
        } else {
            feedback.push(format!("Add at least one {label}"));
        }
    }

    let lowered = password.to_lowercase();
    let local_part = identity.email.split('@').next().unwrap_or_default().to_lowercase();
    let mentions_name = identity
        .name
        .split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .any(|token| lowered.contains(&token.to_lowercase()));
    let mentions_email = !local_part.is_empty() && lowered.contains(&local_part);
    if mentions_name || mentions_email {
        score = score.saturating_sub(2);
        feedback.push("Password must not contain your name or email".into());
    }

    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        score = 0;
        feedback.push("Password is too common".into());
    }

    let is_valid = score >= 3 && feedback.is_empty();
    StrengthReport {
        score,
        feedback,
        is_valid,
    }
}

fn peppered(password: &str, pepper: Option<&str>) -> Vec<u8> {
    match pepper {
        Some(p) => format!("{p}{password}").into_bytes(),
        None => password.as_bytes().to_vec(),
    }
}

/// Hash a password with Argon2id using the configured cost parameters.
///
/// If a pepper is configured, it is prepended to the password before
/// hashing. The salt is randomly generated for each call.
pub fn hash_password(password: &str, config: &AuthConfig) -> Result<String, AuthError> {
    let params = argon2::Params::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| AuthError::internal("argon2 params", e))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let input = peppered(password, config.pepper.as_deref());
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(&input, &salt)
        .map_err(|e| AuthError::internal("argon2 hash", e))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against an Argon2id PHC-format hash.
///
/// Cost parameters are read from the hash itself, so hashes made under
/// older settings keep verifying.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch, or
/// `Err(AuthError::Internal)` if the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> Result<bool, AuthError> {
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::internal("stored password hash", e))?;

    let input = peppered(password, pepper);
    match Argon2::default().verify_password(&input, &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::internal("argon2 verify", e)),
    }
}

/// Hashing, verification and history checks bound to a store.
#[derive(Clone)]
pub struct PasswordPolicy<S: Store> {
    store: S,
    config: AuthConfig,
    /// Hash checked against when there is no account, built on first use
    /// with the configured cost.
    decoy_hash: Arc<OnceCell<String>>,
}

impl<S: Store> PasswordPolicy<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            store,
            config,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_owned();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .map_err(|e| AuthError::internal("hash task", e))?
    }

    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let pepper = self.config.pepper.clone();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash, pepper.as_deref()))
            .await
            .map_err(|e| AuthError::internal("verify task", e))?
    }

    /// Run a full verification against a decoy hash and discard the
    /// result, so a missing account costs as much as a wrong password.
    pub async fn verify_decoy(&self, password: &str) -> Result<(), AuthError> {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hash("decoy-account-password"))
            .await?;
        self.verify(password, decoy).await?;
        Ok(())
    }

    pub fn score_strength(&self, password: &str, identity: PasswordIdentity<'_>) -> StrengthReport {
        score_strength(password, identity)
    }

    /// Whether `candidate` matches any of the user's retained hashes.
    pub async fn check_history(&self, user_id: Uuid, candidate: &str) -> Result<bool, AuthError> {
        let entries = self
            .store
            .password_history()
            .recent(user_id, self.config.password_history_depth)
            .await?;
        if entries.is_empty() {
            return Ok(false);
        }

        let candidate = candidate.to_owned();
        let pepper = self.config.pepper.clone();
        tokio::task::spawn_blocking(move || {
            for entry in &entries {
                if verify_password(&candidate, &entry.password_hash, pepper.as_deref())? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
        .map_err(|e| AuthError::internal("history task", e))?
    }

    /// Record a new hash and drop everything beyond the retained depth.
    pub async fn add_to_history(&self, user_id: Uuid, password_hash: String) -> Result<(), AuthError> {
        let history = self.store.password_history();
        history.append(user_id, password_hash).await?;
        history
            .prune(user_id, self.config.password_history_depth)
            .await?;
        Ok(())
    }

    /// Gate shared by the change and reset flows: strong enough, not
    /// the current password, not in recent history.
    pub async fn ensure_acceptable(&self, user: &User, candidate: &str) -> Result<(), AuthError> {
        let report = score_strength(
            candidate,
            PasswordIdentity {
                name: &user.name,
                email: &user.email,
            },
        );
        if !report.is_valid {
            return Err(AuthError::WeakPassword(report.feedback));
        }

        if self.verify(candidate, &user.password_hash).await? {
            return Err(AuthError::PasswordUnchanged);
        }

        if self.check_history(user.id, candidate).await? {
            return Err(AuthError::PasswordReused);
        }

        Ok(())
    }
}
