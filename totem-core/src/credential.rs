/// PIN Credential Manager
///
/// State machine:
/// ```text
/// NoCredential -> Created -> Unlocked <-> Locked(lockout window) -> Unlocked
/// ```
///
/// The PIN and a random 16-byte salt feed a PBKDF2 work factor that yields
/// both the stored verifier and the backup key. Consecutive mismatches
/// lock the credential for a fixed window; every failure, including an
/// attempt made while locked, is also reported to the self-destruct guard.
/// The two counters are independent: waiting out the lock does not refill
/// the self-destruct budget.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::config::CredentialConfig;
use crate::self_destruct::{FailureOutcome, SelfDestructError, SelfDestructGuard};
use crate::storage::{self, keys, KeyValueStore, StorageError};
use totem_protocol::crypto::hashing::{self, PinMaterial, SALT_SIZE};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("PIN must be {min}-{max} digits")]
    InvalidFormat { min: usize, max: usize },
    #[error("Incorrect PIN")]
    IncorrectPin,
    #[error("Credential locked for {remaining_secs} more seconds")]
    Locked { remaining_secs: u64 },
    #[error("No credential has been set")]
    NoCredential,
    #[error("Too many failed attempts: all secrets were erased")]
    SelfDestructTriggered,
    #[error("PIN key derivation failed")]
    KeyDerivation,
    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, CredentialError>;

impl From<SelfDestructError> for CredentialError {
    fn from(err: SelfDestructError) -> Self {
        match err {
            SelfDestructError::Storage(e) => CredentialError::Storage(e),
        }
    }
}

/// Lock state as seen by a caller rendering a countdown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked { failed_attempts: u32 },
    Locked { remaining_secs: u64 },
}

pub struct CredentialManager {
    store: Arc<dyn KeyValueStore>,
    guard: Arc<SelfDestructGuard>,
    clock: Arc<dyn Clock>,
    config: CredentialConfig,
    /// Serializes the attempt/lock read-modify-write
    state_lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        guard: Arc<SelfDestructGuard>,
        clock: Arc<dyn Clock>,
        config: CredentialConfig,
    ) -> Self {
        Self {
            store,
            guard,
            clock,
            config,
            state_lock: Mutex::new(()),
        }
    }

    /// Create (or replace) the credential for `pin`
    ///
    /// Draws a fresh salt, derives the verifier and backup key, persists
    /// them, and clears any attempt or lock state.
    pub async fn create_credential(&self, pin: &str) -> Result<()> {
        self.check_format(pin)?;
        let _state = self.state_lock.lock().await;

        let salt = hashing::generate_salt();
        let material = self.derive(pin, &salt).await?;

        self.store
            .set(keys::CREDENTIAL_PIN_HASH, hex::encode(material.pin_hash).as_bytes())
            .await?;
        self.store.set(keys::CREDENTIAL_SALT, &salt).await?;
        self.store
            .set(keys::CREDENTIAL_DERIVED_KEY, &material.derived_key)
            .await?;
        self.clear_attempt_state().await?;

        log::info!("PIN credential created");
        Ok(())
    }

    /// Check `pin` against the stored credential
    ///
    /// # Returns
    /// * `Ok(true)` on match; attempt and self-destruct counters are cleared
    /// * `Ok(false)` on mismatch below the lock threshold
    /// * `Err(Locked)` while locked, or when this mismatch engages the lock
    /// * `Err(SelfDestructTriggered)` when this failure exhausted the budget
    pub async fn verify_credential(&self, pin: &str) -> Result<bool> {
        let _state = self.state_lock.lock().await;

        let (stored_hash, salt) = self.load_verifier().await?;

        let now = self.clock.now_millis();
        if let Some(remaining_secs) = self.lock_remaining(now).await? {
            log::warn!("PIN attempt while locked ({}s remaining)", remaining_secs);
            self.report_failure().await?;
            return Err(CredentialError::Locked { remaining_secs });
        }

        let material = self.derive(pin, &salt).await?;
        if hashing::constant_time_eq(hex::encode(material.pin_hash).as_bytes(), &stored_hash) {
            self.clear_attempt_state().await?;
            self.guard.reset_failures().await?;
            log::debug!("PIN verified");
            return Ok(true);
        }

        let attempts =
            storage::get_u32(self.store.as_ref(), keys::CREDENTIAL_ATTEMPTS).await? + 1;
        let lock = if attempts >= self.config.max_attempts {
            let until = self.lock_deadline(now);
            storage::set_i64(self.store.as_ref(), keys::CREDENTIAL_LOCKED_UNTIL, until).await?;
            storage::set_u32(self.store.as_ref(), keys::CREDENTIAL_ATTEMPTS, 0).await?;
            log::warn!(
                "{} consecutive PIN failures, locked for {}s",
                attempts,
                self.config.lockout_secs
            );
            Some(self.config.lockout_secs)
        } else {
            storage::set_u32(self.store.as_ref(), keys::CREDENTIAL_ATTEMPTS, attempts).await?;
            None
        };

        self.report_failure().await?;

        match lock {
            Some(remaining_secs) => Err(CredentialError::Locked { remaining_secs }),
            None => Ok(false),
        }
    }

    /// Persisted backup key, or `None` without a credential
    pub async fn get_derived_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        Ok(self
            .store
            .get(keys::CREDENTIAL_DERIVED_KEY)
            .await?
            .map(Zeroizing::new))
    }

    pub async fn has_credential(&self) -> Result<bool> {
        Ok(self.store.get(keys::CREDENTIAL_PIN_HASH).await?.is_some())
    }

    pub async fn lock_status(&self) -> Result<LockStatus> {
        let _state = self.state_lock.lock().await;
        let now = self.clock.now_millis();

        if let Some(remaining_secs) = self.lock_remaining(now).await? {
            return Ok(LockStatus::Locked { remaining_secs });
        }
        let failed_attempts =
            storage::get_u32(self.store.as_ref(), keys::CREDENTIAL_ATTEMPTS).await?;
        Ok(LockStatus::Unlocked { failed_attempts })
    }

    /// Verify `old_pin`, then re-create the credential under `new_pin`
    ///
    /// A wrong `old_pin` counts as a failed attempt.
    pub async fn change_pin(&self, old_pin: &str, new_pin: &str) -> Result<()> {
        self.check_format(new_pin)?;
        if !self.verify_credential(old_pin).await? {
            return Err(CredentialError::IncorrectPin);
        }
        self.create_credential(new_pin).await
    }

    /// Erase all credential records
    pub async fn clear(&self) -> Result<()> {
        let _state = self.state_lock.lock().await;
        for key in keys::CREDENTIAL_RECORDS {
            self.store.delete(key).await?;
        }
        log::info!("PIN credential cleared");
        Ok(())
    }

    fn check_format(&self, pin: &str) -> Result<()> {
        let len = pin.chars().count();
        let in_range = (self.config.min_pin_len..=self.config.max_pin_len).contains(&len);
        if !in_range || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(CredentialError::InvalidFormat {
                min: self.config.min_pin_len,
                max: self.config.max_pin_len,
            });
        }
        Ok(())
    }

    /// PBKDF2 off the async executor
    async fn derive(&self, pin: &str, salt: &[u8]) -> Result<PinMaterial> {
        let pin = Zeroizing::new(pin.to_string());
        let salt = salt.to_vec();
        let rounds = self.config.kdf_rounds;

        tokio::task::spawn_blocking(move || hashing::derive_pin_material(&pin, &salt, rounds))
            .await
            .map_err(|_| CredentialError::KeyDerivation)?
            .map_err(|_| CredentialError::KeyDerivation)
    }

    async fn load_verifier(&self) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
        let hash = self.store.get(keys::CREDENTIAL_PIN_HASH).await?;
        let salt = self.store.get(keys::CREDENTIAL_SALT).await?;

        match (hash, salt) {
            (Some(hash), Some(salt)) => {
                if salt.len() != SALT_SIZE {
                    return Err(StorageError::corrupted(keys::CREDENTIAL_SALT, "bad salt length")
                        .into());
                }
                Ok((Zeroizing::new(hash), salt))
            }
            _ => Err(CredentialError::NoCredential),
        }
    }

    /// Seconds left on an active lock; expired locks are cleared
    async fn lock_remaining(&self, now: i64) -> Result<Option<u64>> {
        let Some(until) =
            storage::get_i64(self.store.as_ref(), keys::CREDENTIAL_LOCKED_UNTIL).await?
        else {
            return Ok(None);
        };

        if until > now {
            let remaining_ms = (until - now) as u64;
            return Ok(Some(remaining_ms.div_ceil(1000)));
        }

        self.store.delete(keys::CREDENTIAL_LOCKED_UNTIL).await?;
        log::debug!("PIN lock expired");
        Ok(None)
    }

    /// Unix millis at which a lock engaged at `now` ends; saturates, never wraps
    fn lock_deadline(&self, now: i64) -> i64 {
        i64::try_from(self.config.lockout_secs)
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
            .and_then(|millis| now.checked_add(millis))
            .unwrap_or(i64::MAX)
    }

    async fn clear_attempt_state(&self) -> Result<()> {
        self.store.delete(keys::CREDENTIAL_ATTEMPTS).await?;
        self.store.delete(keys::CREDENTIAL_LOCKED_UNTIL).await?;
        Ok(())
    }

    async fn report_failure(&self) -> Result<()> {
        match self.guard.record_failure().await? {
            FailureOutcome::Triggered(_) => Err(CredentialError::SelfDestructTriggered),
            FailureOutcome::Counted { .. } | FailureOutcome::Disabled => Ok(()),
        }
    }
}
