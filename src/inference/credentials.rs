//! Round-robin credential pool with sticky quota exhaustion.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::inference::error::InferenceError;

/// Splits a comma-delimited credential list, trimming and de-duplicating keys.
pub fn parse_credential_list(raw: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Masks a key for logs: keeps a short prefix and suffix only.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

/// A credential handed out by the pool.
///
/// The key is only reachable through [`Credential::key`]; `Debug` and
/// `Display` print a masked form.
#[derive(Clone)]
pub struct Credential {
    key: Arc<str>,
    slot: usize,
}

impl Credential {
    /// Returns the raw key for the transport.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the masked key for logging.
    pub fn masked(&self) -> String {
        mask_key(&self.key)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key", &self.masked())
            .field("slot", &self.slot)
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Usage snapshot of one pool entry, safe to log or report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialUsage {
    /// Masked key.
    pub masked_key: String,
    /// Number of times the credential was handed out.
    pub usage_count: u64,
    /// Whether the credential has left rotation.
    pub exhausted: bool,
}

struct CredentialEntry {
    key: Arc<str>,
    usage_count: u64,
    exhausted: bool,
}

struct PoolState {
    entries: Vec<CredentialEntry>,
    cursor: usize,
}

/// Round-robin set of inference credentials.
///
/// All rotation state sits behind one mutex that is never held across an
/// await point, so concurrent callers wait briefly instead of racing on the
/// cursor.
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Creates a pool from raw keys; blank and duplicate keys are dropped.
    pub fn new<I, S>(keys: I) -> Result<Self, InferenceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<CredentialEntry> = Vec::new();
        for key in keys {
            let key = key.as_ref().trim();
            if key.is_empty() || entries.iter().any(|e| &*e.key == key) {
                continue;
            }
            entries.push(CredentialEntry {
                key: Arc::from(key),
                usage_count: 0,
                exhausted: false,
            });
        }

        if entries.is_empty() {
            return Err(InferenceError::NoCredentials);
        }

        debug!(credentials = entries.len(), "Created credential pool");
        Ok(Self {
            state: Mutex::new(PoolState { entries, cursor: 0 }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the next non-exhausted credential in round-robin order.
    pub fn next(&self) -> Result<Credential, InferenceError> {
        let mut state = self.lock();
        let len = state.entries.len();

        for offset in 0..len {
            let slot = (state.cursor + offset) % len;
            if state.entries[slot].exhausted {
                continue;
            }
            state.cursor = (slot + 1) % len;
            let entry = &mut state.entries[slot];
            entry.usage_count += 1;
            return Ok(Credential {
                key: Arc::clone(&entry.key),
                slot,
            });
        }

        Err(InferenceError::AllCredentialsExhausted)
    }

    /// Removes a credential from rotation for the lifetime of the pool.
    pub fn mark_exhausted(&self, credential: &Credential) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(credential.slot) else {
            return;
        };
        if entry.key != credential.key || entry.exhausted {
            return;
        }
        entry.exhausted = true;
        let remaining = state.entries.iter().filter(|e| !e.exhausted).count();
        warn!(
            credential = %credential,
            remaining,
            "Credential exhausted its quota, removed from rotation"
        );
    }

    /// Returns the number of credentials still in rotation.
    pub fn available(&self) -> usize {
        self.lock().entries.iter().filter(|e| !e.exhausted).count()
    }

    /// Returns the total number of credentials, exhausted or not.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if the pool holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns a masked usage snapshot for every credential.
    pub fn usage(&self) -> Vec<CredentialUsage> {
        self.lock()
            .entries
            .iter()
            .map(|e| CredentialUsage {
                masked_key: mask_key(&e.key),
                usage_count: e.usage_count,
                exhausted: e.exhausted,
            })
            .collect()
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("usage", &self.usage())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_trims_and_dedupes() {
        assert_eq!(
            parse_credential_list(" a , b,,a, c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(parse_credential_list(" , ").is_empty());
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = CredentialPool::new(Vec::<String>::new()).unwrap_err();
        assert_eq!(err, InferenceError::NoCredentials);
        assert!(CredentialPool::new(["  "]).is_err());
    }

    #[test]
    fn rotates_round_robin() {
        let pool = CredentialPool::new(["A", "B", "C"]).unwrap();
        let keys: Vec<String> = (0..4).map(|_| pool.next().unwrap().key().to_string()).collect();
        assert_eq!(keys, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn skips_exhausted_credentials() {
        let pool = CredentialPool::new(["A", "B", "C"]).unwrap();
        let a = pool.next().unwrap();
        let b = pool.next().unwrap();
        let c = pool.next().unwrap();
        pool.mark_exhausted(&b);
        pool.mark_exhausted(&c);

        for _ in 0..5 {
            assert_eq!(pool.next().unwrap().key(), "A");
        }
        assert_eq!(pool.available(), 1);

        pool.mark_exhausted(&a);
        assert_eq!(
            pool.next().unwrap_err(),
            InferenceError::AllCredentialsExhausted
        );
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn usage_counts_and_masks() {
        let pool = CredentialPool::new(["AIzaSyExampleKey01", "AIzaSyExampleKey02"]).unwrap();
        pool.next().unwrap();
        pool.next().unwrap();
        pool.next().unwrap();
        let usage = pool.usage();
        assert_eq!(usage[0].usage_count, 2);
        assert_eq!(usage[1].usage_count, 1);
        assert_eq!(usage[0].masked_key, "AIza…01");
        assert!(!format!("{pool:?}").contains("ExampleKey"));
    }

    #[test]
    fn concurrent_callers_share_rotation() {
        let pool = Arc::new(CredentialPool::new(["A", "B", "C", "D"]).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        pool.next().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let usage = pool.usage();
        assert!(usage.iter().all(|u| u.usage_count == 200));
    }
}
