//! Deterministic key derivation, compatible with Rails' key generator.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use tracing::{debug, trace};

/// Derives keys from a secret with PBKDF2-HMAC-SHA1, optionally memoizing
/// the outputs.
///
/// The algorithm is fixed by compatibility with Rails' defaults and is not
/// configurable. For a fixed `(secret, iterations, salt, key_size)` the
/// output is bit-identical across calls; with the cache enabled, repeat
/// derivations additionally return the same shared buffer.
///
/// The cache has no eviction. Deployments feed it a handful of well-known
/// salts, so entries are written once and live as long as the generator.
pub struct KeyGenerator {
    secret: String,
    iterations: u32,
    cache: Option<RwLock<HashMap<(String, u32), Arc<[u8]>>>>,
}

impl KeyGenerator {
    pub fn new(secret: impl Into<String>, iterations: u32, with_cache: bool) -> KeyGenerator {
        KeyGenerator {
            secret: secret.into(),
            iterations,
            cache: with_cache.then(|| RwLock::new(HashMap::new())),
        }
    }

    /// Derive `key_size / 8` bytes for the given salt. `key_size` is a bit
    /// count and must be a multiple of 8.
    pub fn generate_key(&self, salt: &str, key_size: u32) -> Arc<[u8]> {
        debug_assert!(key_size % 8 == 0, "key_size must be a multiple of 8 bits");
        let Some(cache) = &self.cache else {
            return self.derive(salt, key_size);
        };

        let entry = (salt.to_owned(), key_size);
        if let Some(key) = cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entry)
        {
            trace!(salt, key_size, "key cache hit");
            return Arc::clone(key);
        }

        // Compute outside the lock; a racing writer may get there first, in
        // which case its entry wins and this derivation is discarded.
        let derived = self.derive(salt, key_size);
        let mut map = cache.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(entry).or_insert(derived))
    }

    fn derive(&self, salt: &str, key_size: u32) -> Arc<[u8]> {
        debug!(salt, key_size, iterations = self.iterations, "deriving key");
        let mut out = vec![0u8; key_size as usize / 8];
        pbkdf2_hmac::<Sha1>(
            self.secret.as_bytes(),
            salt.as_bytes(),
            self.iterations,
            &mut out,
        );
        Arc::from(out)
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator")
            .field("secret", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
