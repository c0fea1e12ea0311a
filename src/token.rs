use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{RngCore, SeedableRng, TryRngCore};

pub const DEFAULT_TOKEN_LENGTH: usize = 16;

/// Produces the opaque hex tokens that rotate through a session's QR code.
///
/// The primary path draws bytes from the operating system's secure
/// generator. If that source is unavailable the generator falls back to a
/// time-seeded PRNG, which is weaker and therefore recorded on a flag and
/// logged so the condition is auditable. The fallback is never silent.
#[derive(Clone, Debug)]
pub struct TokenGenerator {
    force_fallback: bool,
    fallback_used: Arc<AtomicBool>,
}

impl TokenGenerator {
    pub fn new() -> Self {
        Self {
            force_fallback: false,
            fallback_used: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A generator that always takes the weak path. Exists so the fallback
    /// branch can be exercised deliberately rather than only on machines
    /// with a broken entropy source.
    pub fn insecure() -> Self {
        Self {
            force_fallback: true,
            fallback_used: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether any token so far came from the weak path.
    pub fn fallback_used(&self) -> bool {
        self.fallback_used.load(Ordering::SeqCst)
    }

    /// Returns a hex string of exactly `length` characters.
    pub fn generate(&self, length: usize) -> String {
        let byte_len = length.div_ceil(2).max(1);
        let mut bytes = vec![0u8; byte_len];

        let secure_ok = !self.force_fallback
            && rand::rngs::OsRng.try_fill_bytes(&mut bytes).is_ok();

        if !secure_ok {
            self.fill_fallback(&mut bytes);
        }

        let mut hex = String::with_capacity(byte_len * 2);
        for b in &bytes {
            hex.push_str(&format!("{:02x}", b));
        }
        hex.truncate(length);
        hex
    }

    fn fill_fallback(&self, bytes: &mut [u8]) {
        if !self.fallback_used.swap(true, Ordering::SeqCst) {
            tracing::warn!("secure random source unavailable, using time-seeded fallback");
        }

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        rng.fill_bytes(bytes);
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}
