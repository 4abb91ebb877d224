use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// An `Instant` so far in the future it will never happen.
pub(crate) fn not_happening() -> Instant {
    const YEARS_100: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);
    static FUTURE: Lazy<Instant> = Lazy::new(|| Instant::now() + YEARS_100);
    *FUTURE
}

/// An `Instant` that predates anything the engine is ever handed.
///
/// `Instant` cannot reach arbitrarily far back, so this anchors up to an
/// hour before process start, or as far back as the platform allows.
pub(crate) fn already_happened() -> Instant {
    static PAST: Lazy<Instant> = Lazy::new(|| {
        let now = Instant::now();
        let mut secs = 3600;
        loop {
            let dur = Duration::from_secs(secs);
            if let Some(v) = now.checked_sub(dur) {
                break v;
            }
            secs -= 1;
            if secs == 0 {
                panic!("Failed to find an already_happened instant");
            }
        }
    });
    *PAST
}

pub(crate) struct NonCryptographicRng;

impl NonCryptographicRng {
    #[inline(always)]
    pub fn u32() -> u32 {
        fastrand::u32(..)
    }
}
