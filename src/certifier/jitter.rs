//! Per-key validity windows.
//!
//! Every certificate in a batch gets its own randomly shifted validity period so that
//! certificates issued together cannot be linked through identical timestamps.

use std::collections::HashSet;

use rand::Rng;
use time::{Duration, OffsetDateTime};

/// Largest shift applied to either end of a validity period.
pub const MAX_JITTER: Duration = Duration::hours(12);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidityWindow {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Latest instant a certificate issued at `now` with `validity` may expire, or `None`
/// when that instant is not representable.
pub fn latest_not_after(now: OffsetDateTime, validity: Duration) -> Option<OffsetDateTime> {
    now.checked_add(validity)?.checked_add(MAX_JITTER)
}

/// Draw `count` distinct windows around `now`.
///
/// `not_before` lies in `[now - 12h, now]` and `not_after` in
/// `[now + validity - 12h, now + validity + 12h]`. Certificates carry whole seconds, so
/// draws are made in seconds and a pair already handed out in this batch is drawn again.
/// Returns `None` if the windows fall outside the representable date range.
pub fn validity_windows<R: Rng + ?Sized>(
    rng: &mut R,
    now: OffsetDateTime,
    validity: Duration,
    count: usize,
) -> Option<Vec<ValidityWindow>> {
    let now = now.checked_sub(Duration::nanoseconds(now.nanosecond().into()))?;
    let expiry = now.checked_add(validity)?;
    latest_not_after(now, validity)?;
    now.checked_sub(MAX_JITTER)?;
    expiry.checked_sub(MAX_JITTER)?;
    let max = MAX_JITTER.whole_seconds();

    let mut seen = HashSet::with_capacity(count);
    let mut windows = Vec::with_capacity(count);
    while windows.len() < count {
        let window = ValidityWindow {
            not_before: now - Duration::seconds(rng.gen_range(0..=max)),
            not_after: expiry + Duration::seconds(rng.gen_range(-max..=max)),
        };
        if seen.insert(window) {
            windows.push(window);
        }
    }
    Some(windows)
}
