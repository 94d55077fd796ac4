use std::time::Duration;

use time::{OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Claims stamped strictly before the returned instant are older than `lease`.
/// `None` when the lease reaches past the representable calendar; no claim is
/// that old.
pub(crate) fn lease_cutoff(now: PrimitiveDateTime, lease: Duration) -> Option<PrimitiveDateTime> {
    let lease = time::Duration::try_from(lease).ok()?;
    now.checked_sub(lease)
}
