//! Share lifecycle rules.
//!
//! Pure decisions over a loaded [`Share`]; the route handlers do the I/O and map
//! the outcomes to HTTP errors. Expiry is always computed from the stored
//! timestamp at call time. Nothing sweeps expired shares.

use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};

use crate::db::models::Share;

/// Accepted `expiresIn` values, in minutes (one minute to one day).
pub const DURATION_RANGE: RangeInclusive<i64> = 1..=24 * 60;

/// How a share looks to a public viewer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Live,
    Inactive,
    Expired,
}

/// Why a location write was refused. Ordered by precedence: a missing share
/// is handled before any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDenied {
    NotOwner,
    Inactive,
    Expired,
}

/// Resolve the requested duration, applying the default and range check.
/// Returns `None` when the value is outside [`DURATION_RANGE`].
pub fn resolve_duration(requested: Option<i64>, default_minutes: i64) -> Option<i64> {
    let minutes = requested.unwrap_or(default_minutes);
    DURATION_RANGE.contains(&minutes).then_some(minutes)
}

pub fn expires_at(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    now + Duration::minutes(minutes)
}

/// Deactivation wins over expiry so an owner-stopped share always reports inactive.
pub fn visibility(share: &Share, now: DateTime<Utc>) -> Visibility {
    if share.is_live_at(now) {
        Visibility::Live
    } else if !share.active {
        Visibility::Inactive
    } else {
        Visibility::Expired
    }
}

/// Authorize a location write by `user_id` against `share`.
///
/// Only ownership and the active flag are checked unless `enforce_expiry` is
/// set; an active share past its expiry keeps accepting fixes from its owner.
pub fn authorize_location_write(
    share: &Share,
    user_id: &str,
    now: DateTime<Utc>,
    enforce_expiry: bool,
) -> Result<(), WriteDenied> {
    if share.owner_id != user_id {
        return Err(WriteDenied::NotOwner);
    }
    if !share.active {
        return Err(WriteDenied::Inactive);
    }
    if enforce_expiry && share.is_expired_at(now) {
        return Err(WriteDenied::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(active: bool, expires_in_minutes: i64, now: DateTime<Utc>) -> Share {
        Share {
            id: "00000000-0000-4000-8000-000000000001".to_string(),
            owner_id: "owner".to_string(),
            expires_at: now + Duration::minutes(expires_in_minutes),
            active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn duration_defaults_and_bounds() {
        assert_eq!(resolve_duration(None, 60), Some(60));
        assert_eq!(resolve_duration(Some(1), 60), Some(1));
        assert_eq!(resolve_duration(Some(1440), 60), Some(1440));
        assert_eq!(resolve_duration(Some(0), 60), None);
        assert_eq!(resolve_duration(Some(1441), 60), None);
        assert_eq!(resolve_duration(Some(-5), 60), None);
    }

    #[test]
    fn expires_at_adds_whole_minutes() {
        let now = Utc::now();
        for d in [1, 10, 60, 1440] {
            assert_eq!((expires_at(now, d) - now).num_seconds(), d * 60);
        }
    }

    #[test]
    fn visibility_follows_flag_then_expiry() {
        let now = Utc::now();
        assert_eq!(visibility(&share(true, 5, now), now), Visibility::Live);
        assert_eq!(visibility(&share(true, -5, now), now), Visibility::Expired);
        assert_eq!(visibility(&share(false, 5, now), now), Visibility::Inactive);
        assert_eq!(visibility(&share(false, -5, now), now), Visibility::Inactive);
    }

    #[test]
    fn share_is_not_live_at_its_expiry_instant() {
        let now = Utc::now();
        let s = share(true, 0, now);
        assert!(!s.is_live_at(now));
        assert_eq!(visibility(&s, now), Visibility::Expired);
    }

    #[test]
    fn write_precedence_owner_before_active() {
        let now = Utc::now();
        let inactive = share(false, 5, now);
        assert_eq!(
            authorize_location_write(&inactive, "intruder", now, false),
            Err(WriteDenied::NotOwner)
        );
        assert_eq!(
            authorize_location_write(&inactive, "owner", now, false),
            Err(WriteDenied::Inactive)
        );
        assert_eq!(
            authorize_location_write(&share(true, 5, now), "owner", now, false),
            Ok(())
        );
    }

    #[test]
    fn expired_active_share_accepts_writes_unless_enforced() {
        let now = Utc::now();
        let expired = share(true, -1, now);
        assert_eq!(authorize_location_write(&expired, "owner", now, false), Ok(()));
        assert_eq!(
            authorize_location_write(&expired, "owner", now, true),
            Err(WriteDenied::Expired)
        );
    }
}
