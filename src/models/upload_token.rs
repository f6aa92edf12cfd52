//! Represents a time-boxed, usage-capped upload token and its history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state persisted alongside a token.
///
/// `Revoked` is terminal and overrides both expiry and quota.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Expired,
    Revoked,
}

/// Why a token can no longer be used.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Revoked,
    Expired,
    LimitReached,
}

/// An upload link handed to a client.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadToken {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Opaque bearer value carried by the client.
    pub token: String,

    /// Owner of the token; namespaces storage paths.
    pub user_id: String,

    /// Absolute instant after which the token is unusable.
    pub expires_at: DateTime<Utc>,

    /// Quota ceiling.
    pub max_uploads: i64,

    /// Files successfully relayed so far. Never decreases.
    pub uploads_used: i64,

    pub status: TokenStatus,

    pub created_at: DateTime<Utc>,

    /// Append-only history, oldest first.
    #[sqlx(skip)]
    pub uploads: Vec<UploadRecord>,
}

impl UploadToken {
    /// Uploads still available under the quota, never negative.
    pub fn remaining(&self) -> i64 {
        (self.max_uploads - self.uploads_used).max(0)
    }

    /// Check the usability invariant at `now`.
    ///
    /// Revocation wins over expiry, and expiry over an exhausted quota, so the
    /// reported reason is stable when several conditions hold at once.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), InvalidReason> {
        if self.status == TokenStatus::Revoked {
            return Err(InvalidReason::Revoked);
        }
        if self.status == TokenStatus::Expired || now >= self.expires_at {
            return Err(InvalidReason::Expired);
        }
        if self.uploads_used >= self.max_uploads {
            return Err(InvalidReason::LimitReached);
        }
        Ok(())
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.check_usable(now).is_ok()
    }
}

/// One successfully relayed file.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct UploadRecord {
    /// Filename as supplied by the client.
    pub file_name: String,

    /// Path the file was written to on the remote drive.
    pub storage_path: String,

    pub uploaded_at: DateTime<Utc>,
}

/// Display data for a token owner.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(status: TokenStatus, used: i64, max: i64, expires_in: Duration) -> UploadToken {
        let now = Utc::now();
        UploadToken {
            id: Uuid::new_v4(),
            token: "t".into(),
            user_id: "u1".into(),
            expires_at: now + expires_in,
            max_uploads: max,
            uploads_used: used,
            status,
            created_at: now,
            uploads: Vec::new(),
        }
    }

    #[test]
    fn active_token_in_quota_and_time_is_usable() {
        let t = token(TokenStatus::Active, 2, 5, Duration::hours(1));
        assert!(t.is_usable(Utc::now()));
        assert_eq!(t.remaining(), 3);
    }

    #[test]
    fn each_failing_condition_invalidates() {
        let now = Utc::now();
        let revoked = token(TokenStatus::Revoked, 0, 5, Duration::hours(1));
        assert_eq!(revoked.check_usable(now), Err(InvalidReason::Revoked));

        let expired = token(TokenStatus::Active, 0, 5, Duration::seconds(-1));
        assert_eq!(expired.check_usable(now), Err(InvalidReason::Expired));

        let marked_expired = token(TokenStatus::Expired, 0, 5, Duration::hours(1));
        assert_eq!(marked_expired.check_usable(now), Err(InvalidReason::Expired));

        let full = token(TokenStatus::Active, 5, 5, Duration::hours(1));
        assert_eq!(full.check_usable(now), Err(InvalidReason::LimitReached));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let t = token(TokenStatus::Active, 0, 1, Duration::hours(1));
        assert!(!t.is_usable(t.expires_at));
        assert!(t.is_usable(t.expires_at - Duration::milliseconds(1)));
    }

    #[test]
    fn revoked_wins_over_other_reasons() {
        let t = token(TokenStatus::Revoked, 9, 5, Duration::seconds(-10));
        assert_eq!(t.check_usable(Utc::now()), Err(InvalidReason::Revoked));
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn display_name_joins_parts() {
        let user = User {
            id: "u".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        };
        assert_eq!(user.display_name(), "Ada Lovelace");
    }
}
