use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a generated refresh token. 64 symbols of a 64-symbol alphabet
/// carry 384 bits of entropy.
pub const REFRESH_TOKEN_LEN: usize = 64;

/// Opaque refresh token. The raw value is a bearer secret, so `Debug` only
/// ever shows its fingerprint.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

impl RefreshToken {
    pub fn generate() -> Self {
        RefreshToken(nanoid::nanoid!(REFRESH_TOKEN_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the value could have been produced by [`RefreshToken::generate`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == REFRESH_TOKEN_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }

    /// Hex SHA-256 of the token. Used as the token's jti for replay marks and
    /// as a log-safe identifier.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    /// First 12 hex chars of the fingerprint, for log fields.
    pub fn short_fingerprint(&self) -> String {
        let mut fp = self.fingerprint();
        fp.truncate(12);
        fp
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefreshToken({})", self.short_fingerprint())
    }
}

/// What the store knows about one live session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TokenRecord {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One entry of a user's session index.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SessionEntry {
    pub token: RefreshToken,
    pub expires_at: DateTime<Utc>,
}
