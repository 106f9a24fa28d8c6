use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::domain::{RequestId, RequestStatus, TokenId};

/// Bytes of entropy behind every issued token.
pub const TOKEN_BYTES: usize = 32;

/// The single workflow action a token unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    SelectContractor,
    ScheduleAppointment,
}

impl TokenPurpose {
    /// Whether the bound action is still meaningful for a request in `status`.
    ///
    /// A scheduling link stays usable once an appointment exists so the contractor can rebook.
    pub const fn unlocks_in(self, status: RequestStatus) -> bool {
        match self {
            Self::SelectContractor => matches!(status, RequestStatus::NotifiedOwner),
            Self::ScheduleAppointment => matches!(
                status,
                RequestStatus::ContractorSelected | RequestStatus::Scheduled
            ),
        }
    }

    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::SelectContractor => "select-contractor",
            Self::ScheduleAppointment => "schedule-appointment",
        }
    }
}

/// SHA-256 of the raw token. Only the digest is ever persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenDigest([u8; 32]);

impl TokenDigest {
    pub fn of(raw: &str) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&Sha256::digest(raw.as_bytes()));
        Self(bytes)
    }

    /// Comparison whose running time does not depend on where the digests differ.
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenDigest({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Stored token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub id: TokenId,
    pub request_id: RequestId,
    pub purpose: TokenPurpose,
    pub digest: TokenDigest,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessToken {
    pub request_id: RequestId,
    pub purpose: TokenPurpose,
    pub digest: TokenDigest,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Raw token value handed to the recipient exactly once, inside a link.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub purpose: TokenPurpose,
    pub value: String,
}

impl IssuedToken {
    pub fn url(&self, public_url: &str) -> String {
        format!("{public_url}/{}/{}", self.purpose.path_segment(), self.value)
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("purpose", &self.purpose)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Why a presented token was refused. Callers collapse all of these into one user-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Unknown,
    WrongPurpose,
    Consumed,
    Revoked,
    Expired,
    StageMismatch,
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Draw a fresh URL-safe token from the OS RNG together with its storable record.
    pub fn issue(
        &self,
        request_id: RequestId,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> (IssuedToken, NewAccessToken) {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let value = URL_SAFE_NO_PAD.encode(bytes);

        let record = NewAccessToken {
            request_id,
            purpose,
            digest: TokenDigest::of(&value),
            issued_at: now,
            expires_at: now + self.ttl,
        };

        (IssuedToken { purpose, value }, record)
    }

    /// Check a looked-up token against the action being attempted and the request's status.
    pub fn check(
        token: Option<&AccessToken>,
        purpose: TokenPurpose,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TokenRejection> {
        let token = token.ok_or(TokenRejection::Unknown)?;
        if token.purpose != purpose {
            return Err(TokenRejection::WrongPurpose);
        }
        if token.consumed_at.is_some() {
            return Err(TokenRejection::Consumed);
        }
        if token.revoked_at.is_some() {
            return Err(TokenRejection::Revoked);
        }
        if now >= token.expires_at {
            return Err(TokenRejection::Expired);
        }
        if !purpose.unlocks_in(status) {
            return Err(TokenRejection::StageMismatch);
        }
        Ok(())
    }
}
