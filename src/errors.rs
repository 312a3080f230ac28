use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Why a coupon failed eligibility. Variants are listed in the order the
/// checks run; evaluation short-circuits on the first failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    NotActive,
    Expired,
    UsageLimitReached,
    AlreadyUsed,
    /// The minimum is carried so callers can surface it in messaging.
    MinimumOrderNotMet { minimum: Decimal },
}

impl fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotActive => write!(f, "this coupon is no longer active"),
            Self::Expired => write!(f, "this coupon has expired"),
            Self::UsageLimitReached => write!(f, "this coupon has reached its usage limit"),
            Self::AlreadyUsed => write!(f, "you have already used this coupon"),
            Self::MinimumOrderNotMet { minimum } => {
                write!(f, "minimum order value of {} required for this coupon", minimum)
            }
        }
    }
}

/// Which redemption invariant lost a race, detected after the fact by the
/// usage ledger. Callers must compensate (fail the order or reverse the
/// discount) rather than retry blindly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageConflict {
    /// The conditional increment found `used_count` already at the limit.
    UsageLimitExceeded { code: String, usage_limit: i32 },
    /// A usage row for `(coupon, user)` appeared between the eligibility
    /// pre-check and the ledger write.
    AlreadyRedeemed { code: String },
}

impl fmt::Display for UsageConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsageLimitExceeded { code, usage_limit } => {
                write!(f, "coupon {} exceeded its usage limit of {}", code, usage_limit)
            }
            Self::AlreadyRedeemed { code } => {
                write!(f, "coupon {} was already redeemed by this user", code)
            }
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Coupon {code} is not eligible: {reason}")]
    IneligibleCoupon {
        code: String,
        reason: IneligibilityReason,
    },

    #[error("Tier range {candidate} overlaps active tier {conflict}")]
    TierOverlap {
        candidate: String,
        conflict: String,
        conflict_id: Uuid,
    },

    #[error("Concurrency violation: {0}")]
    ConcurrencyViolation(UsageConflict),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// True for errors the caller can fix by changing the request; false for
    /// infrastructure failures and lost races.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::ValidationError(_)
                | Self::IneligibleCoupon { .. }
                | Self::TierOverlap { .. }
                | Self::InvalidOperation(_)
        )
    }
}
