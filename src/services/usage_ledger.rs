use crate::{
    db::DbPool,
    entities::coupon::{self, Entity as Coupon},
    entities::coupon_usage::{self, AppliedType, Entity as CouponUsage},
    errors::{ServiceError, UsageConflict},
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct RecordUsageInput {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub discount_amount: Decimal,
    pub order_subtotal: Decimal,
    pub applied_type: AppliedType,
}

/// Append-only redemption ledger. All mutation of `coupons.used_count` goes
/// through [`record`](UsageLedgerService::record) so the counter and the
/// ledger rows can never drift apart.
#[derive(Clone)]
pub struct UsageLedgerService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl UsageLedgerService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Records a redemption atomically: a conditional increment of
    /// `used_count` that fails when the usage limit is already consumed,
    /// followed by a one-time-per-user re-check, followed by the ledger
    /// insert. All three run in one transaction; an error before commit
    /// rolls everything back.
    ///
    /// A zero-row increment or a concurrent duplicate for a one-time coupon
    /// surfaces as [`ServiceError::ConcurrencyViolation`], which the caller
    /// must treat as a failed redemption, not a retryable glitch.
    #[instrument(skip(self, input), fields(coupon_id = %input.coupon_id, order_id = %input.order_id))]
    pub async fn record(
        &self,
        input: RecordUsageInput,
    ) -> Result<coupon_usage::Model, ServiceError> {
        if input.discount_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount amount cannot be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let coupon_model = Coupon::find_by_id(input.coupon_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        // Conditional increment: only succeeds while used_count is below the
        // limit (or the coupon is unlimited). Zero rows affected means a
        // concurrent redemption consumed the last slot.
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(input.coupon_id))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            warn!(code = %coupon_model.code, "Usage limit consumed by a concurrent redemption");
            return Err(ServiceError::ConcurrencyViolation(
                UsageConflict::UsageLimitExceeded {
                    code: coupon_model.code,
                    usage_limit: coupon_model.usage_limit.unwrap_or(0),
                },
            ));
        }

        // Re-check inside the transaction. The row lock taken by the
        // increment serializes writers on the same coupon, so two racing
        // redemptions by the same user cannot both pass this check.
        if coupon_model.one_time_per_user {
            let prior = CouponUsage::find()
                .filter(coupon_usage::Column::CouponId.eq(input.coupon_id))
                .filter(coupon_usage::Column::UserId.eq(input.user_id))
                .count(&txn)
                .await?;
            if prior > 0 {
                warn!(code = %coupon_model.code, user_id = %input.user_id, "Duplicate redemption blocked");
                return Err(ServiceError::ConcurrencyViolation(
                    UsageConflict::AlreadyRedeemed {
                        code: coupon_model.code,
                    },
                ));
            }
        }

        let usage = coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(input.coupon_id),
            coupon_code: Set(coupon_model.code.clone()),
            user_id: Set(input.user_id),
            order_id: Set(input.order_id),
            discount_amount: Set(input.discount_amount),
            order_subtotal: Set(input.order_subtotal),
            applied_type: Set(input.applied_type),
            used_at: Set(Utc::now()),
        };
        let recorded = usage.insert(&txn).await?;
        txn.commit().await?;

        info!(
            code = %coupon_model.code,
            order_id = %input.order_id,
            discount = %input.discount_amount,
            "Coupon redemption recorded"
        );
        self.emit(Event::CouponRedeemed {
            coupon_id: input.coupon_id,
            order_id: input.order_id,
            discount_amount: input.discount_amount,
        })
        .await;
        Ok(recorded)
    }

    /// Whether `user_id` has a ledger entry for the coupon. Advisory only:
    /// the authoritative check is the in-transaction re-check in `record`.
    pub async fn has_used(&self, coupon_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
        let count = CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    /// Of the given coupons, the subset this user has already redeemed.
    /// One query, so the auto-apply selector stays O(1) in round-trips.
    pub async fn used_coupons(
        &self,
        user_id: Uuid,
        coupon_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, ServiceError> {
        if coupon_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let usages = CouponUsage::find()
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .filter(coupon_usage::Column::CouponId.is_in(coupon_ids.iter().copied()))
            .all(&*self.db)
            .await?;
        Ok(usages.into_iter().map(|u| u.coupon_id).collect())
    }

    /// Redemption history for one coupon, newest first.
    pub async fn usages_for_coupon(
        &self,
        coupon_id: Uuid,
    ) -> Result<Vec<coupon_usage::Model>, ServiceError> {
        Ok(CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .order_by_desc(coupon_usage::Column::UsedAt)
            .all(&*self.db)
            .await?)
    }

    /// Bulk fetch for listing endpoints that aggregate stats in memory.
    pub async fn usages_for_coupons(
        &self,
        coupon_ids: &[Uuid],
    ) -> Result<Vec<coupon_usage::Model>, ServiceError> {
        if coupon_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.is_in(coupon_ids.iter().copied()))
            .all(&*self.db)
            .await?)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send redemption event");
            }
        }
    }
}
