use crate::{
    db::DbPool,
    entities::{
        coupon::{self, DiscountType, Entity as Coupon},
        coupon_usage::{self, AppliedType},
    },
    errors::{IneligibilityReason, ServiceError},
    events::{Event, EventSender},
    services::usage_ledger::UsageLedgerService,
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Rounds a currency amount to two decimal places, half-up
/// (`MidpointAwayFromZero`). Every discount and tax figure that leaves this
/// engine passes through here so downstream arithmetic stays consistent.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Checks whether a coupon may be redeemed by a user against a pre-discount
/// subtotal. Checks run in a fixed order and short-circuit on the first
/// failure; each reason is specific enough for customer-facing messaging.
///
/// Pure: the caller supplies the ledger's answer for the one-time-per-user
/// check and the evaluation instant.
pub fn evaluate(
    coupon: &coupon::Model,
    already_used_by_user: bool,
    now: DateTime<Utc>,
    subtotal: Decimal,
) -> Result<(), IneligibilityReason> {
    if !coupon.is_active || coupon.is_archived {
        return Err(IneligibilityReason::NotActive);
    }

    // Inclusive-active-until: a coupon expiring at T is still valid at T.
    if let Some(expires_at) = coupon.expires_at {
        if now > expires_at {
            return Err(IneligibilityReason::Expired);
        }
    }

    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(IneligibilityReason::UsageLimitReached);
        }
    }

    if coupon.one_time_per_user && already_used_by_user {
        return Err(IneligibilityReason::AlreadyUsed);
    }

    if subtotal < coupon.min_order_value {
        return Err(IneligibilityReason::MinimumOrderNotMet {
            minimum: coupon.min_order_value,
        });
    }

    Ok(())
}

/// Computes the discount a coupon yields on a subtotal, rounded to 2dp.
///
/// Percentage coupons are clamped to `max_discount` when set; fixed coupons
/// never exceed the subtotal they apply to, so the discounted subtotal can
/// never go negative.
pub fn calculate_discount(coupon: &coupon::Model, subtotal: Decimal) -> Decimal {
    let amount = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = subtotal * coupon.discount_value / Decimal::ONE_HUNDRED;
            match coupon.max_discount {
                Some(cap) if raw > cap => cap,
                _ => raw,
            }
        }
        DiscountType::Fixed => coupon.discount_value.min(subtotal),
    };
    round_currency(amount)
}

/// Picks the auto-apply coupon with the highest discount from pre-loaded
/// candidates. Ties keep the earliest candidate, so callers must supply a
/// stable ordering (the service loads them by code ascending) for
/// reproducible selection.
pub fn select_best<'a>(
    candidates: &'a [(coupon::Model, bool)],
    now: DateTime<Utc>,
    subtotal: Decimal,
) -> Option<(&'a coupon::Model, Decimal)> {
    if subtotal <= Decimal::ZERO {
        return None;
    }

    let mut best: Option<(&coupon::Model, Decimal)> = None;
    for (candidate, already_used) in candidates {
        if !candidate.auto_apply {
            continue;
        }
        if evaluate(candidate, *already_used, now, subtotal).is_err() {
            continue;
        }
        let discount = calculate_discount(candidate, subtotal);
        match best {
            Some((_, best_discount)) if discount <= best_discount => {}
            _ => best = Some((candidate, discount)),
        }
    }
    best
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCouponInput {
    #[validate(length(min = 1, max = 32, message = "Coupon code is required"))]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_order_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    #[serde(default = "default_true")]
    pub one_time_per_user: bool,
    #[serde(default)]
    pub auto_apply: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Partial update. Nullable coupon fields use a double `Option`: the outer
/// `None` leaves the field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCouponInput {
    pub code: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub min_order_value: Option<Decimal>,
    pub max_discount: Option<Option<Decimal>>,
    pub usage_limit: Option<Option<i32>>,
    pub one_time_per_user: Option<bool>,
    pub auto_apply: Option<bool>,
    pub is_active: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// A manual code that passed validation, together with the discount it
/// yields on the quoted subtotal.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedCoupon {
    pub coupon: coupon::Model,
    pub discount_amount: Decimal,
}

/// Per-coupon redemption aggregates for the admin surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CouponStats {
    pub total_discount_given: Decimal,
    pub redemption_count: u64,
    pub auto_uses: u64,
    pub manual_uses: u64,
}

#[derive(Debug, Serialize)]
pub struct CouponWithStats {
    #[serde(flatten)]
    pub coupon: coupon::Model,
    pub stats: CouponStats,
    pub is_expired: bool,
}

#[derive(Debug, Serialize)]
pub struct CouponDetails {
    #[serde(flatten)]
    pub coupon: coupon::Model,
    pub stats: CouponStats,
    pub usage_history: Vec<coupon_usage::Model>,
}

/// Service for coupon administration, manual-code validation, and
/// auto-apply selection.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
    ledger: Arc<UsageLedgerService>,
    event_sender: Option<Arc<EventSender>>,
}

impl CouponService {
    pub fn new(
        db: Arc<DbPool>,
        ledger: Arc<UsageLedgerService>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            ledger,
            event_sender,
        }
    }

    /// Creates a coupon. Codes are trimmed and upper-cased before the
    /// uniqueness check, so lookups are case-insensitive by construction.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let code = normalize_code(&input.code);
        validate_discount_fields(input.discount_type, input.discount_value, input.max_discount)?;
        if input.min_order_value < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Minimum order value cannot be negative".to_string(),
            ));
        }
        if let Some(limit) = input.usage_limit {
            if limit <= 0 {
                return Err(ServiceError::ValidationError(
                    "Usage limit must be positive".to_string(),
                ));
            }
        }

        let existing = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::InvalidOperation(
                "Coupon code already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            min_order_value: Set(input.min_order_value),
            max_discount: Set(input.max_discount),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            one_time_per_user: Set(input.one_time_per_user),
            auto_apply: Set(input.auto_apply),
            is_active: Set(input.is_active),
            is_archived: Set(false),
            expires_at: Set(input.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&*self.db).await?;

        info!(coupon_id = %created.id, code = %code, "Coupon created");
        self.emit(Event::CouponCreated(created.id)).await;
        Ok(created)
    }

    /// Updates coupon fields. `used_count` is deliberately untouchable here;
    /// only the usage ledger increments it.
    #[instrument(skip(self, input), fields(coupon_id = %coupon_id))]
    pub async fn update_coupon(
        &self,
        coupon_id: Uuid,
        input: UpdateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        let existing = Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        let discount_type = input.discount_type.unwrap_or(existing.discount_type);
        let discount_value = input.discount_value.unwrap_or(existing.discount_value);
        let max_discount = input.max_discount.unwrap_or(existing.max_discount);
        validate_discount_fields(discount_type, discount_value, max_discount)?;

        if let Some(min) = input.min_order_value {
            if min < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Minimum order value cannot be negative".to_string(),
                ));
            }
        }
        if let Some(Some(limit)) = input.usage_limit {
            if limit <= 0 {
                return Err(ServiceError::ValidationError(
                    "Usage limit must be positive".to_string(),
                ));
            }
        }

        let mut active: coupon::ActiveModel = existing.clone().into();

        if let Some(ref new_code) = input.code {
            let code = normalize_code(new_code);
            let conflict = Coupon::find()
                .filter(coupon::Column::Code.eq(code.clone()))
                .filter(coupon::Column::Id.ne(coupon_id))
                .one(&*self.db)
                .await?;
            if conflict.is_some() {
                return Err(ServiceError::InvalidOperation(
                    "Coupon code already exists".to_string(),
                ));
            }
            active.code = Set(code);
        }

        active.discount_type = Set(discount_type);
        active.discount_value = Set(discount_value);
        if let Some(min) = input.min_order_value {
            active.min_order_value = Set(min);
        }
        active.max_discount = Set(max_discount);
        if let Some(limit) = input.usage_limit {
            active.usage_limit = Set(limit);
        }
        if let Some(once) = input.one_time_per_user {
            active.one_time_per_user = Set(once);
        }
        if let Some(auto) = input.auto_apply {
            active.auto_apply = Set(auto);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(expires_at) = input.expires_at {
            active.expires_at = Set(expires_at);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!(coupon_id = %coupon_id, "Coupon updated");
        self.emit(Event::CouponUpdated(coupon_id)).await;
        Ok(updated)
    }

    /// Flips the active flag.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn toggle_coupon(&self, coupon_id: Uuid) -> Result<coupon::Model, ServiceError> {
        let existing = Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        let new_state = !existing.is_active;
        let mut active: coupon::ActiveModel = existing.into();
        active.is_active = Set(new_state);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(coupon_id = %coupon_id, is_active = new_state, "Coupon toggled");
        self.emit(Event::CouponUpdated(coupon_id)).await;
        Ok(updated)
    }

    /// Soft-deletes a coupon. Usage history is retained for reporting; the
    /// archived coupon evaluates as inactive everywhere.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn archive_coupon(&self, coupon_id: Uuid) -> Result<coupon::Model, ServiceError> {
        let existing = Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        let mut active: coupon::ActiveModel = existing.into();
        active.is_archived = Set(true);
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let archived = active.update(&*self.db).await?;

        info!(coupon_id = %coupon_id, code = %archived.code, "Coupon archived");
        self.emit(Event::CouponArchived(coupon_id)).await;
        Ok(archived)
    }

    /// Coupon with aggregates and full usage history, for the admin detail
    /// view.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn get_coupon(&self, coupon_id: Uuid) -> Result<CouponDetails, ServiceError> {
        let model = Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        let usage_history = self.ledger.usages_for_coupon(coupon_id).await?;
        let stats = aggregate_stats(&usage_history);

        Ok(CouponDetails {
            coupon: model,
            stats,
            usage_history,
        })
    }

    /// All coupons with redemption aggregates, newest first.
    #[instrument(skip(self))]
    pub async fn list_coupons(
        &self,
        include_archived: bool,
    ) -> Result<Vec<CouponWithStats>, ServiceError> {
        let mut query = Coupon::find().order_by_desc(coupon::Column::CreatedAt);
        if !include_archived {
            query = query.filter(coupon::Column::IsArchived.eq(false));
        }
        let coupons = query.all(&*self.db).await?;

        let ids: Vec<Uuid> = coupons.iter().map(|c| c.id).collect();
        let usages = self.ledger.usages_for_coupons(&ids).await?;

        let mut by_coupon: HashMap<Uuid, Vec<&coupon_usage::Model>> = HashMap::new();
        for usage in &usages {
            by_coupon.entry(usage.coupon_id).or_default().push(usage);
        }

        let now = Utc::now();
        Ok(coupons
            .into_iter()
            .map(|c| {
                let stats = by_coupon
                    .get(&c.id)
                    .map(|rows| aggregate_stats(rows.iter().copied()))
                    .unwrap_or_default();
                let is_expired = c.expires_at.map(|at| now > at).unwrap_or(false);
                CouponWithStats {
                    coupon: c,
                    stats,
                    is_expired,
                }
            })
            .collect())
    }

    /// Validates a manually entered code against the pre-discount subtotal.
    /// Unknown codes are `NotFound`; known-but-ineligible codes carry the
    /// specific [`IneligibilityReason`].
    #[instrument(skip(self), fields(user_id = %user_id, code = %code))]
    pub async fn validate_code(
        &self,
        user_id: Uuid,
        code: &str,
        subtotal: Decimal,
    ) -> Result<ValidatedCoupon, ServiceError> {
        let code = normalize_code(code);
        let model = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invalid coupon code".to_string()))?;

        let already_used = self.ledger.has_used(model.id, user_id).await?;
        evaluate(&model, already_used, Utc::now(), subtotal).map_err(|reason| {
            ServiceError::IneligibleCoupon {
                code: code.clone(),
                reason,
            }
        })?;

        let discount_amount = calculate_discount(&model, subtotal);
        Ok(ValidatedCoupon {
            coupon: model,
            discount_amount,
        })
    }

    /// Selects the best eligible auto-apply coupon for a user and subtotal.
    /// Candidates are loaded by code ascending so equal-discount ties
    /// resolve deterministically. `None` is a normal outcome, not an error.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn best_auto_apply(
        &self,
        user_id: Uuid,
        subtotal: Decimal,
    ) -> Result<Option<ValidatedCoupon>, ServiceError> {
        if subtotal <= Decimal::ZERO {
            return Ok(None);
        }

        // Cheap pre-filter; the pure evaluation re-checks everything.
        let candidates = Coupon::find()
            .filter(coupon::Column::AutoApply.eq(true))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::IsArchived.eq(false))
            .filter(coupon::Column::MinOrderValue.lte(subtotal))
            .order_by_asc(coupon::Column::Code)
            .all(&*self.db)
            .await?;

        if candidates.is_empty() {
            return Ok(None);
        }

        let ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
        let used = self.ledger.used_coupons(user_id, &ids).await?;

        let scored: Vec<(coupon::Model, bool)> = candidates
            .into_iter()
            .map(|c| {
                let already_used = used.contains(&c.id);
                (c, already_used)
            })
            .collect();

        let best = select_best(&scored, Utc::now(), subtotal)
            .map(|(model, discount_amount)| ValidatedCoupon {
                coupon: model.clone(),
                discount_amount,
            });

        if let Some(ref chosen) = best {
            info!(
                code = %chosen.coupon.code,
                discount = %chosen.discount_amount,
                "Auto-apply coupon selected"
            );
        }
        Ok(best)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send coupon event");
            }
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn validate_discount_fields(
    discount_type: DiscountType,
    discount_value: Decimal,
    max_discount: Option<Decimal>,
) -> Result<(), ServiceError> {
    if discount_value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Discount value cannot be negative".to_string(),
        ));
    }
    if discount_type == DiscountType::Percentage && discount_value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Percentage discount must be between 0 and 100".to_string(),
        ));
    }
    if let Some(cap) = max_discount {
        if cap < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Maximum discount cannot be negative".to_string(),
            ));
        }
    }
    Ok(())
}

fn aggregate_stats<'a, I>(usages: I) -> CouponStats
where
    I: IntoIterator<Item = &'a coupon_usage::Model>,
{
    let mut stats = CouponStats::default();
    for usage in usages {
        stats.total_discount_given += usage.discount_amount;
        stats.redemption_count += 1;
        match usage.applied_type {
            AppliedType::Auto => stats.auto_uses += 1,
            AppliedType::Manual => stats.manual_uses += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn percentage_coupon(code: &str, value: Decimal, max_discount: Option<Decimal>) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: value,
            min_order_value: Decimal::ZERO,
            max_discount,
            usage_limit: None,
            used_count: 0,
            one_time_per_user: true,
            auto_apply: false,
            is_active: true,
            is_archived: false,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn fixed_coupon(code: &str, value: Decimal) -> coupon::Model {
        coupon::Model {
            discount_type: DiscountType::Fixed,
            ..percentage_coupon(code, value, None)
        }
    }

    #[test]
    fn percentage_discount_within_cap() {
        let festive = percentage_coupon("FESTIVE10", dec!(10), Some(dec!(200)));
        assert_eq!(calculate_discount(&festive, dec!(1000)), dec!(100));
    }

    #[test]
    fn percentage_discount_clamped_to_cap() {
        let festive = percentage_coupon("FESTIVE10", dec!(10), Some(dec!(200)));
        // 10% of 3000 would be 300.
        assert_eq!(calculate_discount(&festive, dec!(3000)), dec!(200));
    }

    #[test]
    fn fixed_discount_clamped_to_subtotal() {
        let flat = fixed_coupon("FLAT200", dec!(200));
        assert_eq!(calculate_discount(&flat, dec!(150)), dec!(150));
        assert_eq!(calculate_discount(&flat, dec!(500)), dec!(200));
    }

    #[test]
    fn discount_rounds_half_up() {
        let odd = percentage_coupon("ODD", dec!(7.5), None);
        // 7.5% of 333 = 24.975 -> 24.98
        assert_eq!(calculate_discount(&odd, dec!(333)), dec!(24.98));
    }

    #[test]
    fn eligibility_checks_short_circuit_in_order() {
        let now = Utc::now();
        let mut c = percentage_coupon("ORDERED", dec!(10), None);
        c.is_active = false;
        c.expires_at = Some(now - Duration::days(1));
        c.usage_limit = Some(1);
        c.used_count = 1;

        // Inactive wins over everything else.
        assert_eq!(
            evaluate(&c, true, now, Decimal::ZERO),
            Err(IneligibilityReason::NotActive)
        );

        c.is_active = true;
        assert_eq!(
            evaluate(&c, true, now, Decimal::ZERO),
            Err(IneligibilityReason::Expired)
        );

        c.expires_at = None;
        assert_eq!(
            evaluate(&c, true, now, Decimal::ZERO),
            Err(IneligibilityReason::UsageLimitReached)
        );

        c.used_count = 0;
        assert_eq!(
            evaluate(&c, true, now, Decimal::ZERO),
            Err(IneligibilityReason::AlreadyUsed)
        );
    }

    #[test]
    fn archived_coupon_is_not_active() {
        let mut c = percentage_coupon("GONE", dec!(10), None);
        c.is_archived = true;
        assert_eq!(
            evaluate(&c, false, Utc::now(), dec!(1000)),
            Err(IneligibilityReason::NotActive)
        );
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let mut c = percentage_coupon("EDGE", dec!(10), None);
        c.expires_at = Some(now);
        assert_eq!(evaluate(&c, false, now, dec!(1000)), Ok(()));
        assert_eq!(
            evaluate(&c, false, now + Duration::seconds(1), dec!(1000)),
            Err(IneligibilityReason::Expired)
        );
    }

    #[test]
    fn minimum_order_reason_carries_the_minimum() {
        let mut c = percentage_coupon("MIN500", dec!(10), None);
        c.min_order_value = dec!(500);
        assert_eq!(
            evaluate(&c, false, Utc::now(), dec!(300)),
            Err(IneligibilityReason::MinimumOrderNotMet {
                minimum: dec!(500)
            })
        );
        assert_eq!(evaluate(&c, false, Utc::now(), dec!(500)), Ok(()));
    }

    #[test]
    fn select_best_prefers_highest_discount() {
        let now = Utc::now();
        let mut small = percentage_coupon("SMALL5", dec!(5), None);
        small.auto_apply = true;
        let mut big = percentage_coupon("BIG15", dec!(15), None);
        big.auto_apply = true;

        let candidates = vec![(big, false), (small, false)];
        let (chosen, discount) = select_best(&candidates, now, dec!(1000)).unwrap();
        assert_eq!(chosen.code, "BIG15");
        assert_eq!(discount, dec!(150));
    }

    #[test]
    fn select_best_ties_keep_code_order() {
        let now = Utc::now();
        let mut alpha = percentage_coupon("ALPHA10", dec!(10), None);
        alpha.auto_apply = true;
        let mut beta = percentage_coupon("BETA10", dec!(10), None);
        beta.auto_apply = true;

        // Candidates arrive sorted by code ascending.
        let candidates = vec![(alpha, false), (beta, false)];
        let (chosen, _) = select_best(&candidates, now, dec!(1000)).unwrap();
        assert_eq!(chosen.code, "ALPHA10");
    }

    #[test]
    fn select_best_skips_ineligible_and_used() {
        let now = Utc::now();
        let mut used = percentage_coupon("AUSED20", dec!(20), None);
        used.auto_apply = true;
        let mut inactive = percentage_coupon("BOFF30", dec!(30), None);
        inactive.auto_apply = true;
        inactive.is_active = false;
        let mut ok = percentage_coupon("COK5", dec!(5), None);
        ok.auto_apply = true;

        let candidates = vec![(used, true), (inactive, false), (ok, false)];
        let (chosen, discount) = select_best(&candidates, now, dec!(1000)).unwrap();
        assert_eq!(chosen.code, "COK5");
        assert_eq!(discount, dec!(50));
    }

    #[test]
    fn select_best_none_for_zero_or_negative_subtotal() {
        let now = Utc::now();
        let mut c = percentage_coupon("AUTO10", dec!(10), None);
        c.auto_apply = true;
        let candidates = vec![(c, false)];
        assert!(select_best(&candidates, now, Decimal::ZERO).is_none());
        assert!(select_best(&candidates, now, dec!(-100)).is_none());
    }

    #[test]
    fn discount_field_validation() {
        assert!(validate_discount_fields(DiscountType::Fixed, dec!(-5), None).is_err());
        assert!(validate_discount_fields(DiscountType::Percentage, dec!(150), None).is_err());
        assert!(validate_discount_fields(DiscountType::Percentage, dec!(10), Some(dec!(-1))).is_err());
        assert!(validate_discount_fields(DiscountType::Percentage, dec!(10), Some(dec!(0))).is_ok());
        assert!(validate_discount_fields(DiscountType::Fixed, dec!(200), Some(dec!(100))).is_ok());
    }

    #[test]
    fn manual_only_coupons_ignored_by_selector() {
        let now = Utc::now();
        let manual = percentage_coupon("MANUAL25", dec!(25), None);
        let candidates = vec![(manual, false)];
        assert!(select_best(&candidates, now, dec!(1000)).is_none());
    }
}
