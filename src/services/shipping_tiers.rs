use crate::{
    db::DbPool,
    entities::shipping_tier::{self, Entity as ShippingTier},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// True when `amount` falls inside the tier's range: `min_amount` inclusive,
/// `max_amount` inclusive when present, unbounded above when absent.
pub fn tier_matches(tier: &shipping_tier::Model, amount: Decimal) -> bool {
    amount >= tier.min_amount && tier.max_amount.map_or(true, |max| amount <= max)
}

/// Point lookup over active tiers. Under the non-overlap invariant at most
/// one tier can match, so the first hit is the unique one.
pub fn find_tier(
    active_tiers: &[shipping_tier::Model],
    amount: Decimal,
) -> Option<&shipping_tier::Model> {
    active_tiers.iter().find(|tier| tier_matches(tier, amount))
}

/// Closed-interval overlap with an unbounded max treated as +infinity:
/// `[a_min, a_max]` and `[b_min, b_max]` overlap iff
/// `a_min <= b_max && b_min <= a_max`.
pub fn ranges_overlap(
    a_min: Decimal,
    a_max: Option<Decimal>,
    b_min: Decimal,
    b_max: Option<Decimal>,
) -> bool {
    let a_max = a_max.unwrap_or(Decimal::MAX);
    let b_max = b_max.unwrap_or(Decimal::MAX);
    a_min <= b_max && b_min <= a_max
}

/// Checks a candidate range against existing active tiers, skipping
/// `exclude_id` (the tier being edited). Returns the first conflicting tier.
pub fn validate_no_overlap<'a>(
    min_amount: Decimal,
    max_amount: Option<Decimal>,
    existing_active: &'a [shipping_tier::Model],
    exclude_id: Option<Uuid>,
) -> Result<(), &'a shipping_tier::Model> {
    for tier in existing_active {
        if Some(tier.id) == exclude_id {
            continue;
        }
        if ranges_overlap(min_amount, max_amount, tier.min_amount, tier.max_amount) {
            return Err(tier);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTierInput {
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub shipping_charge: Decimal,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTierInput {
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Option<Decimal>>,
    pub shipping_charge: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Shipping quote for a given amount. `tier_id` is `None` when no active
/// tier covers the amount; the charge then degrades to zero.
#[derive(Debug, Clone, Serialize)]
pub struct ShippingQuote {
    pub amount: Decimal,
    pub shipping_charge: Decimal,
    pub tier_id: Option<Uuid>,
    pub tier_range: Option<String>,
}

/// Service for the shipping tier table: point lookup for pricing, and the
/// admin write surface guarded by the range-overlap invariant.
#[derive(Clone)]
pub struct ShippingTierService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ShippingTierService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a tier. The overlap check runs only when the tier is created
    /// active, inside the same transaction as the insert so concurrent admin
    /// writes cannot slip an overlapping pair through.
    #[instrument(skip(self, input))]
    pub async fn create_tier(
        &self,
        input: CreateTierInput,
    ) -> Result<shipping_tier::Model, ServiceError> {
        validate_bounds(input.min_amount, input.max_amount, input.shipping_charge)?;

        let txn = self.db.begin().await?;

        if input.is_active {
            let active = load_active(&txn).await?;
            if let Err(conflict) =
                validate_no_overlap(input.min_amount, input.max_amount, &active, None)
            {
                return Err(overlap_error(input.min_amount, input.max_amount, conflict));
            }
        }

        let now = Utc::now();
        let model = shipping_tier::ActiveModel {
            id: Set(Uuid::new_v4()),
            min_amount: Set(input.min_amount),
            max_amount: Set(input.max_amount),
            shipping_charge: Set(input.shipping_charge),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&txn).await?;
        txn.commit().await?;

        info!(
            tier_id = %created.id,
            range = %created.range_label(),
            charge = %created.shipping_charge,
            "Shipping tier created"
        );
        self.emit(Event::ShippingTierCreated(created.id)).await;
        Ok(created)
    }

    /// Updates a tier. The overlap check fires when the resulting tier is
    /// active and either its range changed or it is being activated; editing
    /// an inactive tier stays unchecked so operators can stage changes.
    #[instrument(skip(self, input), fields(tier_id = %tier_id))]
    pub async fn update_tier(
        &self,
        tier_id: Uuid,
        input: UpdateTierInput,
    ) -> Result<shipping_tier::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let existing = ShippingTier::find_by_id(tier_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shipping tier not found".to_string()))?;

        let new_min = input.min_amount.unwrap_or(existing.min_amount);
        let new_max = input.max_amount.unwrap_or(existing.max_amount);
        let new_charge = input.shipping_charge.unwrap_or(existing.shipping_charge);
        let new_active = input.is_active.unwrap_or(existing.is_active);
        validate_bounds(new_min, new_max, new_charge)?;

        let range_changed = new_min != existing.min_amount || new_max != existing.max_amount;
        let activating = new_active && !existing.is_active;
        if new_active && (range_changed || activating) {
            let active = load_active(&txn).await?;
            if let Err(conflict) = validate_no_overlap(new_min, new_max, &active, Some(tier_id)) {
                return Err(overlap_error(new_min, new_max, conflict));
            }
        }

        let was_active = existing.is_active;
        let mut active_model: shipping_tier::ActiveModel = existing.into();
        active_model.min_amount = Set(new_min);
        active_model.max_amount = Set(new_max);
        active_model.shipping_charge = Set(new_charge);
        active_model.is_active = Set(new_active);
        active_model.updated_at = Set(Utc::now());
        let updated = active_model.update(&txn).await?;
        txn.commit().await?;

        info!(tier_id = %tier_id, range = %updated.range_label(), "Shipping tier updated");
        self.emit(Event::ShippingTierUpdated(tier_id)).await;
        if new_active != was_active {
            self.emit(if new_active {
                Event::ShippingTierActivated(tier_id)
            } else {
                Event::ShippingTierDeactivated(tier_id)
            })
            .await;
        }
        Ok(updated)
    }

    /// Flips a tier between active and inactive. Activation re-fires the
    /// overlap check against the tiers that are active at that instant.
    #[instrument(skip(self), fields(tier_id = %tier_id))]
    pub async fn toggle_tier(&self, tier_id: Uuid) -> Result<shipping_tier::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let existing = ShippingTier::find_by_id(tier_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shipping tier not found".to_string()))?;

        let new_state = !existing.is_active;
        if new_state {
            let active = load_active(&txn).await?;
            if let Err(conflict) = validate_no_overlap(
                existing.min_amount,
                existing.max_amount,
                &active,
                Some(tier_id),
            ) {
                return Err(overlap_error(
                    existing.min_amount,
                    existing.max_amount,
                    conflict,
                ));
            }
        }

        let mut active_model: shipping_tier::ActiveModel = existing.into();
        active_model.is_active = Set(new_state);
        active_model.updated_at = Set(Utc::now());
        let updated = active_model.update(&txn).await?;
        txn.commit().await?;

        info!(tier_id = %tier_id, is_active = new_state, "Shipping tier toggled");
        self.emit(if new_state {
            Event::ShippingTierActivated(tier_id)
        } else {
            Event::ShippingTierDeactivated(tier_id)
        })
        .await;
        Ok(updated)
    }

    #[instrument(skip(self), fields(tier_id = %tier_id))]
    pub async fn delete_tier(&self, tier_id: Uuid) -> Result<(), ServiceError> {
        let existing = ShippingTier::find_by_id(tier_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shipping tier not found".to_string()))?;

        existing.delete(&*self.db).await?;
        info!(tier_id = %tier_id, "Shipping tier deleted");
        Ok(())
    }

    /// Tiers sorted by lower bound; optionally restricted to active ones.
    #[instrument(skip(self))]
    pub async fn list_tiers(
        &self,
        active_only: bool,
    ) -> Result<Vec<shipping_tier::Model>, ServiceError> {
        let mut query = ShippingTier::find().order_by_asc(shipping_tier::Column::MinAmount);
        if active_only {
            query = query.filter(shipping_tier::Column::IsActive.eq(true));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Finds the active tier covering `amount`, if any.
    pub async fn find_active_tier(
        &self,
        amount: Decimal,
    ) -> Result<Option<shipping_tier::Model>, ServiceError> {
        let active = load_active(&*self.db).await?;
        Ok(find_tier(&active, amount).cloned())
    }

    /// Shipping quote for an amount. A coverage gap is an operator
    /// misconfiguration, not a caller error: it degrades to free shipping
    /// and is logged for visibility.
    #[instrument(skip(self))]
    pub async fn calculate(&self, amount: Decimal) -> Result<ShippingQuote, ServiceError> {
        if amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Amount cannot be negative".to_string(),
            ));
        }

        match self.find_active_tier(amount).await? {
            Some(tier) => Ok(ShippingQuote {
                amount,
                shipping_charge: tier.shipping_charge,
                tier_range: Some(tier.range_label()),
                tier_id: Some(tier.id),
            }),
            None => {
                warn!(amount = %amount, "No shipping tier covers this amount");
                Ok(ShippingQuote {
                    amount,
                    shipping_charge: Decimal::ZERO,
                    tier_id: None,
                    tier_range: None,
                })
            }
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send shipping tier event");
            }
        }
    }
}

async fn load_active<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<shipping_tier::Model>, ServiceError> {
    Ok(ShippingTier::find()
        .filter(shipping_tier::Column::IsActive.eq(true))
        .order_by_asc(shipping_tier::Column::MinAmount)
        .all(conn)
        .await?)
}

fn validate_bounds(
    min_amount: Decimal,
    max_amount: Option<Decimal>,
    shipping_charge: Decimal,
) -> Result<(), ServiceError> {
    if min_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Min amount cannot be negative".to_string(),
        ));
    }
    if let Some(max) = max_amount {
        if max <= min_amount {
            return Err(ServiceError::ValidationError(
                "Max amount must be greater than min amount".to_string(),
            ));
        }
    }
    if shipping_charge < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Shipping charge cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn overlap_error(
    min_amount: Decimal,
    max_amount: Option<Decimal>,
    conflict: &shipping_tier::Model,
) -> ServiceError {
    let candidate = match max_amount {
        Some(max) => format!("{} - {}", min_amount, max),
        None => format!("{}+", min_amount),
    };
    ServiceError::TierOverlap {
        candidate,
        conflict: conflict.range_label(),
        conflict_id: conflict.id,
    }
}
