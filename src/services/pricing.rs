use crate::{
    entities::coupon,
    entities::coupon_usage::AppliedType,
    entities::shipping_tier,
    errors::ServiceError,
    services::coupons::{round_currency, CouponService},
    services::settings::SettingsService,
    services::shipping_tiers::ShippingTierService,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One order line as submitted by the caller. `subtotal` is re-derived
/// server-side; a mismatch rejects the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

/// How the order's discount was resolved.
#[derive(Debug, Clone)]
pub enum DiscountResolution {
    None,
    Applied {
        coupon: coupon::Model,
        amount: Decimal,
        applied_type: AppliedType,
    },
}

impl DiscountResolution {
    pub fn amount(&self) -> Decimal {
        match self {
            Self::None => Decimal::ZERO,
            Self::Applied { amount, .. } => *amount,
        }
    }

    pub fn coupon_code(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Applied { coupon, .. } => Some(&coupon.code),
        }
    }
}

/// Customer-facing quote for a resolved discount, used before the order is
/// committed.
#[derive(Debug, Clone, Serialize)]
pub struct DiscountQuote {
    pub code: String,
    pub applied_type: AppliedType,
    pub amount: Decimal,
}

// The pricing pipeline is a chain of stage types. Each stage only exists as
// the output of the previous one, so skipping or reordering a step does not
// compile.

/// Stage 1: verified cart subtotal.
#[derive(Debug, Clone, PartialEq)]
pub struct CartTotals {
    pub subtotal: Decimal,
}

impl CartTotals {
    /// Derives the subtotal from line items, rejecting negative prices,
    /// zero quantities, and client-supplied subtotals that disagree with
    /// `unit_price * quantity`.
    pub fn from_items(items: &[LineItem]) -> Result<Self, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }

        let mut subtotal = Decimal::ZERO;
        for item in items {
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Negative unit price for product {}",
                    item.product_id
                )));
            }
            if item.quantity == 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Zero quantity for product {}",
                    item.product_id
                )));
            }
            let expected = item.unit_price * Decimal::from(item.quantity);
            if item.subtotal != expected {
                return Err(ServiceError::ValidationError(format!(
                    "Line subtotal mismatch for product {}: expected {}, got {}",
                    item.product_id, expected, item.subtotal
                )));
            }
            subtotal += expected;
        }

        Ok(Self {
            subtotal: round_currency(subtotal),
        })
    }

    /// Stage 2: apply the resolved discount, clamping at zero.
    pub fn apply_discount(self, resolution: &DiscountResolution) -> DiscountedTotals {
        let discount = resolution.amount();
        let discounted = (self.subtotal - discount).max(Decimal::ZERO);
        DiscountedTotals {
            subtotal: self.subtotal,
            coupon_code: resolution.coupon_code().map(str::to_owned),
            coupon_discount: discount,
            discounted_subtotal: discounted,
        }
    }
}

/// Stage 2 output: subtotal after the discount.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountedTotals {
    pub subtotal: Decimal,
    pub coupon_code: Option<String>,
    pub coupon_discount: Decimal,
    pub discounted_subtotal: Decimal,
}

impl DiscountedTotals {
    /// Stage 3: GST is computed on the discounted subtotal, not the
    /// original one.
    pub fn apply_gst(self, gst_percentage: Decimal) -> TaxedTotals {
        let gst_amount =
            round_currency(self.discounted_subtotal * gst_percentage / Decimal::ONE_HUNDRED);
        TaxedTotals {
            subtotal: self.subtotal,
            coupon_code: self.coupon_code,
            coupon_discount: self.coupon_discount,
            discounted_subtotal: self.discounted_subtotal,
            gst_percentage,
            gst_amount,
        }
    }
}

/// Stage 3 output: discounted subtotal plus tax.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxedTotals {
    pub subtotal: Decimal,
    pub coupon_code: Option<String>,
    pub coupon_discount: Decimal,
    pub discounted_subtotal: Decimal,
    pub gst_percentage: Decimal,
    pub gst_amount: Decimal,
}

impl TaxedTotals {
    /// Stage 4: add the shipping charge of the matched tier, or zero when no
    /// tier covers the amount.
    pub fn apply_shipping(self, tier: Option<&shipping_tier::Model>) -> OrderPricingBreakdown {
        let shipping_charge = tier.map_or(Decimal::ZERO, |t| t.shipping_charge);
        let total =
            round_currency(self.discounted_subtotal + self.gst_amount + shipping_charge);
        OrderPricingBreakdown {
            subtotal: self.subtotal,
            coupon_code: self.coupon_code,
            coupon_discount: self.coupon_discount,
            discounted_subtotal: self.discounted_subtotal,
            gst_percentage: self.gst_percentage,
            gst_amount: self.gst_amount,
            shipping_charge,
            tier_id: tier.map(|t| t.id),
            total,
        }
    }
}

/// Final priced order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPricingBreakdown {
    pub subtotal: Decimal,
    pub coupon_code: Option<String>,
    pub coupon_discount: Decimal,
    pub discounted_subtotal: Decimal,
    pub gst_percentage: Decimal,
    pub gst_amount: Decimal,
    pub shipping_charge: Decimal,
    pub tier_id: Option<Uuid>,
    pub total: Decimal,
}

/// Drives the full subtotal -> discount -> GST -> shipping -> total
/// pipeline, delegating each concern to the owning service.
#[derive(Clone)]
pub struct PricingService {
    coupons: Arc<CouponService>,
    tiers: Arc<ShippingTierService>,
    settings: Arc<SettingsService>,
}

impl PricingService {
    pub fn new(
        coupons: Arc<CouponService>,
        tiers: Arc<ShippingTierService>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            coupons,
            tiers,
            settings,
        }
    }

    /// Resolves which discount, if any, applies to the order.
    ///
    /// A manual code always wins over auto-apply, even when an auto coupon
    /// would discount more; the customer asked for it by name. An ineligible
    /// manual code is an error, never a silent fallback to auto-apply.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn resolve_discount(
        &self,
        user_id: Uuid,
        subtotal: Decimal,
        manual_code: Option<&str>,
    ) -> Result<DiscountResolution, ServiceError> {
        let manual_code = manual_code.map(str::trim).filter(|c| !c.is_empty());

        if let Some(code) = manual_code {
            let validated = self.coupons.validate_code(user_id, code, subtotal).await?;
            return Ok(DiscountResolution::Applied {
                coupon: validated.coupon,
                amount: validated.discount_amount,
                applied_type: AppliedType::Manual,
            });
        }

        match self.coupons.best_auto_apply(user_id, subtotal).await? {
            Some(validated) => Ok(DiscountResolution::Applied {
                coupon: validated.coupon,
                amount: validated.discount_amount,
                applied_type: AppliedType::Auto,
            }),
            None => Ok(DiscountResolution::None),
        }
    }

    /// Quote form of [`resolve_discount`](Self::resolve_discount) for
    /// pre-checkout display.
    pub async fn quote_discount(
        &self,
        user_id: Uuid,
        subtotal: Decimal,
        manual_code: Option<&str>,
    ) -> Result<Option<DiscountQuote>, ServiceError> {
        match self.resolve_discount(user_id, subtotal, manual_code).await? {
            DiscountResolution::None => Ok(None),
            DiscountResolution::Applied {
                coupon,
                amount,
                applied_type,
            } => Ok(Some(DiscountQuote {
                code: coupon.code,
                applied_type,
                amount,
            })),
        }
    }

    /// Prices an order end to end. Shipping is looked up on the discounted
    /// subtotal, so a discount can move the order into a cheaper tier.
    #[instrument(skip(self, items), fields(user_id = %user_id, item_count = items.len()))]
    pub async fn price_order(
        &self,
        user_id: Uuid,
        items: &[LineItem],
        manual_code: Option<&str>,
    ) -> Result<(OrderPricingBreakdown, DiscountResolution), ServiceError> {
        let cart = CartTotals::from_items(items)?;
        let resolution = self
            .resolve_discount(user_id, cart.subtotal, manual_code)
            .await?;

        let discounted = cart.apply_discount(&resolution);
        let gst_percentage = self.settings.gst_percentage().await?;
        let taxed = discounted.apply_gst(gst_percentage);

        let tier = self
            .tiers
            .find_active_tier(taxed.discounted_subtotal)
            .await?;
        let breakdown = taxed.apply_shipping(tier.as_ref());

        info!(
            subtotal = %breakdown.subtotal,
            discount = %breakdown.coupon_discount,
            gst = %breakdown.gst_amount,
            shipping = %breakdown.shipping_charge,
            total = %breakdown.total,
            "Order priced"
        );
        Ok((breakdown, resolution))
    }

    /// Re-computes a breakdown from a verified subtotal and an
    /// already-resolved discount amount, for callers re-pricing a stored
    /// order without re-running coupon resolution.
    pub async fn compute_order_total(
        &self,
        subtotal: Decimal,
        discount_amount: Decimal,
    ) -> Result<OrderPricingBreakdown, ServiceError> {
        if subtotal < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Subtotal cannot be negative".to_string(),
            ));
        }
        if discount_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount amount cannot be negative".to_string(),
            ));
        }

        let discounted = DiscountedTotals {
            subtotal,
            coupon_code: None,
            coupon_discount: discount_amount,
            discounted_subtotal: (subtotal - discount_amount).max(Decimal::ZERO),
        };
        let gst_percentage = self.settings.gst_percentage().await?;
        let taxed = discounted.apply_gst(gst_percentage);
        let tier = self
            .tiers
            .find_active_tier(taxed.discounted_subtotal)
            .await?;
        Ok(taxed.apply_shipping(tier.as_ref()))
    }

    /// Display-only shipping quote for an amount, with the matched tier's
    /// range label.
    pub async fn lookup_shipping_tier(
        &self,
        amount: Decimal,
    ) -> Result<crate::services::shipping_tiers::ShippingQuote, ServiceError> {
        self.tiers.calculate(amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::coupon::DiscountType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn item(price: Decimal, qty: u32) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            unit_price: price,
            quantity: qty,
            subtotal: price * Decimal::from(qty),
        }
    }

    fn fixed_coupon(code: &str, value: Decimal) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: value,
            min_order_value: Decimal::ZERO,
            max_discount: None,
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

    fn tier(min: Decimal, max: Option<Decimal>, charge: Decimal) -> shipping_tier::Model {
        let now = Utc::now();
        shipping_tier::Model {
            id: Uuid::new_v4(),
            min_amount: min,
            max_amount: max,
            shipping_charge: charge,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn gst_applies_to_the_discounted_subtotal() {
        let cart = CartTotals::from_items(&[item(dec!(500), 2)]).unwrap();
        assert_eq!(cart.subtotal, dec!(1000));

        let coupon = fixed_coupon("SAVE100", dec!(100));
        let resolution = DiscountResolution::Applied {
            amount: dec!(100),
            applied_type: AppliedType::Manual,
            coupon,
        };

        let taxed = cart.apply_discount(&resolution).apply_gst(dec!(18));
        assert_eq!(taxed.discounted_subtotal, dec!(900));
        // 18% of 900, not of 1000.
        assert_eq!(taxed.gst_amount, dec!(162.00));
    }

    #[test]
    fn discount_clamps_at_zero() {
        let cart = CartTotals::from_items(&[item(dec!(50), 1)]).unwrap();
        let coupon = fixed_coupon("BIG", dec!(200));
        let resolution = DiscountResolution::Applied {
            amount: dec!(200),
            applied_type: AppliedType::Auto,
            coupon,
        };

        let discounted = cart.apply_discount(&resolution);
        assert_eq!(discounted.discounted_subtotal, dec!(0));

        let taxed = discounted.apply_gst(dec!(18));
        assert_eq!(taxed.gst_amount, dec!(0.00));
    }

    #[test]
    fn total_is_the_sum_of_parts() {
        let cart = CartTotals::from_items(&[item(dec!(300), 2)]).unwrap();
        let breakdown = cart
            .apply_discount(&DiscountResolution::None)
            .apply_gst(dec!(18))
            .apply_shipping(Some(&tier(dec!(500), Some(dec!(999)), dec!(50))));

        assert_eq!(breakdown.subtotal, dec!(600));
        assert_eq!(breakdown.gst_amount, dec!(108.00));
        assert_eq!(breakdown.shipping_charge, dec!(50));
        assert_eq!(
            breakdown.total,
            breakdown.discounted_subtotal + breakdown.gst_amount + breakdown.shipping_charge
        );
    }

    #[test]
    fn missing_tier_means_free_shipping() {
        let cart = CartTotals::from_items(&[item(dec!(100), 1)]).unwrap();
        let breakdown = cart
            .apply_discount(&DiscountResolution::None)
            .apply_gst(dec!(18))
            .apply_shipping(None);

        assert_eq!(breakdown.shipping_charge, dec!(0));
        assert_eq!(breakdown.tier_id, None);
    }

    #[test]
    fn tampered_line_subtotal_is_rejected() {
        let mut bad = item(dec!(100), 3);
        bad.subtotal = dec!(150);
        let err = CartTotals::from_items(&[bad]).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(matches!(
            CartTotals::from_items(&[]),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn negative_price_and_zero_quantity_are_rejected() {
        let mut neg = item(dec!(10), 1);
        neg.unit_price = dec!(-10);
        neg.subtotal = dec!(-10);
        assert!(CartTotals::from_items(&[neg]).is_err());

        let mut zero = item(dec!(10), 1);
        zero.quantity = 0;
        zero.subtotal = dec!(0);
        assert!(CartTotals::from_items(&[zero]).is_err());
    }

    #[test]
    fn breakdown_serializes_with_stable_field_names() {
        let cart = CartTotals::from_items(&[item(dec!(500), 2)]).unwrap();
        let resolution = DiscountResolution::Applied {
            amount: dec!(100),
            applied_type: AppliedType::Manual,
            coupon: fixed_coupon("SAVE100", dec!(100)),
        };
        let breakdown = cart
            .apply_discount(&resolution)
            .apply_gst(dec!(18))
            .apply_shipping(None);

        let value = serde_json::to_value(&breakdown).expect("breakdown should serialize");
        assert_eq!(value["coupon_code"], serde_json::json!("SAVE100"));
        assert_eq!(value["coupon_discount"], serde_json::json!("100"));
        assert_eq!(value["gst_amount"], serde_json::json!("162.00"));
        assert_eq!(value["total"], serde_json::json!("1062.00"));
        assert!(value["tier_id"].is_null());
    }

    #[test]
    fn gst_rounds_half_away_from_zero() {
        // 333 * 18% = 59.94; 335 * 5.5% = 18.425 -> 18.43.
        let cart = CartTotals::from_items(&[item(dec!(335), 1)]).unwrap();
        let taxed = cart
            .apply_discount(&DiscountResolution::None)
            .apply_gst(dec!(5.5));
        assert_eq!(taxed.gst_amount, dec!(18.43));
    }
}
