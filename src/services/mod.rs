pub mod coupons;
pub mod pricing;
pub mod settings;
pub mod shipping_tiers;
pub mod usage_ledger;

pub use coupons::CouponService;
pub use pricing::PricingService;
pub use settings::SettingsService;
pub use shipping_tiers::ShippingTierService;
pub use usage_ledger::UsageLedgerService;
