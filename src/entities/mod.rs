pub mod coupon;
pub mod coupon_usage;
pub mod gst_setting;
pub mod shipping_tier;

pub use coupon::Entity as Coupon;
pub use coupon_usage::Entity as CouponUsage;
pub use gst_setting::Entity as GstSetting;
pub use shipping_tier::Entity as ShippingTier;
