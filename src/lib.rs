//! Order pricing and discount eligibility engine.
//!
//! Coupon eligibility and discount calculation, auto-apply selection,
//! tiered shipping, GST, and the fixed pricing pipeline that combines them
//! into an order total, backed by an append-only redemption ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use std::sync::Arc;

/// Service bundle wired once at startup and shared by reference.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: Arc<services::UsageLedgerService>,
    pub coupons: Arc<services::CouponService>,
    pub shipping_tiers: Arc<services::ShippingTierService>,
    pub settings: Arc<services::SettingsService>,
    pub pricing: Arc<services::PricingService>,
}

/// Application state: pool, config, and the wired service graph.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub services: AppServices,
}

impl AppState {
    /// Wires the service graph over a shared pool. The ledger feeds the
    /// coupon service, which together with tiers and settings feeds pricing.
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Self {
        let ledger = Arc::new(services::UsageLedgerService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let coupons = Arc::new(services::CouponService::new(
            db.clone(),
            ledger.clone(),
            event_sender.clone(),
        ));
        let shipping_tiers = Arc::new(services::ShippingTierService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let settings = Arc::new(services::SettingsService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let pricing = Arc::new(services::PricingService::new(
            coupons.clone(),
            shipping_tiers.clone(),
            settings.clone(),
        ));

        Self {
            db,
            config,
            event_sender,
            services: AppServices {
                ledger,
                coupons,
                shipping_tiers,
                settings,
                pricing,
            },
        }
    }
}
