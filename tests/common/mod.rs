use std::sync::Arc;

use chrono::{DateTime, Utc};
use pricing_engine::{
    config::AppConfig,
    db,
    entities::coupon::{self, DiscountType},
    entities::shipping_tier,
    events::{Event, EventSender},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Harness that wires the full service graph over a fresh SQLite database.
pub struct TestApp {
    pub state: AppState,
    _event_rx: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file = format!("/tmp/pricing_engine_test_{}.db", Uuid::new_v4());

        let mut cfg = AppConfig::new(format!("sqlite://{db_file}?mode=rwc"), "test".to_string());
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");

        // Events are buffered but never consumed; a large channel keeps
        // sends from blocking during tests.
        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = Some(Arc::new(EventSender::new(event_tx)));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);

        Self {
            state,
            _event_rx: event_rx,
        }
    }

    /// Inserts a coupon row directly, bypassing the admin surface.
    pub async fn seed_coupon(&self, builder: CouponBuilder) -> coupon::Model {
        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(builder.code),
            discount_type: Set(builder.discount_type),
            discount_value: Set(builder.discount_value),
            min_order_value: Set(builder.min_order_value),
            max_discount: Set(builder.max_discount),
            usage_limit: Set(builder.usage_limit),
            used_count: Set(builder.used_count),
            one_time_per_user: Set(builder.one_time_per_user),
            auto_apply: Set(builder.auto_apply),
            is_active: Set(builder.is_active),
            is_archived: Set(false),
            expires_at: Set(builder.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to seed coupon")
    }

    /// Inserts a shipping tier row directly.
    pub async fn seed_tier(
        &self,
        min: Decimal,
        max: Option<Decimal>,
        charge: Decimal,
    ) -> shipping_tier::Model {
        let now = Utc::now();
        let model = shipping_tier::ActiveModel {
            id: Set(Uuid::new_v4()),
            min_amount: Set(min),
            max_amount: Set(max),
            shipping_charge: Set(charge),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to seed shipping tier")
    }
}

/// Seed data builder with checkout-friendly defaults.
pub struct CouponBuilder {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub one_time_per_user: bool,
    pub auto_apply: bool,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CouponBuilder {
    pub fn percentage(code: &str, value: Decimal) -> Self {
        Self {
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: value,
            min_order_value: Decimal::ZERO,
            max_discount: None,
            usage_limit: None,
            used_count: 0,
            one_time_per_user: true,
            auto_apply: false,
            is_active: true,
            expires_at: None,
        }
    }

    pub fn fixed(code: &str, value: Decimal) -> Self {
        Self {
            discount_type: DiscountType::Fixed,
            ..Self::percentage(code, value)
        }
    }

    pub fn auto_apply(mut self) -> Self {
        self.auto_apply = true;
        self
    }

    pub fn min_order(mut self, min: Decimal) -> Self {
        self.min_order_value = min;
        self
    }

    pub fn max_discount(mut self, cap: Decimal) -> Self {
        self.max_discount = Some(cap);
        self
    }

    pub fn usage_limit(mut self, limit: i32, used: i32) -> Self {
        self.usage_limit = Some(limit);
        self.used_count = used;
        self
    }

    pub fn multi_use(mut self) -> Self {
        self.one_time_per_user = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn expires_at(mut self, when: DateTime<Utc>) -> Self {
        self.expires_at = Some(when);
        self
    }
}
