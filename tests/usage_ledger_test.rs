mod common;

use assert_matches::assert_matches;
use common::{CouponBuilder, TestApp};
use pricing_engine::{
    entities::coupon::Entity as Coupon,
    entities::coupon_usage::AppliedType,
    errors::{ServiceError, UsageConflict},
    services::usage_ledger::RecordUsageInput,
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

fn usage(coupon_id: Uuid, user_id: Uuid) -> RecordUsageInput {
    RecordUsageInput {
        coupon_id,
        user_id,
        order_id: Uuid::new_v4(),
        discount_amount: dec!(50),
        order_subtotal: dec!(500),
        applied_type: AppliedType::Manual,
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_record_increments_counter_and_writes_ledger_row() {
    let app = TestApp::new().await;
    let ledger = app.state.services.ledger.clone();
    let seeded = app
        .seed_coupon(CouponBuilder::fixed("LEDGER", dec!(50)).multi_use())
        .await;

    let row = ledger
        .record(usage(seeded.id, Uuid::new_v4()))
        .await
        .expect("redemption should succeed");
    assert_eq!(row.coupon_code, "LEDGER");
    assert_eq!(row.discount_amount, dec!(50));

    let reloaded = Coupon::find_by_id(seeded.id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("coupon exists");
    assert_eq!(reloaded.used_count, 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_usage_limit_blocks_the_redemption_past_the_limit() {
    let app = TestApp::new().await;
    let ledger = app.state.services.ledger.clone();
    // Limit 2, one slot already consumed.
    let seeded = app
        .seed_coupon(CouponBuilder::fixed("LIMIT2", dec!(50)).usage_limit(2, 1).multi_use())
        .await;

    ledger
        .record(usage(seeded.id, Uuid::new_v4()))
        .await
        .expect("second slot should be granted");

    let err = ledger
        .record(usage(seeded.id, Uuid::new_v4()))
        .await
        .expect_err("third redemption should fail");
    assert_matches!(
        err,
        ServiceError::ConcurrencyViolation(UsageConflict::UsageLimitExceeded {
            usage_limit: 2,
            ..
        })
    );

    // The failed attempt must not have bumped the counter.
    let reloaded = Coupon::find_by_id(seeded.id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("coupon exists");
    assert_eq!(reloaded.used_count, 2);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_one_time_per_user_blocks_a_duplicate_redemption() {
    let app = TestApp::new().await;
    let ledger = app.state.services.ledger.clone();
    let seeded = app
        .seed_coupon(CouponBuilder::fixed("ONEUSER", dec!(50)))
        .await;

    let user = Uuid::new_v4();
    ledger
        .record(usage(seeded.id, user))
        .await
        .expect("first redemption should succeed");

    let err = ledger
        .record(usage(seeded.id, user))
        .await
        .expect_err("duplicate should fail");
    assert_matches!(
        err,
        ServiceError::ConcurrencyViolation(UsageConflict::AlreadyRedeemed { .. })
    );

    // The rollback also undoes the counter increment.
    let reloaded = Coupon::find_by_id(seeded.id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("coupon exists");
    assert_eq!(reloaded.used_count, 1);

    // A different user still gets through.
    ledger
        .record(usage(seeded.id, Uuid::new_v4()))
        .await
        .expect("other user should succeed");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_record_unknown_coupon_is_not_found() {
    let app = TestApp::new().await;
    let ledger = app.state.services.ledger.clone();

    let err = ledger
        .record(usage(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .expect_err("unknown coupon should fail");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_used_coupons_returns_only_redeemed_subset() {
    let app = TestApp::new().await;
    let ledger = app.state.services.ledger.clone();
    let a = app
        .seed_coupon(CouponBuilder::fixed("SUBA", dec!(10)))
        .await;
    let b = app
        .seed_coupon(CouponBuilder::fixed("SUBB", dec!(20)))
        .await;

    let user = Uuid::new_v4();
    ledger
        .record(usage(a.id, user))
        .await
        .expect("seed redemption");

    let used = ledger
        .used_coupons(user, &[a.id, b.id])
        .await
        .expect("lookup");
    assert!(used.contains(&a.id));
    assert!(!used.contains(&b.id));

    assert!(ledger.has_used(a.id, user).await.expect("has_used"));
    assert!(!ledger.has_used(b.id, user).await.expect("has_used"));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_usages_for_coupon_newest_first() {
    let app = TestApp::new().await;
    let ledger = app.state.services.ledger.clone();
    let seeded = app
        .seed_coupon(CouponBuilder::fixed("HIST", dec!(10)).multi_use())
        .await;

    for _ in 0..3 {
        ledger
            .record(usage(seeded.id, Uuid::new_v4()))
            .await
            .expect("seed redemption");
    }

    let history = ledger.usages_for_coupon(seeded.id).await.expect("history");
    assert_eq!(history.len(), 3);
    for pair in history.windows(2) {
        assert!(pair[0].used_at >= pair[1].used_at);
    }
}
