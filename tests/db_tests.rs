#[macro_use]
mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{create_user, random_id};
use garbage_courier::db::*;
use garbage_courier::models::{DetailedStatus, OrderStatus, Role};
use sqlx::PgPool;

async fn searching_order(pool: &PgPool, client_id: i64, price: i64) -> Result<Order> {
    create_order(
        pool,
        client_id,
        "Lenina 10",
        "Two bags",
        price,
        DetailedStatus::SearchingCourier,
    )
    .await
}

#[tokio::test]
async fn test_user_operations() -> Result<()> {
    skip_if_no_db!(test_user_operations_impl)
}

async fn test_user_operations_impl(pool: &PgPool) -> Result<()> {
    let id = random_id();
    let user = upsert_user(pool, id, Some("anna"), Some("Anna"), Some("en")).await?;
    assert_eq!(user.telegram_id, id);
    assert_eq!(user.role, Role::Client);
    assert!(!user.is_frozen);

    // Profile fields refresh; a missing language keeps the stored one
    let user = upsert_user(pool, id, Some("anna_k"), Some("Anna"), None).await?;
    assert_eq!(user.username.as_deref(), Some("anna_k"));
    assert_eq!(user.language_code.as_deref(), Some("en"));

    assert_eq!(get_user_role(pool, id).await?, Some(Role::Client));
    assert_eq!(get_user_role(pool, random_id()).await?, None);

    assert!(set_user_frozen(pool, id, true).await?);
    assert!(get_user(pool, id).await?.unwrap().is_frozen);
    assert!(set_user_frozen(pool, id, false).await?);

    Ok(())
}

#[tokio::test]
async fn test_admins_cannot_be_frozen_or_demoted() -> Result<()> {
    skip_if_no_db!(test_admins_cannot_be_frozen_or_demoted_impl)
}

async fn test_admins_cannot_be_frozen_or_demoted_impl(pool: &PgPool) -> Result<()> {
    let admin = create_user(pool, Role::Admin, "ru").await?;

    assert!(!set_user_frozen(pool, admin, true).await?);
    assert!(!set_user_role(pool, admin, Role::Operator).await?);
    assert_eq!(get_user_role(pool, admin).await?, Some(Role::Admin));

    Ok(())
}

#[tokio::test]
async fn test_only_one_courier_wins_an_order() -> Result<()> {
    skip_if_no_db!(test_only_one_courier_wins_an_order_impl)
}

async fn test_only_one_courier_wins_an_order_impl(pool: &PgPool) -> Result<()> {
    let client = create_user(pool, Role::Client, "ru").await?;
    let first = create_user(pool, Role::Courier, "ru").await?;
    let second = create_user(pool, Role::Courier, "ru").await?;
    let order = searching_order(pool, client, 500).await?;

    let now = Utc::now();
    let (a, b) = tokio::join!(
        accept_order(pool, order.id, first, now),
        accept_order(pool, order.id, second, now)
    );
    let (a, b) = (a?, b?);
    assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1, "exactly one courier wins");

    let winner = if a.is_some() { first } else { second };
    let stored = get_order(pool, order.id).await?.unwrap();
    assert_eq!(stored.courier_id, Some(winner));
    assert_eq!(stored.detailed_status, DetailedStatus::CourierOnWay);
    assert_eq!(stored.status, OrderStatus::Accepted);
    assert!(stored.accepted_at.is_some());

    Ok(())
}

#[tokio::test]
async fn test_courier_progress_and_stats() -> Result<()> {
    skip_if_no_db!(test_courier_progress_and_stats_impl)
}

async fn test_courier_progress_and_stats_impl(pool: &PgPool) -> Result<()> {
    let client = create_user(pool, Role::Client, "ru").await?;
    let courier = create_user(pool, Role::Courier, "ru").await?;
    let stranger = create_user(pool, Role::Courier, "ru").await?;
    let order = searching_order(pool, client, 750).await?;

    assert_eq!(get_courier_stats(pool, courier).await?, CourierStats::default());

    // Completing before starting is refused
    assert!(accept_order(pool, order.id, courier, Utc::now()).await?.is_some());
    assert!(complete_order(pool, order.id, courier, Utc::now()).await?.is_none());

    // Only the assigned courier may move the order along
    assert!(start_order_work(pool, order.id, stranger).await?.is_none());
    let working = start_order_work(pool, order.id, courier).await?.unwrap();
    assert_eq!(working.detailed_status, DetailedStatus::CourierWorking);

    let completed = complete_order(pool, order.id, courier, Utc::now()).await?.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);
    assert!(completed.completed_at.is_some());

    let stats = get_courier_stats(pool, courier).await?;
    assert_eq!(stats.total_orders, 1);
    assert_eq!(stats.total_earnings, 750);
    assert_eq!(stats.average_check(), 750);

    // A second completion is a no-op and credits nothing
    assert!(complete_order(pool, order.id, courier, Utc::now()).await?.is_none());
    assert_eq!(get_courier_stats(pool, courier).await?.total_orders, 1);

    Ok(())
}

#[tokio::test]
async fn test_operator_override_rules() -> Result<()> {
    skip_if_no_db!(test_operator_override_rules_impl)
}

async fn test_operator_override_rules_impl(pool: &PgPool) -> Result<()> {
    let client = create_user(pool, Role::Client, "ru").await?;
    let courier = create_user(pool, Role::Courier, "ru").await?;
    let order = searching_order(pool, client, 300).await?;

    let outcome = override_order_status(pool, order.id, DetailedStatus::CourierWorking, Utc::now()).await?;
    assert_eq!(outcome, OverrideOutcome::NeedsCourier);

    let outcome = override_order_status(pool, i64::MAX, DetailedStatus::Cancelled, Utc::now()).await?;
    assert_eq!(outcome, OverrideOutcome::NotFound);

    accept_order(pool, order.id, courier, Utc::now()).await?;
    match override_order_status(pool, order.id, DetailedStatus::Completed, Utc::now()).await? {
        OverrideOutcome::Updated(updated) => {
            assert_eq!(updated.status, OrderStatus::Completed);
            assert!(updated.completed_at.is_some());
        }
        other => panic!("expected an update, got {:?}", other),
    }
    assert_eq!(get_courier_stats(pool, courier).await?.total_earnings, 300);

    // A courier-completed order that is cancelled and completed again is credited once
    let second = searching_order(pool, client, 500).await?;
    accept_order(pool, second.id, courier, Utc::now()).await?;
    start_order_work(pool, second.id, courier).await?;
    assert!(complete_order(pool, second.id, courier, Utc::now()).await?.is_some());
    let outcome = override_order_status(pool, second.id, DetailedStatus::Cancelled, Utc::now()).await?;
    assert!(matches!(outcome, OverrideOutcome::Updated(_)));
    let outcome = override_order_status(pool, second.id, DetailedStatus::Completed, Utc::now()).await?;
    assert!(matches!(outcome, OverrideOutcome::Updated(_)));
    let stats = get_courier_stats(pool, courier).await?;
    assert_eq!(stats.total_orders, 2);
    assert_eq!(stats.total_earnings, 800);

    // Back to searching drops the courier
    match override_order_status(pool, order.id, DetailedStatus::SearchingCourier, Utc::now()).await? {
        OverrideOutcome::Updated(updated) => {
            assert_eq!(updated.courier_id, None);
            assert_eq!(updated.status, OrderStatus::Pending);
        }
        other => panic!("expected an update, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_payment_recording() -> Result<()> {
    skip_if_no_db!(test_payment_recording_impl)
}

async fn test_payment_recording_impl(pool: &PgPool) -> Result<()> {
    let client = create_user(pool, Role::Client, "ru").await?;
    let order = create_order(pool, client, "Mira 3", "Box", 500, DetailedStatus::WaitingPayment).await?;
    assert_eq!(order.payment_status, "pending");

    let paid = mark_order_paid(pool, order.id, "pay-1", "succeeded", Utc::now())
        .await?
        .unwrap();
    assert!(paid.opened_order());
    assert_eq!(paid.order.detailed_status, DetailedStatus::SearchingCourier);
    assert_eq!(paid.order.payment_id.as_deref(), Some("pay-1"));
    assert_eq!(paid.order.payment_status, "succeeded");
    assert!(paid.order.paid_at.is_some());

    // Redelivery finds nothing to update
    assert!(mark_order_paid(pool, order.id, "pay-1", "succeeded", Utc::now())
        .await?
        .is_none());

    // An order already open to couriers keeps its state but records the payment
    let open = searching_order(pool, client, 400).await?;
    let paid = mark_order_paid(pool, open.id, "pay-2", "succeeded", Utc::now())
        .await?
        .unwrap();
    assert!(!paid.opened_order());
    assert_eq!(paid.order.detailed_status, DetailedStatus::SearchingCourier);
    assert_eq!(paid.order.payment_status, "succeeded");
    assert!(paid.order.paid_at.is_some());

    // A payment arriving after cancellation is still recorded
    let cancelled = create_order(pool, client, "Mira 4", "Box", 300, DetailedStatus::WaitingPayment).await?;
    override_order_status(pool, cancelled.id, DetailedStatus::Cancelled, Utc::now()).await?;
    let paid = mark_order_paid(pool, cancelled.id, "pay-3", "succeeded", Utc::now())
        .await?
        .unwrap();
    assert_eq!(paid.previous, DetailedStatus::Cancelled);
    assert_eq!(paid.order.detailed_status, DetailedStatus::Cancelled);
    assert_eq!(paid.order.payment_id.as_deref(), Some("pay-3"));

    assert!(mark_order_paid(pool, i64::MAX, "pay-4", "succeeded", Utc::now())
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn test_unpaid_orders_cancel_after_cutoff() -> Result<()> {
    skip_if_no_db!(test_unpaid_orders_cancel_after_cutoff_impl)
}

async fn test_unpaid_orders_cancel_after_cutoff_impl(pool: &PgPool) -> Result<()> {
    let client = create_user(pool, Role::Client, "ru").await?;
    let stale = create_order(pool, client, "Old 1", "Bags", 200, DetailedStatus::WaitingPayment).await?;
    let fresh = create_order(pool, client, "New 1", "Bags", 200, DetailedStatus::WaitingPayment).await?;
    sqlx::query("UPDATE orders SET created_at = created_at - INTERVAL '31 minutes' WHERE id = $1")
        .bind(stale.id)
        .execute(pool)
        .await?;

    let cutoff = Utc::now() - Duration::minutes(30);
    let cancelled: Vec<i64> = cancel_unpaid_orders(pool, cutoff).await?.iter().map(|o| o.id).collect();
    assert!(cancelled.contains(&stale.id));
    assert!(!cancelled.contains(&fresh.id));

    let stored = get_order(pool, stale.id).await?.unwrap();
    assert_eq!(stored.detailed_status, DetailedStatus::Cancelled);
    assert_eq!(stored.status, OrderStatus::Cancelled);

    let again: Vec<i64> = cancel_unpaid_orders(pool, cutoff).await?.iter().map(|o| o.id).collect();
    assert!(!again.contains(&stale.id));

    Ok(())
}

#[tokio::test]
async fn test_courier_application_review() -> Result<()> {
    skip_if_no_db!(test_courier_application_review_impl)
}

async fn test_courier_application_review_impl(pool: &PgPool) -> Result<()> {
    let applicant = create_user(pool, Role::Client, "ru").await?;
    let admin = create_user(pool, Role::Admin, "ru").await?;

    assert!(create_courier_application(pool, applicant).await?.is_some());
    assert!(create_courier_application(pool, applicant).await?.is_none());

    let pending = list_pending_applications(pool, 100).await?;
    assert!(pending.iter().any(|a| a.telegram_id == applicant));

    assert!(review_courier_application(pool, applicant, admin, true, Utc::now()).await?);
    assert_eq!(get_user_role(pool, applicant).await?, Some(Role::Courier));

    // Nothing left to review; a new application may be filed afterwards
    assert!(!review_courier_application(pool, applicant, admin, false, Utc::now()).await?);
    assert!(create_courier_application(pool, applicant).await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_ratings_require_completed_own_order() -> Result<()> {
    skip_if_no_db!(test_ratings_require_completed_own_order_impl)
}

async fn test_ratings_require_completed_own_order_impl(pool: &PgPool) -> Result<()> {
    let client = create_user(pool, Role::Client, "ru").await?;
    let other = create_user(pool, Role::Client, "ru").await?;
    let courier = create_user(pool, Role::Courier, "ru").await?;
    let order = searching_order(pool, client, 400).await?;

    assert!(create_rating(pool, order.id, client, 5, Utc::now()).await?.is_none());

    accept_order(pool, order.id, courier, Utc::now()).await?;
    start_order_work(pool, order.id, courier).await?;
    complete_order(pool, order.id, courier, Utc::now()).await?;

    assert!(create_rating(pool, order.id, other, 1, Utc::now()).await?.is_none());
    assert!(create_rating(pool, order.id, client, 4, Utc::now()).await?.is_some());
    assert!(create_rating(pool, order.id, client, 2, Utc::now()).await?.is_none());
    assert_eq!(average_courier_rating(pool, courier).await?, Some(4.0));

    Ok(())
}

#[tokio::test]
async fn test_schema_init_is_repeatable() -> Result<()> {
    skip_if_no_db!(test_schema_init_is_repeatable_impl)
}

async fn test_schema_init_is_repeatable_impl(pool: &PgPool) -> Result<()> {
    let (a, b) = tokio::join!(init_database_schema(pool), init_database_schema(pool));
    a?;
    b?;
    Ok(())
}
