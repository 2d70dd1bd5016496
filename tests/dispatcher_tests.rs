#[macro_use]
mod common;

use anyhow::Result;
use common::{
    create_user, random_id, test_context, Outbound, RecordingGateway, StubPayments, STUB_PAYMENT_URL,
};
use garbage_courier::bot::{dispatch, Incoming, Sender};
use garbage_courier::context::AppContext;
use garbage_courier::db;
use garbage_courier::gateway::ButtonAction;
use garbage_courier::models::{DetailedStatus, Role};
use sqlx::PgPool;

fn sender(id: i64) -> Sender {
    Sender {
        id,
        username: Some(format!("user{}", id)),
        first_name: Some("Tester".to_string()),
        language_code: Some("ru".to_string()),
    }
}

fn text(id: i64, body: &str) -> Incoming {
    Incoming::Text {
        chat_id: id,
        sender: sender(id),
        text: body.to_string(),
    }
}

fn callback(id: i64, data: &str) -> Incoming {
    Incoming::Callback {
        callback_id: format!("cb-{}", random_id()),
        chat_id: id,
        message_id: Some(10),
        sender: sender(id),
        data: data.to_string(),
    }
}

async fn latest_order_id(pool: &PgPool, client_id: i64) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT MAX(id) FROM orders WHERE client_id = $1")
        .bind(client_id)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

fn plain_context(pool: &PgPool, gateway: &std::sync::Arc<RecordingGateway>) -> AppContext {
    test_context(pool.clone(), gateway.clone(), None, false)
}

#[tokio::test]
async fn test_start_registers_client() -> Result<()> {
    skip_if_no_db!(test_start_registers_client_impl)
}

async fn test_start_registers_client_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let id = random_id();

    dispatch(&app, text(id, "/start")).await?;

    let user = db::get_user(pool, id).await?.unwrap();
    assert_eq!(user.role, Role::Client);

    let messages = gateway.messages_to(id);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].text().unwrap().contains("Добро пожаловать"));
    let data = messages[0].keyboard().unwrap().callback_data();
    assert_eq!(data, vec!["apply_courier", "client_menu", "reviews"]);

    Ok(())
}

#[tokio::test]
async fn test_client_creates_order_from_three_lines() -> Result<()> {
    skip_if_no_db!(test_client_creates_order_from_three_lines_impl)
}

async fn test_client_creates_order_from_three_lines_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let client = create_user(pool, Role::Client, "ru").await?;

    dispatch(&app, text(client, "Lenina 10\nTake out trash\n500")).await?;

    let order_id = latest_order_id(pool, client).await?.unwrap();
    let order = db::get_order(pool, order_id).await?.unwrap();
    assert_eq!(order.price, 500);
    assert_eq!(order.detailed_status, DetailedStatus::SearchingCourier);

    let texts = gateway.texts_to(client);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains(&format!("#{}", order_id)));
    assert!(texts[0].contains("500 ₽"));

    Ok(())
}

#[tokio::test]
async fn test_payment_first_order_gets_payment_link() -> Result<()> {
    skip_if_no_db!(test_payment_first_order_gets_payment_link_impl)
}

async fn test_payment_first_order_gets_payment_link_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let payments = StubPayments::new();
    let app = test_context(pool.clone(), gateway.clone(), Some(payments.clone()), true);
    let client = create_user(pool, Role::Client, "ru").await?;

    dispatch(&app, text(client, "Mira 3\nBox\n700")).await?;

    let order_id = latest_order_id(pool, client).await?.unwrap();
    let order = db::get_order(pool, order_id).await?.unwrap();
    assert_eq!(order.detailed_status, DetailedStatus::WaitingPayment);
    assert_eq!(order.payment_id.as_deref(), Some("stub-1"));

    let requests = payments.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].order_ref, order_id.to_string());
    assert_eq!(requests[0].amount, "700.00");

    let messages = gateway.messages_to(client);
    assert_eq!(messages.len(), 2);
    let link = messages[1]
        .keyboard()
        .unwrap()
        .rows
        .iter()
        .flatten()
        .find_map(|button| match &button.action {
            ButtonAction::Url(url) => Some(url.clone()),
            ButtonAction::Callback(_) => None,
        });
    assert_eq!(link.as_deref(), Some(STUB_PAYMENT_URL));

    Ok(())
}

#[tokio::test]
async fn test_courier_cannot_place_orders() -> Result<()> {
    skip_if_no_db!(test_courier_cannot_place_orders_impl)
}

async fn test_courier_cannot_place_orders_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let courier = create_user(pool, Role::Courier, "ru").await?;

    dispatch(&app, text(courier, "Lenina 10\nTake out trash\n500")).await?;

    assert_eq!(latest_order_id(pool, courier).await?, None);
    assert_eq!(gateway.texts_to(courier), vec!["Используйте /start для начала работы"]);

    Ok(())
}

#[tokio::test]
async fn test_admin_commands_ignored_for_others() -> Result<()> {
    skip_if_no_db!(test_admin_commands_ignored_for_others_impl)
}

async fn test_admin_commands_ignored_for_others_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let operator = create_user(pool, Role::Operator, "ru").await?;
    let target = create_user(pool, Role::Client, "ru").await?;

    dispatch(&app, text(operator, &format!("operator_add {}", target))).await?;
    dispatch(&app, text(operator, &format!("user_freeze {}", target))).await?;

    assert!(gateway.calls().is_empty());
    let user = db::get_user(pool, target).await?.unwrap();
    assert_eq!(user.role, Role::Client);
    assert!(!user.is_frozen);

    Ok(())
}

#[tokio::test]
async fn test_admin_adds_operator() -> Result<()> {
    skip_if_no_db!(test_admin_adds_operator_impl)
}

async fn test_admin_adds_operator_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let admin = create_user(pool, Role::Admin, "ru").await?;
    let target = create_user(pool, Role::Client, "en").await?;

    dispatch(&app, text(admin, &format!("operator_add {}", target))).await?;

    assert_eq!(db::get_user_role(pool, target).await?, Some(Role::Operator));
    let admin_texts = gateway.texts_to(admin);
    assert_eq!(admin_texts.len(), 1);
    assert!(admin_texts[0].contains(&target.to_string()));
    // The new operator is told in their own language
    let target_texts = gateway.texts_to(target);
    assert_eq!(target_texts.len(), 1);
    assert!(target_texts[0].contains("operator"));

    // Unknown users must /start first
    dispatch(&app, text(admin, &format!("operator_add {}", random_id()))).await?;
    assert!(gateway.texts_to(admin)[1].contains("/start"));

    // Malformed argument
    dispatch(&app, text(admin, "operator_add abc")).await?;
    assert_eq!(gateway.texts_to(admin).len(), 3);
    assert_eq!(db::get_user_role(pool, admin).await?, Some(Role::Admin));

    Ok(())
}

#[tokio::test]
async fn test_frozen_user_is_refused() -> Result<()> {
    skip_if_no_db!(test_frozen_user_is_refused_impl)
}

async fn test_frozen_user_is_refused_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let admin = create_user(pool, Role::Admin, "ru").await?;
    let client = create_user(pool, Role::Client, "ru").await?;

    dispatch(&app, text(admin, &format!("user_freeze {}", client))).await?;
    assert!(db::get_user(pool, client).await?.unwrap().is_frozen);

    dispatch(&app, text(client, "Lenina 10\nTake out trash\n500")).await?;
    assert_eq!(latest_order_id(pool, client).await?, None);
    assert_eq!(
        gateway.texts_to(client),
        vec!["❄️ Ваш аккаунт заморожен. Обратитесь в поддержку."]
    );

    // Callbacks are still answered
    let press = callback(client, "client_menu");
    dispatch(&app, press).await?;
    assert_eq!(gateway.answered_callbacks().len(), 1);
    assert_eq!(gateway.texts_to(client).len(), 2);

    dispatch(&app, text(admin, &format!("user_unfreeze {}", client))).await?;
    assert!(!db::get_user(pool, client).await?.unwrap().is_frozen);

    Ok(())
}

#[tokio::test]
async fn test_role_enforced_on_callbacks() -> Result<()> {
    skip_if_no_db!(test_role_enforced_on_callbacks_impl)
}

async fn test_role_enforced_on_callbacks_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let client = create_user(pool, Role::Client, "ru").await?;
    let other = create_user(pool, Role::Client, "ru").await?;

    let order = db::create_order(pool, other, "Mira 3", "Box", 300, DetailedStatus::SearchingCourier).await?;

    dispatch(&app, callback(client, &format!("accept_order_{}", order.id))).await?;
    dispatch(&app, callback(client, "admin_panel")).await?;
    dispatch(&app, callback(client, "no_such_button")).await?;

    assert_eq!(gateway.answered_callbacks().len(), 3);
    assert!(gateway.messages_to(client).is_empty());
    let stored = db::get_order(pool, order.id).await?.unwrap();
    assert_eq!(stored.detailed_status, DetailedStatus::SearchingCourier);

    Ok(())
}

#[tokio::test]
async fn test_courier_accepts_from_callback() -> Result<()> {
    skip_if_no_db!(test_courier_accepts_from_callback_impl)
}

async fn test_courier_accepts_from_callback_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let client = create_user(pool, Role::Client, "ru").await?;
    let courier = create_user(pool, Role::Courier, "ru").await?;
    let rival = create_user(pool, Role::Courier, "ru").await?;

    let order = db::create_order(pool, client, "Mira 3", "Box", 300, DetailedStatus::SearchingCourier).await?;

    dispatch(&app, callback(courier, &format!("accept_order_{}", order.id))).await?;

    let edits: Vec<Outbound> = gateway
        .messages_to(courier)
        .into_iter()
        .filter(|call| matches!(call, Outbound::Edit { .. }))
        .collect();
    assert_eq!(edits.len(), 1);
    assert!(edits[0].text().unwrap().contains(&format!("#{}", order.id)));
    assert_eq!(gateway.texts_to(client).len(), 1);

    // Too late for the second courier
    dispatch(&app, callback(rival, &format!("accept_order_{}", order.id))).await?;
    assert!(gateway.texts_to(rival)[0].contains("недоступен"));
    assert_eq!(gateway.texts_to(client).len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_courier_application_flow() -> Result<()> {
    skip_if_no_db!(test_courier_application_flow_impl)
}

async fn test_courier_application_flow_impl(pool: &PgPool) -> Result<()> {
    let gateway = RecordingGateway::new();
    let app = plain_context(pool, &gateway);
    let admin = create_user(pool, Role::Admin, "ru").await?;
    let applicant = create_user(pool, Role::Client, "ru").await?;

    dispatch(&app, callback(applicant, "apply_courier")).await?;
    dispatch(&app, callback(applicant, "apply_courier")).await?;
    let texts = gateway.texts_to(applicant);
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("Заявка на роль курьера отправлена"));
    assert_ne!(texts[0], texts[1]);

    dispatch(&app, callback(admin, &format!("approve_courier_{}", applicant))).await?;
    assert_eq!(db::get_user_role(pool, applicant).await?, Some(Role::Courier));
    assert_eq!(gateway.texts_to(applicant).len(), 3);

    Ok(())
}
