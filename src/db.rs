use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgConnection, Row};
use tracing::{debug, info};

use crate::models::{ApplicationStatus, DetailedStatus, OrderStatus, Role, SubscriptionType};

/// Key of the advisory lock serializing schema creation across instances
const SCHEMA_LOCK_KEY: i64 = 0x6761_7262_6167_65;

/// Represents a user in the database
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub language_code: Option<String>,
    pub role: Role,
    pub is_frozen: bool,
    pub created_at: DateTime<Utc>,
}

/// Represents an order in the database
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub client_id: i64,
    pub courier_id: Option<i64>,
    pub address: String,
    pub description: String,
    pub price: i64,
    pub status: OrderStatus,
    pub detailed_status: DetailedStatus,
    pub payment_status: String,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// An order joined with the display names of its client and courier
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCard {
    pub id: i64,
    pub address: String,
    pub description: String,
    pub price: i64,
    pub detailed_status: DetailedStatus,
    pub client_name: Option<String>,
    pub courier_name: Option<String>,
}

/// Lifetime totals of one courier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CourierStats {
    pub total_orders: i64,
    pub total_earnings: i64,
}

impl CourierStats {
    /// Rounded average price of a completed order
    pub fn average_check(&self) -> i64 {
        if self.total_orders > 0 {
            (self.total_earnings as f64 / self.total_orders as f64).round() as i64
        } else {
            0
        }
    }
}

/// A pending courier application with the applicant's names
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApplication {
    pub telegram_id: i64,
    pub first_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub rating: i32,
    pub review: Option<String>,
    pub courier_name: Option<String>,
}

/// Service-wide totals for the admin statistics screen
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServiceStats {
    pub clients: i64,
    pub couriers: i64,
    pub operators: i64,
    pub total_orders: i64,
    pub completed_orders: i64,
    pub revenue: i64,
    pub average_check: i64,
}

/// Order counts per coarse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderCounts {
    pub pending: i64,
    pub accepted: i64,
    pub completed: i64,
    pub completed_today: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub client_id: i64,
    pub kind: SubscriptionType,
    pub price: i64,
    pub duration_days: i32,
    pub payment_status: String,
    pub payment_id: Option<String>,
    pub is_active: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// A user to notify, with the language their messages should use
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub telegram_id: i64,
    pub language_code: Option<String>,
}

/// Result of an operator status override
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideOutcome {
    Updated(Order),
    NotFound,
    /// The target state needs a courier and none is assigned
    NeedsCourier,
}

const USER_COLUMNS: &str =
    "telegram_id, username, first_name, language_code, role, is_frozen, created_at";

const ORDER_COLUMNS: &str = "id, client_id, courier_id, address, description, price, status, \
     detailed_status, payment_status, payment_id, created_at, accepted_at, completed_at, paid_at";

const ORDER_CARD_SELECT: &str = "SELECT o.id, o.address, o.description, o.price, o.detailed_status, \
     c.first_name AS client_name, k.first_name AS courier_name \
     FROM orders o \
     LEFT JOIN users c ON c.telegram_id = o.client_id \
     LEFT JOIN users k ON k.telegram_id = o.courier_id";

const SUBSCRIPTION_COLUMNS: &str = "id, client_id, type, price, duration_days, payment_status, \
     payment_id, is_active, end_date, paid_at";

const SCHEMA: &[(&str, &str)] = &[
    (
        "users table",
        "CREATE TABLE IF NOT EXISTS users (
            telegram_id BIGINT PRIMARY KEY,
            username TEXT,
            first_name TEXT,
            language_code VARCHAR(10),
            role VARCHAR(16) NOT NULL DEFAULT 'client'
                CHECK (role IN ('client', 'courier', 'operator', 'admin')),
            is_frozen BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "orders table",
        "CREATE TABLE IF NOT EXISTS orders (
            id BIGSERIAL PRIMARY KEY,
            client_id BIGINT NOT NULL REFERENCES users(telegram_id),
            courier_id BIGINT REFERENCES users(telegram_id),
            address TEXT NOT NULL,
            description TEXT NOT NULL,
            price BIGINT NOT NULL CHECK (price >= 0),
            status VARCHAR(16) NOT NULL,
            detailed_status VARCHAR(32) NOT NULL,
            payment_status VARCHAR(32) NOT NULL DEFAULT 'pending',
            payment_id TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            accepted_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            paid_at TIMESTAMPTZ,
            CONSTRAINT orders_status_projection CHECK (
                (detailed_status IN ('waiting_payment', 'searching_courier') AND status = 'pending')
                OR (detailed_status IN ('courier_on_way', 'courier_working') AND status = 'accepted')
                OR (detailed_status = 'completed' AND status = 'completed')
                OR (detailed_status = 'cancelled' AND status = 'cancelled')
            )
        )",
    ),
    (
        "orders status index",
        "CREATE INDEX IF NOT EXISTS orders_detailed_status_idx ON orders (detailed_status, created_at)",
    ),
    (
        "orders client index",
        "CREATE INDEX IF NOT EXISTS orders_client_id_idx ON orders (client_id)",
    ),
    (
        "orders courier index",
        "CREATE INDEX IF NOT EXISTS orders_courier_id_idx ON orders (courier_id)",
    ),
    (
        "courier_applications table",
        "CREATE TABLE IF NOT EXISTS courier_applications (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL REFERENCES users(telegram_id),
            status VARCHAR(16) NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected')),
            reviewed_by BIGINT,
            reviewed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "single pending application index",
        "CREATE UNIQUE INDEX IF NOT EXISTS courier_applications_one_pending_idx
            ON courier_applications (telegram_id) WHERE status = 'pending'",
    ),
    (
        "courier_stats table",
        "CREATE TABLE IF NOT EXISTS courier_stats (
            courier_id BIGINT PRIMARY KEY,
            total_orders BIGINT NOT NULL DEFAULT 0,
            total_earnings BIGINT NOT NULL DEFAULT 0,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "ratings table",
        "CREATE TABLE IF NOT EXISTS ratings (
            id BIGSERIAL PRIMARY KEY,
            order_id BIGINT UNIQUE REFERENCES orders(id),
            courier_id BIGINT NOT NULL,
            client_id BIGINT NOT NULL,
            rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            review TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "subscriptions table",
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id BIGSERIAL PRIMARY KEY,
            client_id BIGINT NOT NULL REFERENCES users(telegram_id),
            type VARCHAR(16) NOT NULL CHECK (type IN ('daily', 'alternate')),
            price BIGINT NOT NULL,
            duration_days INTEGER NOT NULL,
            payment_status VARCHAR(32) NOT NULL DEFAULT 'pending',
            payment_id TEXT,
            is_active BOOLEAN NOT NULL DEFAULT FALSE,
            end_date TIMESTAMPTZ,
            paid_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "settings table",
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ),
];

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin schema transaction")?;

    // Concurrent starters (or parallel tests) would race on CREATE ... IF NOT EXISTS
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .context("Failed to acquire schema lock")?;

    for (name, ddl) in SCHEMA {
        sqlx::query(ddl)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create {}", name))?;
    }

    tx.commit()
        .await
        .context("Failed to commit schema transaction")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        telegram_id: row.get("telegram_id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        language_code: row.get("language_code"),
        role: role.parse()?,
        is_frozen: row.get("is_frozen"),
        created_at: row.get("created_at"),
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.get("status");
    let detailed_status: String = row.get("detailed_status");
    Ok(Order {
        id: row.get("id"),
        client_id: row.get("client_id"),
        courier_id: row.get("courier_id"),
        address: row.get("address"),
        description: row.get("description"),
        price: row.get("price"),
        status: status.parse()?,
        detailed_status: detailed_status.parse()?,
        payment_status: row.get("payment_status"),
        payment_id: row.get("payment_id"),
        created_at: row.get("created_at"),
        accepted_at: row.get("accepted_at"),
        completed_at: row.get("completed_at"),
        paid_at: row.get("paid_at"),
    })
}

fn order_card_from_row(row: &PgRow) -> Result<OrderCard> {
    let detailed_status: String = row.get("detailed_status");
    Ok(OrderCard {
        id: row.get("id"),
        address: row.get("address"),
        description: row.get("description"),
        price: row.get("price"),
        detailed_status: detailed_status.parse()?,
        client_name: row.get("client_name"),
        courier_name: row.get("courier_name"),
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    let kind: String = row.get("type");
    Ok(Subscription {
        id: row.get("id"),
        client_id: row.get("client_id"),
        kind: kind.parse()?,
        price: row.get("price"),
        duration_days: row.get("duration_days"),
        payment_status: row.get("payment_status"),
        payment_id: row.get("payment_id"),
        is_active: row.get("is_active"),
        end_date: row.get("end_date"),
        paid_at: row.get("paid_at"),
    })
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Create the user on first contact, refreshing profile fields afterwards
pub async fn upsert_user(
    pool: &PgPool,
    telegram_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
    language_code: Option<&str>,
) -> Result<User> {
    debug!(telegram_id = %telegram_id, "Upserting user");

    let sql = format!(
        "INSERT INTO users (telegram_id, username, first_name, language_code)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (telegram_id) DO UPDATE SET
             username = EXCLUDED.username,
             first_name = EXCLUDED.first_name,
             language_code = COALESCE(EXCLUDED.language_code, users.language_code),
             updated_at = CURRENT_TIMESTAMP
         RETURNING {}",
        USER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(telegram_id)
        .bind(username)
        .bind(first_name)
        .bind(language_code)
        .fetch_one(pool)
        .await
        .context("Failed to upsert user")?;

    user_from_row(&row)
}

/// Get a user by Telegram ID
pub async fn get_user(pool: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    debug!(telegram_id = %telegram_id, "Getting user");

    let sql = format!("SELECT {} FROM users WHERE telegram_id = $1", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.as_ref().map(user_from_row).transpose()
}

/// Read only the stored role of a user
pub async fn get_user_role(pool: &PgPool, telegram_id: i64) -> Result<Option<Role>> {
    let row = sqlx::query("SELECT role FROM users WHERE telegram_id = $1")
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user role")?;

    match row {
        Some(row) => {
            let role: String = row.get(0);
            Ok(Some(role.parse()?))
        }
        None => Ok(None),
    }
}

/// Write a configured role, creating a placeholder user when needed
pub async fn seed_user_role(pool: &PgPool, telegram_id: i64, role: Role) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (telegram_id, role) VALUES ($1, $2)
         ON CONFLICT (telegram_id) DO UPDATE SET role = EXCLUDED.role, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(telegram_id)
    .bind(role.as_str())
    .execute(pool)
    .await
    .context("Failed to seed user role")?;

    Ok(())
}

/// Change the role of an existing user; admins are never demoted here
pub async fn set_user_role(pool: &PgPool, telegram_id: i64, role: Role) -> Result<bool> {
    debug!(telegram_id = %telegram_id, role = %role, "Setting user role");

    let result = sqlx::query(
        "UPDATE users SET role = $2, updated_at = CURRENT_TIMESTAMP
         WHERE telegram_id = $1 AND role <> 'admin'",
    )
    .bind(telegram_id)
    .bind(role.as_str())
    .execute(pool)
    .await
    .context("Failed to set user role")?;

    Ok(result.rows_affected() > 0)
}

/// Freeze or unfreeze a non-admin user
pub async fn set_user_frozen(pool: &PgPool, telegram_id: i64, frozen: bool) -> Result<bool> {
    debug!(telegram_id = %telegram_id, frozen = %frozen, "Setting user frozen flag");

    let result = sqlx::query(
        "UPDATE users SET is_frozen = $2, updated_at = CURRENT_TIMESTAMP
         WHERE telegram_id = $1 AND role <> 'admin'",
    )
    .bind(telegram_id)
    .bind(frozen)
    .execute(pool)
    .await
    .context("Failed to set user frozen flag")?;

    Ok(result.rows_affected() > 0)
}

/// Stored language of a user, used for notifications they did not trigger
pub async fn get_user_language(pool: &PgPool, telegram_id: i64) -> Result<Option<String>> {
    let row = sqlx::query("SELECT language_code FROM users WHERE telegram_id = $1")
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user language")?;

    Ok(row.and_then(|row| row.get::<Option<String>, _>(0)))
}

/// All active (not frozen) users holding a role
pub async fn list_recipients_by_role(pool: &PgPool, role: Role) -> Result<Vec<Recipient>> {
    let rows = sqlx::query(
        "SELECT telegram_id, language_code FROM users WHERE role = $1 AND NOT is_frozen",
    )
    .bind(role.as_str())
    .fetch_all(pool)
    .await
    .context("Failed to list users by role")?;

    Ok(rows
        .iter()
        .map(|row| Recipient {
            telegram_id: row.get(0),
            language_code: row.get(1),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Insert a new order in its initial state
pub async fn create_order(
    pool: &PgPool,
    client_id: i64,
    address: &str,
    description: &str,
    price: i64,
    initial: DetailedStatus,
) -> Result<Order> {
    debug!(client_id = %client_id, initial = %initial, "Creating new order");

    let sql = format!(
        "INSERT INTO orders (client_id, address, description, price, status, detailed_status)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {}",
        ORDER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(client_id)
        .bind(address)
        .bind(description)
        .bind(price)
        .bind(initial.status().as_str())
        .bind(initial.as_str())
        .fetch_one(pool)
        .await
        .context("Failed to insert new order")?;

    let order = order_from_row(&row)?;
    debug!(order_id = %order.id, "Order created successfully");
    Ok(order)
}

/// Read an order by ID
pub async fn get_order(pool: &PgPool, order_id: i64) -> Result<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read order")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Assign a courier to an order that is still searching for one.
/// Returns `None` when another courier got there first or the order is gone.
pub async fn accept_order(
    pool: &PgPool,
    order_id: i64,
    courier_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Order>> {
    debug!(order_id = %order_id, courier_id = %courier_id, "Accepting order");

    let target = DetailedStatus::CourierOnWay;
    let sql = format!(
        "UPDATE orders
         SET status = $4, detailed_status = $5, courier_id = $2, accepted_at = $3
         WHERE id = $1 AND detailed_status = $6 AND courier_id IS NULL
         RETURNING {}",
        ORDER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(order_id)
        .bind(courier_id)
        .bind(now)
        .bind(target.status().as_str())
        .bind(target.as_str())
        .bind(DetailedStatus::SearchingCourier.as_str())
        .fetch_optional(pool)
        .await
        .context("Failed to accept order")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Move the caller's own order from "on the way" to "working"
pub async fn start_order_work(
    pool: &PgPool,
    order_id: i64,
    courier_id: i64,
) -> Result<Option<Order>> {
    debug!(order_id = %order_id, courier_id = %courier_id, "Starting work on order");

    let target = DetailedStatus::CourierWorking;
    let sql = format!(
        "UPDATE orders SET status = $3, detailed_status = $4
         WHERE id = $1 AND courier_id = $2 AND detailed_status = $5
         RETURNING {}",
        ORDER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(order_id)
        .bind(courier_id)
        .bind(target.status().as_str())
        .bind(target.as_str())
        .bind(DetailedStatus::CourierOnWay.as_str())
        .fetch_optional(pool)
        .await
        .context("Failed to start order work")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Add one completed order and its price to a courier's totals
async fn credit_courier(
    conn: &mut PgConnection,
    courier_id: i64,
    price: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO courier_stats (courier_id, total_orders, total_earnings, updated_at)
         VALUES ($1, 1, $2, $3)
         ON CONFLICT (courier_id) DO UPDATE SET
             total_orders = courier_stats.total_orders + 1,
             total_earnings = courier_stats.total_earnings + EXCLUDED.total_earnings,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(courier_id)
    .bind(price)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to update courier stats")?;

    Ok(())
}

/// Complete the caller's own order and credit their stats in one transaction
pub async fn complete_order(
    pool: &PgPool,
    order_id: i64,
    courier_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Order>> {
    debug!(order_id = %order_id, courier_id = %courier_id, "Completing order");

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let target = DetailedStatus::Completed;
    let sql = format!(
        "UPDATE orders SET status = $4, detailed_status = $5, completed_at = $3
         WHERE id = $1 AND courier_id = $2 AND detailed_status = $6
         RETURNING {}",
        ORDER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(order_id)
        .bind(courier_id)
        .bind(now)
        .bind(target.status().as_str())
        .bind(target.as_str())
        .bind(DetailedStatus::CourierWorking.as_str())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to complete order")?;

    let order = match row {
        Some(row) => order_from_row(&row)?,
        None => {
            tx.rollback().await.context("Failed to roll back transaction")?;
            return Ok(None);
        }
    };

    credit_courier(&mut tx, courier_id, order.price, now).await?;
    tx.commit().await.context("Failed to commit order completion")?;

    info!(order_id = %order_id, courier_id = %courier_id, price = %order.price, "Order completed");
    Ok(Some(order))
}

/// Operator override: force an order into any editor state
pub async fn override_order_status(
    pool: &PgPool,
    order_id: i64,
    target: DetailedStatus,
    now: DateTime<Utc>,
) -> Result<OverrideOutcome> {
    debug!(order_id = %order_id, target = %target, "Overriding order status");

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let current = sqlx::query(
        "SELECT courier_id, completed_at FROM orders WHERE id = $1 FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to lock order")?;

    let (courier_id, completed_before) = match current {
        Some(row) => {
            let courier_id: Option<i64> = row.get(0);
            let completed_at: Option<DateTime<Utc>> = row.get(1);
            (courier_id, completed_at.is_some())
        }
        None => {
            tx.rollback().await.context("Failed to roll back transaction")?;
            return Ok(OverrideOutcome::NotFound);
        }
    };

    if target.requires_courier() && courier_id.is_none() {
        tx.rollback().await.context("Failed to roll back transaction")?;
        return Ok(OverrideOutcome::NeedsCourier);
    }

    let clear_courier = target.precedes_courier();
    let completed_at = (target == DetailedStatus::Completed).then_some(now);
    let sql = format!(
        "UPDATE orders SET
             status = $2,
             detailed_status = $3,
             courier_id = CASE WHEN $4 THEN NULL ELSE courier_id END,
             accepted_at = CASE WHEN $4 THEN NULL ELSE accepted_at END,
             completed_at = COALESCE(completed_at, $5)
         WHERE id = $1
         RETURNING {}",
        ORDER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(order_id)
        .bind(target.status().as_str())
        .bind(target.as_str())
        .bind(clear_courier)
        .bind(completed_at)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to override order status")?;
    let order = order_from_row(&row)?;

    // completed_at is never cleared, so an order is credited at most once
    if target == DetailedStatus::Completed && !completed_before {
        if let Some(courier_id) = order.courier_id {
            credit_courier(&mut tx, courier_id, order.price, now).await?;
        }
    }

    tx.commit().await.context("Failed to commit status override")?;
    Ok(OverrideOutcome::Updated(order))
}

/// A payment recorded against an order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPayment {
    pub order: Order,
    /// State the order was in when the payment arrived
    pub previous: DetailedStatus,
}

impl RecordedPayment {
    /// Whether this payment moved the order from `waiting_payment` to couriers
    pub fn opened_order(&self) -> bool {
        self.previous == DetailedStatus::WaitingPayment
    }
}

/// Record a successful payment on an order. An order waiting for payment is
/// moved to `searching_courier`; any other state is kept. `None` when the
/// order is unknown or its payment was already recorded.
pub async fn mark_order_paid(
    pool: &PgPool,
    order_id: i64,
    payment_id: &str,
    payment_status: &str,
    now: DateTime<Utc>,
) -> Result<Option<RecordedPayment>> {
    debug!(order_id = %order_id, payment_id = %payment_id, "Marking order paid");

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let current = sqlx::query("SELECT detailed_status FROM orders WHERE id = $1 AND paid_at IS NULL FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock order")?;

    let previous = match current {
        Some(row) => row.get::<String, _>(0).parse::<DetailedStatus>()?,
        None => {
            tx.rollback().await.context("Failed to roll back transaction")?;
            return Ok(None);
        }
    };

    let target = if previous == DetailedStatus::WaitingPayment {
        DetailedStatus::SearchingCourier
    } else {
        previous
    };
    let sql = format!(
        "UPDATE orders SET
             payment_status = $2, payment_id = $3, paid_at = $4,
             status = $5, detailed_status = $6
         WHERE id = $1
         RETURNING {}",
        ORDER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(order_id)
        .bind(payment_status)
        .bind(payment_id)
        .bind(now)
        .bind(target.status().as_str())
        .bind(target.as_str())
        .fetch_one(&mut *tx)
        .await
        .context("Failed to mark order paid")?;
    let order = order_from_row(&row)?;

    tx.commit().await.context("Failed to commit order payment")?;
    Ok(Some(RecordedPayment { order, previous }))
}

/// Remember the provider payment issued for an order
pub async fn set_order_payment_id(pool: &PgPool, order_id: i64, payment_id: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE orders SET payment_id = $2 WHERE id = $1")
        .bind(order_id)
        .bind(payment_id)
        .execute(pool)
        .await
        .context("Failed to store order payment id")?;

    Ok(result.rows_affected() > 0)
}

/// Cancel every unpaid order created before `cutoff`, returning the cancelled rows
pub async fn cancel_unpaid_orders(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
    debug!(cutoff = %cutoff, "Cancelling unpaid orders");

    let target = DetailedStatus::Cancelled;
    let sql = format!(
        "UPDATE orders SET status = $2, detailed_status = $3
         WHERE payment_status = 'pending'
           AND detailed_status = $4
           AND status = $5
           AND created_at < $1
         RETURNING {}",
        ORDER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(cutoff)
        .bind(target.status().as_str())
        .bind(target.as_str())
        .bind(DetailedStatus::WaitingPayment.as_str())
        .bind(OrderStatus::Pending.as_str())
        .fetch_all(pool)
        .await
        .context("Failed to cancel unpaid orders")?;

    rows.iter().map(order_from_row).collect()
}

/// Orders couriers may accept, newest first
pub async fn list_available_orders(pool: &PgPool, limit: i64) -> Result<Vec<OrderCard>> {
    let sql = format!(
        "{} WHERE o.detailed_status = $1 ORDER BY o.created_at DESC LIMIT $2",
        ORDER_CARD_SELECT
    );
    let rows = sqlx::query(&sql)
        .bind(DetailedStatus::SearchingCourier.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list available orders")?;

    rows.iter().map(order_card_from_row).collect()
}

/// Orders assigned to a courier with the given coarse status, most recent first
pub async fn list_courier_orders(
    pool: &PgPool,
    courier_id: i64,
    status: OrderStatus,
    limit: i64,
) -> Result<Vec<OrderCard>> {
    let sql = format!(
        "{} WHERE o.courier_id = $1 AND o.status = $2
         ORDER BY COALESCE(o.completed_at, o.accepted_at, o.created_at) DESC LIMIT $3",
        ORDER_CARD_SELECT
    );
    let rows = sqlx::query(&sql)
        .bind(courier_id)
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list courier orders")?;

    rows.iter().map(order_card_from_row).collect()
}

/// A client's orders in any of the given coarse statuses, most recent first
pub async fn list_client_orders(
    pool: &PgPool,
    client_id: i64,
    statuses: &[OrderStatus],
    limit: i64,
) -> Result<Vec<OrderCard>> {
    let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let sql = format!(
        "{} WHERE o.client_id = $1 AND o.status = ANY($2)
         ORDER BY COALESCE(o.completed_at, o.created_at) DESC LIMIT $3",
        ORDER_CARD_SELECT
    );
    let rows = sqlx::query(&sql)
        .bind(client_id)
        .bind(statuses)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list client orders")?;

    rows.iter().map(order_card_from_row).collect()
}

/// Pending and accepted orders across the service, for operators
pub async fn list_active_orders(pool: &PgPool, limit: i64) -> Result<Vec<OrderCard>> {
    let sql = format!(
        "{} WHERE o.status IN ('pending', 'accepted') ORDER BY o.created_at DESC LIMIT $1",
        ORDER_CARD_SELECT
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list active orders")?;

    rows.iter().map(order_card_from_row).collect()
}

// ---------------------------------------------------------------------------
// Courier stats, applications and ratings
// ---------------------------------------------------------------------------

/// Totals for a courier; zero when they never completed an order
pub async fn get_courier_stats(pool: &PgPool, courier_id: i64) -> Result<CourierStats> {
    let row = sqlx::query(
        "SELECT total_orders, total_earnings FROM courier_stats WHERE courier_id = $1",
    )
    .bind(courier_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read courier stats")?;

    Ok(row
        .map(|row| CourierStats {
            total_orders: row.get(0),
            total_earnings: row.get(1),
        })
        .unwrap_or_default())
}

pub async fn average_courier_rating(pool: &PgPool, courier_id: i64) -> Result<Option<f64>> {
    let row = sqlx::query("SELECT AVG(rating)::FLOAT8 FROM ratings WHERE courier_id = $1")
        .bind(courier_id)
        .fetch_one(pool)
        .await
        .context("Failed to read courier rating")?;

    Ok(row.get(0))
}

/// File a courier application. Returns `None` when one is already pending.
pub async fn create_courier_application(pool: &PgPool, telegram_id: i64) -> Result<Option<i64>> {
    debug!(telegram_id = %telegram_id, "Creating courier application");

    let row = sqlx::query(
        "INSERT INTO courier_applications (telegram_id, status) VALUES ($1, $2)
         ON CONFLICT (telegram_id) WHERE status = 'pending' DO NOTHING
         RETURNING id",
    )
    .bind(telegram_id)
    .bind(ApplicationStatus::Pending.as_str())
    .fetch_optional(pool)
    .await
    .context("Failed to create courier application")?;

    Ok(row.map(|row| row.get(0)))
}

pub async fn list_pending_applications(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<PendingApplication>> {
    let rows = sqlx::query(
        "SELECT a.telegram_id, u.first_name, u.username
         FROM courier_applications a
         JOIN users u ON u.telegram_id = a.telegram_id
         WHERE a.status = $1
         ORDER BY a.created_at DESC LIMIT $2",
    )
    .bind(ApplicationStatus::Pending.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list courier applications")?;

    Ok(rows
        .iter()
        .map(|row| PendingApplication {
            telegram_id: row.get(0),
            first_name: row.get(1),
            username: row.get(2),
        })
        .collect())
}

/// Approve or reject the applicant's pending application; approval makes them a courier.
/// Returns false when no pending application exists.
pub async fn review_courier_application(
    pool: &PgPool,
    telegram_id: i64,
    reviewer_id: i64,
    approve: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    debug!(telegram_id = %telegram_id, approve = %approve, "Reviewing courier application");

    let decision = if approve {
        ApplicationStatus::Approved
    } else {
        ApplicationStatus::Rejected
    };

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        "UPDATE courier_applications SET status = $3, reviewed_by = $2, reviewed_at = $4
         WHERE telegram_id = $1 AND status = $5",
    )
    .bind(telegram_id)
    .bind(reviewer_id)
    .bind(decision.as_str())
    .bind(now)
    .bind(ApplicationStatus::Pending.as_str())
    .execute(&mut *tx)
    .await
    .context("Failed to review courier application")?;

    if result.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back transaction")?;
        return Ok(false);
    }

    if approve {
        sqlx::query(
            "UPDATE users SET role = $2, updated_at = CURRENT_TIMESTAMP
             WHERE telegram_id = $1 AND role = $3",
        )
        .bind(telegram_id)
        .bind(Role::Courier.as_str())
        .bind(Role::Client.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to promote courier")?;
    }

    tx.commit().await.context("Failed to commit application review")?;
    Ok(true)
}

/// Rate the courier of a completed order. Only the order's client may rate,
/// once per order; returns `None` otherwise.
pub async fn create_rating(
    pool: &PgPool,
    order_id: i64,
    client_id: i64,
    rating: i32,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    debug!(order_id = %order_id, rating = %rating, "Creating rating");

    let row = sqlx::query(
        "INSERT INTO ratings (order_id, courier_id, client_id, rating, created_at)
         SELECT o.id, o.courier_id, o.client_id, $3, $4
         FROM orders o
         WHERE o.id = $1 AND o.client_id = $2 AND o.detailed_status = $5
           AND o.courier_id IS NOT NULL
         ON CONFLICT (order_id) DO NOTHING
         RETURNING id",
    )
    .bind(order_id)
    .bind(client_id)
    .bind(rating)
    .bind(now)
    .bind(DetailedStatus::Completed.as_str())
    .fetch_optional(pool)
    .await
    .context("Failed to create rating")?;

    Ok(row.map(|row| row.get(0)))
}

pub async fn list_recent_reviews(pool: &PgPool, limit: i64) -> Result<Vec<Review>> {
    let rows = sqlx::query(
        "SELECT r.rating, r.review, u.first_name
         FROM ratings r
         LEFT JOIN users u ON u.telegram_id = r.courier_id
         ORDER BY r.created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list reviews")?;

    Ok(rows
        .iter()
        .map(|row| Review {
            rating: row.get(0),
            review: row.get(1),
            courier_name: row.get(2),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

pub async fn service_stats(pool: &PgPool) -> Result<ServiceStats> {
    let row = sqlx::query(
        "SELECT
             (SELECT COUNT(*) FROM users WHERE role = 'client'),
             (SELECT COUNT(*) FROM users WHERE role = 'courier'),
             (SELECT COUNT(*) FROM users WHERE role = 'operator'),
             (SELECT COUNT(*) FROM orders),
             (SELECT COUNT(*) FROM orders WHERE status = 'completed'),
             (SELECT COALESCE(SUM(price), 0)::BIGINT FROM orders WHERE status = 'completed'),
             (SELECT COALESCE(AVG(price), 0)::BIGINT FROM orders WHERE status = 'completed')",
    )
    .fetch_one(pool)
    .await
    .context("Failed to read service stats")?;

    Ok(ServiceStats {
        clients: row.get(0),
        couriers: row.get(1),
        operators: row.get(2),
        total_orders: row.get(3),
        completed_orders: row.get(4),
        revenue: row.get(5),
        average_check: row.get(6),
    })
}

pub async fn order_counts(pool: &PgPool) -> Result<OrderCounts> {
    let row = sqlx::query(
        "SELECT
             COUNT(*) FILTER (WHERE status = 'pending'),
             COUNT(*) FILTER (WHERE status = 'accepted'),
             COUNT(*) FILTER (WHERE status = 'completed'),
             COUNT(*) FILTER (WHERE status = 'completed'
                 AND completed_at >= date_trunc('day', CURRENT_TIMESTAMP)),
             COALESCE(SUM(price) FILTER (WHERE status = 'completed'), 0)::BIGINT
         FROM orders",
    )
    .fetch_one(pool)
    .await
    .context("Failed to read order counts")?;

    Ok(OrderCounts {
        pending: row.get(0),
        accepted: row.get(1),
        completed: row.get(2),
        completed_today: row.get(3),
        revenue: row.get(4),
    })
}

// ---------------------------------------------------------------------------
// Subscriptions and settings
// ---------------------------------------------------------------------------

/// Insert an inactive subscription awaiting payment
pub async fn create_subscription(
    pool: &PgPool,
    client_id: i64,
    kind: SubscriptionType,
    price: i64,
    duration_days: i32,
) -> Result<Subscription> {
    debug!(client_id = %client_id, kind = %kind, "Creating subscription");

    let sql = format!(
        "INSERT INTO subscriptions (client_id, type, price, duration_days)
         VALUES ($1, $2, $3, $4)
         RETURNING {}",
        SUBSCRIPTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(client_id)
        .bind(kind.as_str())
        .bind(price)
        .bind(duration_days)
        .fetch_one(pool)
        .await
        .context("Failed to create subscription")?;

    subscription_from_row(&row)
}

pub async fn set_subscription_payment_id(
    pool: &PgPool,
    subscription_id: i64,
    payment_id: &str,
) -> Result<bool> {
    let result = sqlx::query("UPDATE subscriptions SET payment_id = $2 WHERE id = $1")
        .bind(subscription_id)
        .bind(payment_id)
        .execute(pool)
        .await
        .context("Failed to store subscription payment id")?;

    Ok(result.rows_affected() > 0)
}

/// Activate a subscription on its first successful payment
pub async fn mark_subscription_paid(
    pool: &PgPool,
    subscription_id: i64,
    payment_id: &str,
    payment_status: &str,
    now: DateTime<Utc>,
) -> Result<Option<Subscription>> {
    debug!(subscription_id = %subscription_id, payment_id = %payment_id, "Marking subscription paid");

    let sql = format!(
        "UPDATE subscriptions SET
             payment_status = $2, payment_id = $3, paid_at = $4, is_active = TRUE,
             end_date = $4 + make_interval(days => duration_days)
         WHERE id = $1 AND paid_at IS NULL
         RETURNING {}",
        SUBSCRIPTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(subscription_id)
        .bind(payment_status)
        .bind(payment_id)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to mark subscription paid")?;

    row.as_ref().map(subscription_from_row).transpose()
}

pub async fn get_setting(pool: &PgPool, key: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to read setting")?;

    Ok(row.map(|row| row.get(0)))
}
