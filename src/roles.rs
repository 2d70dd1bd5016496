//! Role resolution over the single `users.role` column

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::config::OrdersConfig;
use crate::db;
use crate::models::Role;

/// Current role of a Telegram user; unknown users are clients
pub async fn resolve(pool: &PgPool, telegram_id: i64) -> Result<Role> {
    Ok(db::get_user_role(pool, telegram_id)
        .await?
        .unwrap_or(Role::Client))
}

/// Write configured staff ids into the role column.
/// Operators go first so an id listed twice ends up admin.
pub async fn seed_configured_roles(pool: &PgPool, orders: &OrdersConfig) -> Result<()> {
    for id in &orders.operator_ids {
        db::seed_user_role(pool, *id, Role::Operator).await?;
    }
    for id in &orders.admin_ids {
        db::seed_user_role(pool, *id, Role::Admin).await?;
    }

    info!(
        admins = orders.admin_ids.len(),
        operators = orders.operator_ids.len(),
        "Configured roles seeded"
    );
    Ok(())
}

/// Outcome of an admin promoting a user to operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Promoted,
    /// The user never talked to the bot
    UnknownUser,
    /// Admins keep their role
    AlreadyAdmin,
}

pub async fn promote_to_operator(pool: &PgPool, telegram_id: i64) -> Result<Promotion> {
    match db::get_user_role(pool, telegram_id).await? {
        None => Ok(Promotion::UnknownUser),
        Some(Role::Admin) => Ok(Promotion::AlreadyAdmin),
        Some(_) => {
            db::set_user_role(pool, telegram_id, Role::Operator).await?;
            info!(telegram_id = %telegram_id, "User promoted to operator");
            Ok(Promotion::Promoted)
        }
    }
}
