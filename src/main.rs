#[macro_use]
extern crate rocket;

mod access;
mod api;
mod auth;
mod db;
mod env;
mod error;
mod linkage;
mod models;
mod reporting;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use std::str::FromStr;

use api::{
    api_add_list_item, api_change_role, api_dashboard, api_delete_child, api_delete_list_item,
    api_delete_user, api_export_plans, api_export_progress, api_get_all_children,
    api_get_all_users, api_get_children, api_get_list, api_get_plans, api_link_parent,
    api_login, api_logout, api_me, api_save_child, api_save_plan, api_save_progress,
    api_save_user, health,
};
use auth::{Role, forbidden_api, unauthorized_api};
use db::{clean_expired_sessions, count_users};
use env::{AppConfig, load_environment};
use error::AppError;
use linkage::LinkRequest;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_tracing();

    let (pool, config) = match prepare().await {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    init_rocket(pool, config).await
}

async fn prepare() -> Result<(SqlitePool, AppConfig), Error> {
    let config = AppConfig::from_env()?;

    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed successfully");

    bootstrap_admin(&pool, &config).await?;

    Ok((pool, config))
}

async fn bootstrap_admin(pool: &SqlitePool, config: &AppConfig) -> Result<(), Error> {
    if count_users(pool).await? > 0 {
        return Ok(());
    }

    match &config.bootstrap_admin {
        Some(admin) => {
            linkage::save_user(
                pool,
                &admin.username,
                Some(&admin.password),
                Role::Admin,
                LinkRequest::Keep,
            )
            .await?;
            info!(username = %admin.username, "Created initial admin account");
        }
        None => {
            warn!("No users exist and TILP_ADMIN_USERNAME/TILP_ADMIN_PASSWORD are unset; nobody can log in");
        }
    }

    Ok(())
}

pub async fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!("Starting TILP Connect");

    rocket::build()
        .manage(pool)
        .manage(config)
        .mount(
            "/api",
            routes![
                health,
                api_login,
                api_logout,
                api_me,
                api_get_all_users,
                api_save_user,
                api_change_role,
                api_delete_user,
                api_get_all_children,
                api_save_child,
                api_delete_child,
                api_link_parent,
                api_get_list,
                api_add_list_item,
                api_delete_list_item,
                api_get_children,
                api_save_progress,
                api_export_progress,
                api_save_plan,
                api_get_plans,
                api_export_plans,
                api_dashboard,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .attach(TelemetryFairing)
}
