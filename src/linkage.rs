// All writes to users.child_link and children.parent_username go through here,
// one transaction per operation.

use chrono::NaiveDate;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::auth::{ChildLink, Role, User};
use crate::db;
use crate::error::AppError;
use crate::models::Child;

#[instrument(skip(pool))]
pub async fn link(
    pool: &Pool<Sqlite>,
    parent_username: &str,
    child_name: &str,
) -> Result<(), AppError> {
    if parent_username.trim().is_empty() || child_name.trim().is_empty() {
        return Err(AppError::Validation(
            "Parent username and child name are required".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    link_in(&mut tx, parent_username, child_name).await?;
    tx.commit().await?;

    info!("Linked parent to child");
    Ok(())
}

async fn link_in(
    conn: &mut SqliteConnection,
    parent_username: &str,
    child_name: &str,
) -> Result<(), AppError> {
    let parent = db::get_user(&mut *conn, parent_username).await?;

    if !parent.role.is_parent() {
        return Err(AppError::Validation(format!(
            "User '{}' has role '{}'; only parent accounts can be linked to a child",
            parent_username, parent.role
        )));
    }

    let child = db::find_child(&mut *conn, child_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Child '{}' not found", child_name)))?;

    if let Some(existing) = child.parent_username.as_deref() {
        if existing != parent_username {
            warn!(child = %child_name, existing = %existing, requested = %parent_username, "Rejected link to an already linked child");
            return Err(AppError::LinkageConflict(format!(
                "Child '{}' is already linked to parent '{}'",
                child_name, existing
            )));
        }
    }

    if let ChildLink::Child(previous) = &parent.child_link {
        if previous != child_name {
            release_child_in(&mut *conn, previous, parent_username).await?;
        }
    }

    db::set_child_parent(&mut *conn, child_name, Some(parent_username)).await?;
    db::set_user_child_link(&mut *conn, parent_username, &ChildLink::Child(child_name.to_string()))
        .await?;

    Ok(())
}

async fn release_child_in(
    conn: &mut SqliteConnection,
    child_name: &str,
    parent_username: &str,
) -> Result<(), AppError> {
    if let Some(child) = db::find_child(&mut *conn, child_name).await? {
        if child.parent_username.as_deref() == Some(parent_username) {
            db::set_child_parent(&mut *conn, child_name, None).await?;
        }
    }
    Ok(())
}

async fn unlink_parent_in(conn: &mut SqliteConnection, parent: &User) -> Result<(), AppError> {
    if let Some(child_name) = parent.child_link.child_name() {
        release_child_in(&mut *conn, child_name, &parent.username).await?;
    }
    db::set_user_child_link(&mut *conn, &parent.username, &ChildLink::None).await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn unlink_child(pool: &Pool<Sqlite>, child_name: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    if db::find_child(&mut *tx, child_name).await?.is_none() {
        return Err(AppError::NotFound(format!("Child '{}' not found", child_name)));
    }

    let relinked = db::replace_child_link(&mut *tx, child_name, &ChildLink::All).await?;
    db::delete_child_row(&mut *tx, child_name).await?;

    tx.commit().await?;

    info!(relinked_users = relinked, "Deleted child");
    Ok(())
}

#[instrument(skip(pool, actor), fields(actor = %actor.username))]
pub async fn delete_user(
    pool: &Pool<Sqlite>,
    actor: &User,
    username: &str,
) -> Result<(), AppError> {
    if actor.username == username {
        return Err(AppError::Validation(
            "You cannot delete the account you are logged in with".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let user = db::get_user(&mut *tx, username).await?;

    if let Some(child_name) = user.child_link.child_name() {
        release_child_in(&mut tx, child_name, username).await?;
    }

    db::delete_user_row(&mut *tx, username).await?;

    tx.commit().await?;

    info!("Deleted user");
    Ok(())
}

#[instrument(skip(pool))]
pub async fn reassign_user_role(
    pool: &Pool<Sqlite>,
    username: &str,
    new_role: Role,
) -> Result<User, AppError> {
    let mut tx = pool.begin().await?;
    let user = reassign_role_in(&mut tx, username, new_role).await?;
    tx.commit().await?;

    info!(role = %new_role, "Reassigned user role");
    Ok(user)
}

async fn reassign_role_in(
    conn: &mut SqliteConnection,
    username: &str,
    new_role: Role,
) -> Result<User, AppError> {
    let user = db::get_user(&mut *conn, username).await?;

    let child_link = if new_role.is_parent() {
        match user.child_link {
            ChildLink::All => ChildLink::None,
            link => link,
        }
    } else {
        if let Some(child_name) = user.child_link.child_name() {
            release_child_in(&mut *conn, child_name, username).await?;
        }
        ChildLink::All
    };

    db::upsert_user(&mut *conn, username, None, new_role, &child_link).await?;

    Ok(User {
        username: username.to_string(),
        role: new_role,
        child_link,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRequest {
    Keep,
    Clear,
    Child(String),
}

#[instrument(skip(pool, password), fields(has_password = password.is_some()))]
pub async fn save_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: Option<&str>,
    role: Role,
    link_request: LinkRequest,
) -> Result<User, AppError> {
    if let (false, LinkRequest::Child(child_name)) = (role.is_parent(), &link_request) {
        return Err(AppError::Validation(format!(
            "Only parent accounts can be linked to a child (requested '{}')",
            child_name
        )));
    }

    let password_hash = password.map(db::hash_password).transpose()?;

    let mut tx = pool.begin().await?;

    match db::find_user(&mut *tx, username).await? {
        Some(existing) => {
            if existing.role != role {
                reassign_role_in(&mut tx, username, role).await?;
            }
            if let Some(hash) = password_hash.as_deref() {
                db::update_user_password(&mut *tx, username, hash).await?;
            }
        }
        None => {
            let hash = password_hash.as_deref().ok_or_else(|| {
                AppError::Validation("A password is required for a new account".to_string())
            })?;
            let initial_link = if role.is_parent() {
                ChildLink::None
            } else {
                ChildLink::All
            };
            db::upsert_user(&mut *tx, username, Some(hash), role, &initial_link).await?;
        }
    }

    if role.is_parent() {
        match link_request {
            LinkRequest::Keep => {}
            LinkRequest::Clear => {
                let user = db::get_user(&mut *tx, username).await?;
                unlink_parent_in(&mut tx, &user).await?;
            }
            LinkRequest::Child(child_name) => link_in(&mut tx, username, &child_name).await?,
        }
    }

    let saved = db::get_user(&mut *tx, username).await?;

    tx.commit().await?;

    info!(role = %saved.role, child_link = %saved.child_link, "Saved user");
    Ok(saved)
}

#[instrument(skip(pool))]
pub async fn save_child(
    pool: &Pool<Sqlite>,
    child_name: &str,
    parent_username: Option<&str>,
    date_of_birth: Option<NaiveDate>,
) -> Result<Child, AppError> {
    let mut tx = pool.begin().await?;

    let existing = db::find_child(&mut *tx, child_name).await?;
    db::upsert_child_details(&mut *tx, child_name, date_of_birth).await?;

    let current_parent = existing.and_then(|c| c.parent_username);

    match (current_parent.as_deref(), parent_username) {
        (Some(current), Some(requested)) if current == requested => {}
        (_, Some(requested)) => link_in(&mut tx, requested, child_name).await?,
        (Some(current), None) => {
            db::set_child_parent(&mut *tx, child_name, None).await?;
            if let Some(parent) = db::find_user(&mut *tx, current).await? {
                if parent.child_link.child_name() == Some(child_name) {
                    db::set_user_child_link(&mut *tx, current, &ChildLink::None).await?;
                }
            }
        }
        (None, None) => {}
    }

    let saved = db::find_child(&mut *tx, child_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Child '{}' not found", child_name)))?;

    tx.commit().await?;

    info!(parent = ?saved.parent_username, "Saved child");
    Ok(saved)
}
