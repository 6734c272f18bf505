use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Executor, Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{ChildLink, DbUser, DbUserSession, NONE_SENTINEL, Role, User, UserSession};
use crate::error::AppError;
use crate::models::{
    Child, DbChild, DbListItem, DbProgressEntry, DbSessionPlan, ListItem, ListKind,
    ProgressEntry, SessionPlan,
};

// Users

#[instrument(skip(executor))]
pub async fn find_user<'e, E>(executor: E, username: &str) -> Result<Option<User>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching user by username");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT username, role, child_link FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(executor)
    .await?;

    row.map(User::try_from).transpose()
}

#[instrument(skip(executor))]
pub async fn get_user<'e, E>(executor: E, username: &str) -> Result<User, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    match find_user(executor, username).await? {
        Some(user) => Ok(user),
        _ => Err(AppError::NotFound(format!("User '{}' not found", username))),
    }
}

#[instrument]
pub async fn get_all_users(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    info!("Getting all users");
    let rows = sqlx::query_as::<_, DbUser>(
        "SELECT username, role, child_link FROM users ORDER BY username",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(User::try_from).collect()
}

#[instrument]
pub async fn count_users(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// Without a password hash only the role and child link of an existing row change.
#[instrument(skip(executor, password_hash), fields(has_password = password_hash.is_some()))]
pub async fn upsert_user<'e, E>(
    executor: E,
    username: &str,
    password_hash: Option<&str>,
    role: Role,
    child_link: &ChildLink,
) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Upserting user");
    match password_hash {
        Some(hash) => {
            sqlx::query(
                "INSERT INTO users (username, password, role, child_link) VALUES (?, ?, ?, ?)
                 ON CONFLICT (username) DO UPDATE
                 SET password = excluded.password, role = excluded.role, child_link = excluded.child_link",
            )
            .bind(username)
            .bind(hash)
            .bind(role.as_str())
            .bind(child_link.as_str())
            .execute(executor)
            .await?;
        }
        None => {
            sqlx::query("UPDATE users SET role = ?, child_link = ? WHERE username = ?")
                .bind(role.as_str())
                .bind(child_link.as_str())
                .bind(username)
                .execute(executor)
                .await?;
        }
    }

    Ok(())
}

#[instrument(skip(executor))]
pub async fn set_user_child_link<'e, E>(
    executor: E,
    username: &str,
    child_link: &ChildLink,
) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("UPDATE users SET child_link = ? WHERE username = ?")
        .bind(child_link.as_str())
        .bind(username)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn replace_child_link<'e, E>(
    executor: E,
    child_name: &str,
    replacement: &ChildLink,
) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("UPDATE users SET child_link = ? WHERE child_link = ?")
        .bind(replacement.as_str())
        .bind(child_name)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip_all, fields(username))]
pub async fn update_user_password<'e, E>(
    executor: E,
    username: &str,
    password_hash: &str,
) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Updating user password");
    let res = sqlx::query("UPDATE users SET password = ? WHERE username = ?")
        .bind(password_hash)
        .bind(username)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_user_row<'e, E>(executor: E, username: &str) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Deleting user row");
    let res = sqlx::query("DELETE FROM users WHERE username = ?")
        .bind(username)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let stored: Option<(String,)> = sqlx::query_as("SELECT password FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    let Some((hash,)) = stored else {
        return Ok(None);
    };

    // A malformed hash is treated as a failed login rather than a server error.
    if !bcrypt::verify(password, &hash).unwrap_or(false) {
        return Ok(None);
    }

    find_user(pool, username).await
}

// Children

#[instrument(skip(executor))]
pub async fn find_child<'e, E>(executor: E, child_name: &str) -> Result<Option<Child>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, DbChild>(
        "SELECT child_name, parent_username, date_of_birth FROM children WHERE child_name = ?",
    )
    .bind(child_name)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Child::from))
}

#[instrument]
pub async fn get_all_children(pool: &Pool<Sqlite>) -> Result<Vec<Child>, AppError> {
    info!("Getting all children");
    let rows = sqlx::query_as::<_, DbChild>(
        "SELECT child_name, parent_username, date_of_birth FROM children ORDER BY child_name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Child::from).collect())
}

#[cfg(test)]
#[instrument(skip(executor))]
pub async fn upsert_child<'e, E>(
    executor: E,
    child_name: &str,
    parent_username: Option<&str>,
    date_of_birth: Option<NaiveDate>,
) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Upserting child");
    sqlx::query(
        "INSERT INTO children (child_name, parent_username, date_of_birth) VALUES (?, ?, ?)
         ON CONFLICT (child_name) DO UPDATE
         SET parent_username = excluded.parent_username, date_of_birth = excluded.date_of_birth",
    )
    .bind(child_name)
    .bind(parent_username.unwrap_or(NONE_SENTINEL))
    .bind(date_of_birth.map(|d| d.to_string()))
    .execute(executor)
    .await?;

    Ok(())
}

#[instrument(skip(executor))]
pub async fn upsert_child_details<'e, E>(
    executor: E,
    child_name: &str,
    date_of_birth: Option<NaiveDate>,
) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO children (child_name, parent_username, date_of_birth) VALUES (?, ?, ?)
         ON CONFLICT (child_name) DO UPDATE SET date_of_birth = excluded.date_of_birth",
    )
    .bind(child_name)
    .bind(NONE_SENTINEL)
    .bind(date_of_birth.map(|d| d.to_string()))
    .execute(executor)
    .await?;

    Ok(())
}

#[instrument(skip(executor))]
pub async fn set_child_parent<'e, E>(
    executor: E,
    child_name: &str,
    parent_username: Option<&str>,
) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("UPDATE children SET parent_username = ? WHERE child_name = ?")
        .bind(parent_username.unwrap_or(NONE_SENTINEL))
        .bind(child_name)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_child_row<'e, E>(executor: E, child_name: &str) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Deleting child row");
    let res = sqlx::query("DELETE FROM children WHERE child_name = ?")
        .bind(child_name)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

// Lookup lists

#[instrument]
pub async fn get_list_items(pool: &Pool<Sqlite>, kind: ListKind) -> Result<Vec<ListItem>, AppError> {
    let query = format!("SELECT name FROM {} ORDER BY name", kind.table_name());
    let rows = sqlx::query_as::<_, DbListItem>(&query)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(ListItem::from).collect())
}

#[instrument]
pub async fn upsert_list_item(
    pool: &Pool<Sqlite>,
    kind: ListKind,
    name: &str,
) -> Result<bool, AppError> {
    info!("Adding list item");
    let query = format!(
        "INSERT INTO {} (name) VALUES (?) ON CONFLICT (name) DO NOTHING",
        kind.table_name()
    );
    let res = sqlx::query(&query).bind(name).execute(pool).await?;

    Ok(res.rows_affected() > 0)
}

#[instrument]
pub async fn delete_list_item(
    pool: &Pool<Sqlite>,
    kind: ListKind,
    name: &str,
) -> Result<bool, AppError> {
    info!("Deleting list item");
    let query = format!("DELETE FROM {} WHERE name = ?", kind.table_name());
    let res = sqlx::query(&query).bind(name).execute(pool).await?;

    Ok(res.rows_affected() > 0)
}

// Progress entries

#[instrument(skip(pool, entry), fields(child = %entry.child_name, date = %entry.date))]
pub async fn save_progress(pool: &Pool<Sqlite>, entry: &ProgressEntry) -> Result<i64, AppError> {
    info!("Saving progress entry");
    let res = sqlx::query(
        "INSERT INTO progress (date, child_name, discipline, goal_area, status, notes, media_path)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.date)
    .bind(&entry.child_name)
    .bind(&entry.discipline)
    .bind(&entry.goal_area)
    .bind(entry.status.as_str())
    .bind(&entry.notes)
    .bind(entry.media_path.as_deref())
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_all_progress(pool: &Pool<Sqlite>) -> Result<Vec<ProgressEntry>, AppError> {
    info!("Getting all progress entries");
    let rows = sqlx::query_as::<_, DbProgressEntry>(
        "SELECT date, child_name, discipline, goal_area, status, notes, media_path
         FROM progress
         ORDER BY date DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProgressEntry::try_from).collect()
}

#[instrument]
pub async fn get_progress_for_child(
    pool: &Pool<Sqlite>,
    child_name: &str,
) -> Result<Vec<ProgressEntry>, AppError> {
    info!("Getting progress entries for child");
    let rows = sqlx::query_as::<_, DbProgressEntry>(
        "SELECT date, child_name, discipline, goal_area, status, notes, media_path
         FROM progress
         WHERE child_name = ?
         ORDER BY date DESC, id DESC",
    )
    .bind(child_name)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProgressEntry::try_from).collect()
}

// Session plans

#[instrument(skip(pool, plan), fields(date = %plan.date, lead = %plan.lead_staff))]
pub async fn save_plan(pool: &Pool<Sqlite>, plan: &SessionPlan) -> Result<i64, AppError> {
    info!("Saving session plan");
    let res = sqlx::query(
        "INSERT INTO session_plans (date, lead_staff, support_staff, warm_up, learning_block,
             regulation_break, social_play, closing_routine, materials_needed, internal_notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&plan.date)
    .bind(&plan.lead_staff)
    .bind(plan.support_staff_text())
    .bind(&plan.warm_up)
    .bind(&plan.learning_block)
    .bind(&plan.regulation_break)
    .bind(&plan.social_play)
    .bind(&plan.closing_routine)
    .bind(&plan.materials_needed)
    .bind(&plan.internal_notes)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_all_plans(pool: &Pool<Sqlite>) -> Result<Vec<SessionPlan>, AppError> {
    info!("Getting all session plans");
    let rows = sqlx::query_as::<_, DbSessionPlan>(
        "SELECT date, lead_staff, support_staff, warm_up, learning_block, regulation_break,
             social_play, closing_routine, materials_needed, internal_notes
         FROM session_plans
         ORDER BY date DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SessionPlan::from).collect())
}

// Sessions

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    username: &str,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (username, token, expires_at) VALUES (?, ?, ?)")
        .bind(username)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, username, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
