use chrono::{Duration, NaiveDate, Utc};
use rocket::State;
use rocket::http::{Cookie, CookieJar, Header, SameSite, Status};
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::access::{DashboardScope, filter_dashboard_rows};
use crate::auth::{ChildLink, Page, Permission, Role, SESSION_COOKIE, User, UserSession};
use crate::db::{
    authenticate_user, create_user_session, delete_list_item, find_child, get_all_children,
    get_all_plans, get_all_progress, get_all_users, get_list_items, get_progress_for_child,
    invalidate_session, save_plan, save_progress, upsert_list_item,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::linkage::{self, LinkRequest};
use crate::models::{
    Child, ListItem, ListKind, ProgressEntry, ProgressStatus, SessionPlan, check_support_staff_name,
};
use crate::reporting::{
    CsvRecord, ExportKind, StatusSummary, date_range_view, export_csv, export_filename,
    status_summary,
};
use crate::validation::{
    ApiError, AppErrorExt, JsonValidateExt, ToValidationResponse, USERNAME_PATTERN,
    ValidationErrorWrapper, parse_optional_date, validate_record_key,
};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageData {
    pub id: Page,
    pub title: String,
}

impl From<&Page> for PageData {
    fn from(page: &Page) -> Self {
        Self {
            id: *page,
            title: page.title().to_string(),
        }
    }
}

fn pages_for(user: &User) -> Vec<PageData> {
    user.visible_pages().iter().map(PageData::from).collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserData {
    pub username: String,
    pub role: String,
    pub child_link: String,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            role: user.role.to_string(),
            child_link: user.child_link.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub pages: Vec<PageData>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserData,
    pub pages: Vec<PageData>,
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + Duration::hours(config.session_hours);

            create_user_session(db, &user.username, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            cookies.add_private(
                Cookie::build((SESSION_COOKIE, token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(config.session_hours)),
            );

            info!(username = %user.username, role = %user.role, "Login succeeded");

            Ok(Json(LoginResponse {
                success: true,
                pages: pages_for(&user),
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            pages: Vec::new(),
            error: Some("Incorrect username or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Status {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(err) = invalidate_session(db, &token).await {
            err.log_and_record("Logout");
        }
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<MeResponse> {
    Json(MeResponse {
        pages: pages_for(&user),
        user: UserData::from(user),
    })
}

// Admin: users

#[get("/admin/users")]
pub async fn api_get_all_users(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserData>>, ApiError> {
    user.require_permission(Permission::ManageUsers)
        .validate_custom()?;

    let users = get_all_users(db).await.validate_custom()?;

    Ok(Json(users.into_iter().map(UserData::from).collect()))
}

#[derive(Deserialize, Validate)]
pub struct SaveUserRequest {
    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    password: Option<String>,
    role: Role,
    // Omitted keeps the current link, "None" clears it, anything else names a child.
    child_link: Option<String>,
}

#[derive(Validate)]
struct UsernameInput {
    #[validate(regex(
        path = *USERNAME_PATTERN,
        message = "Usernames may only contain letters, digits, '.', '_', '-' and '@'"
    ))]
    username: String,
}

fn validate_username(username: &str) -> Result<String, ApiError> {
    let input = UsernameInput {
        username: validate_record_key("Username", username).validate_custom()?,
    };
    input
        .validate()
        .map_err(|e| ApiError::from(ValidationErrorWrapper(e)))?;
    Ok(input.username)
}

#[put("/admin/users/<username>", data = "<request>")]
pub async fn api_save_user(
    username: &str,
    request: Json<SaveUserRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserData>, ApiError> {
    user.require_permission(Permission::ManageUsers)
        .validate_custom()?;

    let username = validate_username(username)?;
    let validated = request.validate_custom()?;

    if username == user.username && validated.role != Role::Admin {
        return Err(AppError::Validation(
            "You cannot remove the admin role from your own account".to_string(),
        )
        .to_validation_response());
    }

    let link_request = match validated.child_link.as_deref().map(str::trim) {
        None => LinkRequest::Keep,
        Some(link) => match ChildLink::parse(link) {
            ChildLink::Child(name) => LinkRequest::Child(name),
            ChildLink::None => LinkRequest::Clear,
            ChildLink::All if validated.role.is_parent() => LinkRequest::Clear,
            ChildLink::All => LinkRequest::Keep,
        },
    };

    let saved = linkage::save_user(
        db,
        &username,
        validated.password.as_deref(),
        validated.role,
        link_request,
    )
    .await
    .validate_custom()?;

    Ok(Json(UserData::from(saved)))
}

#[derive(Deserialize)]
pub struct RoleChangeRequest {
    role: Role,
}

#[put("/admin/users/<username>/role", data = "<request>")]
pub async fn api_change_role(
    username: &str,
    request: Json<RoleChangeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserData>, ApiError> {
    user.require_permission(Permission::ManageUsers)
        .validate_custom()?;

    if username == user.username && request.role != Role::Admin {
        return Err(AppError::Validation(
            "You cannot remove the admin role from your own account".to_string(),
        )
        .to_validation_response());
    }

    let updated = linkage::reassign_user_role(db, username, request.role)
        .await
        .validate_custom()?;

    Ok(Json(UserData::from(updated)))
}

#[delete("/admin/users/<username>")]
pub async fn api_delete_user(
    username: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    user.require_permission(Permission::ManageUsers)
        .validate_custom()?;

    linkage::delete_user(db, &user, username)
        .await
        .validate_custom()?;

    Ok(Status::NoContent)
}

// Admin: children

#[get("/admin/children")]
pub async fn api_get_all_children(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Child>>, ApiError> {
    user.require_permission(Permission::ManageChildren)
        .validate_custom()?;

    let children = get_all_children(db).await.validate_custom()?;

    Ok(Json(children))
}

#[derive(Deserialize, Validate)]
pub struct SaveChildRequest {
    parent_username: Option<String>,
    #[validate(length(equal = 10, message = "Date of birth must be YYYY-MM-DD"))]
    date_of_birth: Option<String>,
}

#[put("/admin/children/<child_name>", data = "<request>")]
pub async fn api_save_child(
    child_name: &str,
    request: Json<SaveChildRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Child>, ApiError> {
    user.require_permission(Permission::ManageChildren)
        .validate_custom()?;

    let child_name = validate_record_key("Child name", child_name).validate_custom()?;
    let validated = request.validate_custom()?;

    let date_of_birth = parse_optional_date("date_of_birth", validated.date_of_birth.as_deref())
        .validate_custom()?;
    let parent = validated
        .parent_username
        .as_deref()
        .map(str::trim)
        .and_then(|p| ChildLink::parse(p).child_name().map(String::from));

    let saved = linkage::save_child(db, &child_name, parent.as_deref(), date_of_birth)
        .await
        .validate_custom()?;

    Ok(Json(saved))
}

#[delete("/admin/children/<child_name>")]
pub async fn api_delete_child(
    child_name: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    user.require_permission(Permission::ManageChildren)
        .validate_custom()?;

    linkage::unlink_child(db, child_name)
        .await
        .validate_custom()?;

    Ok(Status::NoContent)
}

#[derive(Deserialize, Validate)]
pub struct LinkParentRequest {
    #[validate(length(min = 1, message = "Parent username is required"))]
    parent_username: String,
    #[validate(length(min = 1, message = "Child name is required"))]
    child_name: String,
}

#[post("/admin/link", data = "<request>")]
pub async fn api_link_parent(
    request: Json<LinkParentRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    user.require_permission(Permission::ManageChildren)
        .validate_custom()?;

    let validated = request.validate_custom()?;
    let parent_username =
        validate_record_key("Parent username", &validated.parent_username).validate_custom()?;
    let child_name = validate_record_key("Child name", &validated.child_name).validate_custom()?;

    linkage::link(db, &parent_username, &child_name)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

// Lookup lists

#[derive(Deserialize, Validate)]
pub struct ListItemRequest {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    name: String,
}

#[get("/lists/<kind>")]
pub async fn api_get_list(
    kind: ListKind,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ListItem>>, ApiError> {
    user.require_permission(Permission::ViewLists)
        .validate_custom()?;

    let items = get_list_items(db, kind).await.validate_custom()?;

    Ok(Json(items))
}

#[post("/admin/lists/<kind>", data = "<request>")]
pub async fn api_add_list_item(
    kind: ListKind,
    request: Json<ListItemRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    user.require_permission(Permission::ManageLists)
        .validate_custom()?;

    let validated = request.validate_custom()?;
    let name = validated.name.trim();
    if name.is_empty() {
        return Err(
            AppError::Validation(format!("{} name is required", kind.label()))
                .to_validation_response(),
        );
    }

    let created = upsert_list_item(db, kind, name).await.validate_custom()?;

    Ok(if created { Status::Created } else { Status::Ok })
}

#[delete("/admin/lists/<kind>/<name>")]
pub async fn api_delete_list_item(
    kind: ListKind,
    name: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    user.require_permission(Permission::ManageLists)
        .validate_custom()?;

    if delete_list_item(db, kind, name).await.validate_custom()? {
        Ok(Status::NoContent)
    } else {
        Err(AppError::NotFound(format!("{} '{}'", kind.label(), name)).to_validation_response())
    }
}

// Progress tracker

#[derive(Serialize, Deserialize)]
pub struct ChildSummary {
    pub child_name: String,
    pub date_of_birth: Option<NaiveDate>,
}

#[get("/children")]
pub async fn api_get_children(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ChildSummary>>, ApiError> {
    user.require_permission(Permission::ViewAllChildren)
        .validate_custom()?;

    let children = get_all_children(db).await.validate_custom()?;

    Ok(Json(
        children
            .into_iter()
            .map(|c| ChildSummary {
                child_name: c.child_name,
                date_of_birth: c.date_of_birth,
            })
            .collect(),
    ))
}

#[derive(Deserialize, Validate)]
pub struct ProgressRequest {
    date: Option<String>,
    #[validate(length(min = 1, message = "Child name is required"))]
    child_name: String,
    #[validate(length(min = 1, message = "Discipline is required"))]
    discipline: String,
    #[validate(length(min = 1, message = "Goal area is required"))]
    goal_area: String,
    status: ProgressStatus,
    #[serde(default)]
    #[validate(length(max = 4000, message = "Notes are limited to 4000 characters"))]
    notes: String,
    media_path: Option<String>,
}

#[post("/progress", data = "<request>")]
pub async fn api_save_progress(
    request: Json<ProgressRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    user.require_permission(Permission::LogProgress)
        .validate_custom()?;

    let validated = request.validate_custom()?;
    let date = parse_optional_date("date", validated.date.as_deref())
        .validate_custom()?
        .unwrap_or_else(|| Utc::now().date_naive());

    let child_name = validate_record_key("Child name", &validated.child_name).validate_custom()?;
    if find_child(db.inner(), &child_name)
        .await
        .validate_custom()?
        .is_none()
    {
        return Err(AppError::NotFound(format!("Child '{}'", child_name)).to_validation_response());
    }

    let entry = ProgressEntry {
        date: date.to_string(),
        child_name,
        discipline: validated.discipline.trim().to_string(),
        goal_area: validated.goal_area.trim().to_string(),
        status: validated.status,
        notes: validated.notes,
        media_path: validated
            .media_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()),
    };

    save_progress(db, &entry).await.validate_custom()?;

    info!(child = %entry.child_name, status = %entry.status, "Progress saved");
    Ok(Status::Created)
}

// Daily planner

#[derive(Deserialize, Validate)]
pub struct PlanRequest {
    date: Option<String>,
    #[validate(length(min = 1, message = "Session lead is required"))]
    lead_staff: String,
    #[serde(default)]
    support_staff: Vec<String>,
    #[serde(default)]
    warm_up: String,
    #[serde(default)]
    learning_block: String,
    #[serde(default)]
    regulation_break: String,
    #[serde(default)]
    social_play: String,
    #[serde(default)]
    closing_routine: String,
    #[serde(default)]
    materials_needed: String,
    #[serde(default)]
    internal_notes: String,
}

#[post("/plans", data = "<request>")]
pub async fn api_save_plan(
    request: Json<PlanRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    user.require_permission(Permission::PlanSessions)
        .validate_custom()?;

    let validated = request.validate_custom()?;
    let date = parse_optional_date("date", validated.date.as_deref())
        .validate_custom()?
        .unwrap_or_else(|| Utc::now().date_naive());

    let support_staff: Vec<String> = validated
        .support_staff
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "None")
        .map(String::from)
        .collect();
    for name in &support_staff {
        check_support_staff_name(name).validate_custom()?;
    }

    let plan = SessionPlan {
        date: date.to_string(),
        lead_staff: validated.lead_staff.trim().to_string(),
        support_staff,
        warm_up: validated.warm_up,
        learning_block: validated.learning_block,
        regulation_break: validated.regulation_break,
        social_play: validated.social_play,
        closing_routine: validated.closing_routine,
        materials_needed: validated.materials_needed,
        internal_notes: validated.internal_notes,
    };

    save_plan(db, &plan).await.validate_custom()?;

    info!(date = %plan.date, lead = %plan.lead_staff, "Session plan finalized");
    Ok(Status::Created)
}

fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), ApiError> {
    let start = parse_optional_date("start", start).validate_custom()?;
    let end = parse_optional_date("end", end).validate_custom()?;
    Ok((start, end))
}

#[get("/plans?<start>&<end>")]
pub async fn api_get_plans(
    start: Option<&str>,
    end: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SessionPlan>>, ApiError> {
    user.require_permission(Permission::PlanSessions)
        .validate_custom()?;

    let (start, end) = parse_range(start, end)?;
    let plans = get_all_plans(db).await.validate_custom()?;

    Ok(Json(date_range_view(&plans, start, end).validate_custom()?))
}

#[derive(Responder)]
#[response(content_type = "text/csv")]
pub struct CsvDownload {
    body: String,
    disposition: Header<'static>,
}

impl CsvDownload {
    fn build<T: CsvRecord>(rows: &[T], kind: ExportKind) -> Result<Self, AppError> {
        let filename = export_filename(kind, Utc::now().date_naive());
        Ok(Self {
            body: export_csv(rows)?,
            disposition: Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", filename),
            ),
        })
    }
}

#[get("/plans/export?<start>&<end>")]
pub async fn api_export_plans(
    start: Option<&str>,
    end: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<CsvDownload, ApiError> {
    user.require_permission(Permission::ExportReports)
        .validate_custom()?;

    let (start, end) = parse_range(start, end)?;
    let plans = get_all_plans(db).await.validate_custom()?;
    let filtered = date_range_view(&plans, start, end).validate_custom()?;

    info!(rows = filtered.len(), "Exporting session plans");
    CsvDownload::build(&filtered, ExportKind::SessionPlans).validate_custom()
}

#[get("/progress/export?<start>&<end>")]
pub async fn api_export_progress(
    start: Option<&str>,
    end: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<CsvDownload, ApiError> {
    user.require_permission(Permission::ExportReports)
        .validate_custom()?;

    let (start, end) = parse_range(start, end)?;
    let progress = get_all_progress(db).await.validate_custom()?;
    let filtered = date_range_view(&progress, start, end).validate_custom()?;

    info!(rows = filtered.len(), "Exporting progress entries");
    CsvDownload::build(&filtered, ExportKind::Progress).validate_custom()
}

// Dashboard

#[derive(Serialize, Deserialize)]
pub struct DashboardResponse {
    pub scope: String,
    pub progress: Vec<ProgressEntry>,
    pub summary: StatusSummary,
    pub plans: Option<Vec<SessionPlan>>,
}

#[get("/dashboard?<start>&<end>")]
pub async fn api_dashboard(
    start: Option<&str>,
    end: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let scope = DashboardScope::for_user(&user).validate_custom()?;
    let (start, end) = parse_range(start, end)?;

    let (scope_label, rows) = match &scope {
        DashboardScope::AllChildren => (
            ChildLink::All.to_string(),
            get_all_progress(db).await.validate_custom()?,
        ),
        DashboardScope::Child(child) => (
            child.clone(),
            get_progress_for_child(db, child).await.validate_custom()?,
        ),
        DashboardScope::Nothing => (ChildLink::None.to_string(), Vec::new()),
    };

    let rows = filter_dashboard_rows(user.role, &user.child_link, rows);
    let progress = date_range_view(&rows, start, end).validate_custom()?;

    let plans = match scope {
        DashboardScope::AllChildren if user.has_permission(Permission::PlanSessions) => {
            let plans = get_all_plans(db).await.validate_custom()?;
            Some(date_range_view(&plans, start, end).validate_custom()?)
        }
        _ => None,
    };

    Ok(Json(DashboardResponse {
        scope: scope_label,
        summary: status_summary(&progress),
        progress,
        plans,
    }))
}
