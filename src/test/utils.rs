#[cfg(test)]
pub mod test_db {
    use crate::auth::{ChildLink, Role};
    use crate::db::{hash_password, save_plan, save_progress, upsert_child, upsert_list_item, upsert_user};
    use crate::error::AppError;
    use crate::linkage;
    use crate::models::{ListKind, ProgressEntry, ProgressStatus, SessionPlan};
    use chrono::NaiveDate;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        children: Vec<TestChild>,
        links: Vec<(String, String)>,
        list_items: Vec<(ListKind, String)>,
        progress: Vec<ProgressEntry>,
        plans: Vec<SessionPlan>,
    }

    pub struct TestUser {
        pub username: String,
        pub role: Role,
        pub password: String,
    }

    pub struct TestChild {
        pub child_name: String,
        pub date_of_birth: Option<NaiveDate>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, username: &str, role: Role) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn admin(self, username: &str) -> Self {
            self.user(username, Role::Admin)
        }

        pub fn parent(mut self, username: &str, child: Option<&str>) -> Self {
            if let Some(child) = child {
                self.links.push((username.to_string(), child.to_string()));
            }
            self.user(username, Role::Parent)
        }

        pub fn child(mut self, child_name: &str) -> Self {
            self.children.push(TestChild {
                child_name: child_name.to_string(),
                date_of_birth: None,
            });
            self
        }

        pub fn list_item(mut self, kind: ListKind, name: &str) -> Self {
            self.list_items.push((kind, name.to_string()));
            self
        }

        pub fn progress(mut self, date: &str, child_name: &str, status: ProgressStatus) -> Self {
            self.progress.push(ProgressEntry {
                date: date.to_string(),
                child_name: child_name.to_string(),
                discipline: "OT".to_string(),
                goal_area: "Fine Motor".to_string(),
                status,
                notes: format!("Session notes for {}", child_name),
                media_path: None,
            });
            self
        }

        pub fn plan(mut self, date: &str, lead_staff: &str) -> Self {
            self.plans.push(SessionPlan {
                date: date.to_string(),
                lead_staff: lead_staff.to_string(),
                support_staff: vec!["Sam".to_string(), "Lee".to_string()],
                warm_up: "Circle time".to_string(),
                learning_block: "Matching".to_string(),
                regulation_break: "Swing".to_string(),
                social_play: "Turn taking".to_string(),
                closing_routine: "Goodbye song".to_string(),
                materials_needed: "Cards".to_string(),
                internal_notes: "Watch for fatigue".to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            for user in &self.users {
                let hash = hash_password(&user.password)?;
                let link = if user.role.is_parent() {
                    ChildLink::None
                } else {
                    ChildLink::All
                };
                upsert_user(&pool, &user.username, Some(&hash), user.role, &link).await?;
            }

            for child in &self.children {
                upsert_child(&pool, &child.child_name, None, child.date_of_birth).await?;
            }

            for (parent, child) in &self.links {
                linkage::link(&pool, parent, child).await?;
            }

            for (kind, name) in &self.list_items {
                upsert_list_item(&pool, *kind, name).await?;
            }

            for entry in &self.progress {
                save_progress(&pool, entry).await?;
            }

            for plan in &self.plans {
                save_plan(&pool, plan).await?;
            }

            Ok(TestDb { pool })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder};
    use crate::api::LoginResponse;
    use crate::auth::{Role, SESSION_COOKIE};
    use crate::env::{AppConfig, DEFAULT_SESSION_HOURS};
    use crate::init_rocket;
    use crate::models::ProgressStatus;
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::{Pool, Sqlite};

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin_user")
            .user("ot_user", Role::Ot)
            .user("assistant_user", Role::Assistant)
            .child("Tony")
            .child("Mia")
            .parent("tony_parent", Some("Tony"))
            .parent("unlinked_parent", None)
            .progress("2025-01-05", "Tony", ProgressStatus::Progress)
            .progress("2025-01-10", "Tony", ProgressStatus::Stable)
            .progress("2025-01-07", "Mia", ProgressStatus::Regression)
            .plan("2025-01-05", "ot_user")
            .plan("2025-02-01", "ot_user")
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            session_hours: DEFAULT_SESSION_HOURS,
            bootstrap_admin: None,
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, Pool<Sqlite>) {
        let pool = test_db.pool.clone();
        let rocket = init_rocket(test_db.pool, test_config()).await;
        let client = Client::untracked(rocket)
            .await
            .expect("valid rocket instance");
        (client, pool)
    }

    pub async fn login_test_user(client: &Client, username: &str, password: &str) -> Cookie<'static> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let token = response
            .cookies()
            .get_private(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .expect("login did not set a session cookie");

        let body = response.into_string().await.expect("login body");
        let login: LoginResponse = serde_json::from_str(&body).expect("login response json");
        assert!(login.success, "login failed for {}", username);

        Cookie::new(SESSION_COOKIE, token)
    }

    pub async fn login_standard(client: &Client, username: &str) -> Cookie<'static> {
        login_test_user(client, username, STANDARD_PASSWORD).await
    }
}
