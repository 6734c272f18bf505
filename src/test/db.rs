#[cfg(test)]
mod tests {
    use crate::auth::{ChildLink, Role};
    use crate::db::{
        authenticate_user, count_users, delete_list_item, find_child, find_user, get_all_children,
        get_all_plans, get_all_progress, get_all_users, get_list_items, get_progress_for_child,
        get_user, hash_password, upsert_child, upsert_list_item, upsert_user,
    };
    use crate::error::AppError;
    use crate::models::{ListKind, ProgressStatus};
    use crate::test::test_db::{STANDARD_PASSWORD, TestDbBuilder};

    use chrono::NaiveDate;
    use rocket::tokio;

    #[tokio::test]
    async fn test_upsert_then_get_user() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let pool = &test_db.pool;

        let hash = hash_password("secret").expect("hash");
        upsert_user(pool, "jordan", Some(&hash), Role::Slp, &ChildLink::All)
            .await
            .expect("Failed to upsert user");

        let user = get_user(pool, "jordan").await.expect("Failed to get user");
        assert_eq!(user.username, "jordan");
        assert_eq!(user.role, Role::Slp);
        assert_eq!(user.child_link, ChildLink::All);

        // Same key again overwrites rather than duplicating.
        upsert_user(pool, "jordan", Some(&hash), Role::Bc, &ChildLink::All)
            .await
            .expect("Failed to upsert user again");

        assert_eq!(count_users(pool).await.unwrap(), 1);
        assert_eq!(get_user(pool, "jordan").await.unwrap().role, Role::Bc);
    }

    #[tokio::test]
    async fn test_upsert_without_hash_keeps_password() {
        let test_db = TestDbBuilder::new()
            .user("casey", Role::Staff)
            .build()
            .await
            .expect("test db");
        let pool = &test_db.pool;

        upsert_user(pool, "casey", None, Role::Ece, &ChildLink::All)
            .await
            .expect("Failed to update role");

        let user = authenticate_user(pool, "casey", STANDARD_PASSWORD)
            .await
            .expect("auth query")
            .expect("password still valid");
        assert_eq!(user.role, Role::Ece);
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");

        assert!(find_user(&test_db.pool, "ghost").await.unwrap().is_none());
        assert!(matches!(
            get_user(&test_db.pool, "ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_user() {
        let test_db = TestDbBuilder::new()
            .user("robin", Role::Ot)
            .build()
            .await
            .expect("test db");
        let pool = &test_db.pool;

        assert!(
            authenticate_user(pool, "robin", STANDARD_PASSWORD)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            authenticate_user(pool, "robin", "wrong")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            authenticate_user(pool, "nobody", STANDARD_PASSWORD)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_passwords_are_not_stored_in_plaintext() {
        let test_db = TestDbBuilder::new()
            .user("robin", Role::Ot)
            .build()
            .await
            .expect("test db");

        let (stored,): (String,) =
            sqlx::query_as("SELECT password FROM users WHERE username = 'robin'")
                .fetch_one(&test_db.pool)
                .await
                .expect("password row");

        assert_ne!(stored, STANDARD_PASSWORD);
        assert!(stored.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_users_sorted_by_username() {
        let test_db = TestDbBuilder::new()
            .user("zed", Role::Staff)
            .admin("amy")
            .user("mo", Role::Ot)
            .build()
            .await
            .expect("test db");

        let names: Vec<String> = get_all_users(&test_db.pool)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();

        assert_eq!(names, vec!["amy", "mo", "zed"]);
    }

    #[tokio::test]
    async fn test_child_round_trip() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let pool = &test_db.pool;
        let dob = NaiveDate::from_ymd_opt(2019, 4, 2);

        upsert_child(pool, "Tony", None, dob).await.expect("upsert");

        let child = find_child(pool, "Tony").await.unwrap().expect("child exists");
        assert_eq!(child.child_name, "Tony");
        assert_eq!(child.parent_username, None);
        assert_eq!(child.date_of_birth, dob);

        upsert_child(pool, "Tony", None, None).await.expect("upsert again");
        assert_eq!(get_all_children(pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_items_are_idempotent() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let pool = &test_db.pool;

        assert!(upsert_list_item(pool, ListKind::Disciplines, "OT").await.unwrap());
        assert!(!upsert_list_item(pool, ListKind::Disciplines, "OT").await.unwrap());
        assert!(upsert_list_item(pool, ListKind::GoalAreas, "OT").await.unwrap());

        let disciplines = get_list_items(pool, ListKind::Disciplines).await.unwrap();
        assert_eq!(disciplines.len(), 1);
        assert_eq!(disciplines[0].name, "OT");

        assert!(delete_list_item(pool, ListKind::Disciplines, "OT").await.unwrap());
        assert!(!delete_list_item(pool, ListKind::Disciplines, "OT").await.unwrap());
        assert!(get_list_items(pool, ListKind::Disciplines).await.unwrap().is_empty());
        assert_eq!(get_list_items(pool, ListKind::GoalAreas).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_and_plans_persist() {
        let test_db = TestDbBuilder::new()
            .child("Tony")
            .child("Mia")
            .progress("2025-01-05", "Tony", ProgressStatus::Progress)
            .progress("2025-01-07", "Mia", ProgressStatus::Regression)
            .plan("2025-01-05", "ot_user")
            .build()
            .await
            .expect("test db");
        let pool = &test_db.pool;

        assert_eq!(get_all_progress(pool).await.unwrap().len(), 2);

        let tony = get_progress_for_child(pool, "Tony").await.unwrap();
        assert_eq!(tony.len(), 1);
        assert_eq!(tony[0].status, ProgressStatus::Progress);
        assert!(tony.iter().all(|e| e.child_name == "Tony"));

        let plans = get_all_plans(pool).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].support_staff, vec!["Sam", "Lee"]);
        assert_eq!(plans[0].internal_notes, "Watch for fatigue");
    }
}
