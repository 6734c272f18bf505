#[cfg(test)]
mod tests {
    use crate::{
        auth::{Role, UserSession},
        db::{
            clean_expired_sessions, create_user_session, get_session_by_token, invalidate_session,
        },
        error::AppError,
        linkage,
        test::test_db::TestDbBuilder,
    };
    use chrono::{Duration, NaiveDateTime, Utc};
    use rocket::tokio;
    use sqlx::{Pool, Sqlite, SqlitePool};

    async fn create_test_session() -> (String, String, NaiveDateTime, Pool<Sqlite>) {
        let test_db = TestDbBuilder::new()
            .user("test_session_user", Role::Ece)
            .build()
            .await
            .expect("Failed to build test database");

        let token = UserSession::generate_token();

        let expires_at = (Utc::now() + Duration::hours(1)).naive_utc();

        (
            "test_session_user".to_string(),
            token,
            expires_at,
            test_db.pool,
        )
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (username, token, expires_at, pool) = create_test_session().await;

        let session_id = create_user_session(&pool, &username, &token, expires_at)
            .await
            .expect("Failed to create session");

        assert!(session_id > 0, "Session ID should be positive");

        let session = get_session_by_token(&pool, &token)
            .await
            .expect("Failed to get session");

        assert_eq!(session.username, username);
        assert_eq!(session.token, token);
        assert!(session.is_valid());

        let expires_diff =
            (session.expires_at.and_utc().timestamp() - expires_at.and_utc().timestamp()).abs();
        assert!(
            expires_diff <= 1,
            "Expiration timestamps should match within 1 second"
        );
    }

    #[tokio::test]
    async fn test_get_nonexistent_session() {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        let result = get_session_by_token(&pool, "nonexistent_token").await;

        match result {
            Err(AppError::Authentication(msg)) => assert_eq!(msg, "Invalid session token"),
            other => panic!("Expected Authentication error, got {:?}", other.map(|s| s.id)),
        }
    }

    #[tokio::test]
    async fn test_invalidate_session() {
        let (username, token, expires_at, pool) = create_test_session().await;

        create_user_session(&pool, &username, &token, expires_at)
            .await
            .expect("Failed to create session");

        invalidate_session(&pool, &token)
            .await
            .expect("Failed to invalidate session");

        assert!(get_session_by_token(&pool, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_clean_expired_sessions() {
        let (username, token, _, pool) = create_test_session().await;

        let expired_at = (Utc::now() - Duration::hours(1)).naive_utc();
        create_user_session(&pool, &username, &token, expired_at)
            .await
            .expect("Failed to create expired session");

        let live_token = UserSession::generate_token();
        let live_until = (Utc::now() + Duration::hours(1)).naive_utc();
        create_user_session(&pool, &username, &live_token, live_until)
            .await
            .expect("Failed to create live session");

        let expired = get_session_by_token(&pool, &token)
            .await
            .expect("expired session still stored");
        assert!(!expired.is_valid());

        let removed = clean_expired_sessions(&pool)
            .await
            .expect("Failed to clean sessions");

        assert_eq!(removed, 1);
        assert!(get_session_by_token(&pool, &token).await.is_err());
        assert!(get_session_by_token(&pool, &live_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_removed_with_user() {
        let test_db = TestDbBuilder::new()
            .admin("admin_user")
            .user("leaving_user", Role::Staff)
            .build()
            .await
            .expect("Failed to build test database");

        let token = UserSession::generate_token();
        let expires_at = (Utc::now() + Duration::hours(1)).naive_utc();
        create_user_session(&test_db.pool, "leaving_user", &token, expires_at)
            .await
            .expect("Failed to create session");

        let admin = crate::db::get_user(&test_db.pool, "admin_user")
            .await
            .expect("admin exists");
        linkage::delete_user(&test_db.pool, &admin, "leaving_user")
            .await
            .expect("Failed to delete user");

        assert!(get_session_by_token(&test_db.pool, &token).await.is_err());
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = UserSession::generate_token();
        let b = UserSession::generate_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }
}
