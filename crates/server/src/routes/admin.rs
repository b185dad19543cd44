use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::accounts,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invite", post(invite_user))
        .route("/users", get(list_users))
        .route("/activity", get(list_activity))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub full_name: Option<String>,
    pub email: String,
    pub project_count: usize,
    pub projects: Vec<ProjectBrief>,
}

#[derive(Debug, Serialize)]
pub struct ProjectBrief {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ActivityEntry {
    pub activity_id: String,
    pub timestamp: String,
    pub user_email: String,
    pub user_full_name: Option<String>,
    pub action: String,
}

fn require_admin(user: &AuthUser) -> Result<()> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(())
}

async fn invite_user(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<InviteRequest>,
) -> Result<Json<Value>> {
    require_admin(&user)?;

    if body.email.is_empty() || !body.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if body.role != "admin" && body.role != "user" {
        return Err(AppError::Validation(
            "Role must be 'admin' or 'user'".to_string(),
        ));
    }

    let token = accounts::invite(&state.db.pool, &body.email, &body.role, &user.id).await?;

    // Downstream delivery of the link is an external job
    let link = format!(
        "{}/register?invitation_token={token}",
        state.config.frontend_base_url
    );
    tracing::info!("invitation link for {}: {link}", body.email);

    Ok(Json(json!({ "message": "Invitation sent successfully" })))
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<UserSummary>>> {
    require_admin(&user)?;
    Ok(Json(user_summaries(&state.db.pool).await?))
}

/// Every user with their projects, newest users first.
pub(crate) async fn user_summaries(pool: &sqlx::SqlitePool) -> Result<Vec<UserSummary>> {
    let users = sqlx::query_as::<_, (String, Option<String>, String)>(
        "SELECT id, full_name, email FROM users ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    let projects = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id, name, owner_id FROM projects ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut by_owner: std::collections::HashMap<String, Vec<ProjectBrief>> =
        std::collections::HashMap::new();
    for (id, title, owner_id) in projects {
        by_owner
            .entry(owner_id)
            .or_default()
            .push(ProjectBrief { id, title });
    }

    Ok(users
        .into_iter()
        .map(|(user_id, full_name, email)| {
            let projects = by_owner.remove(&user_id).unwrap_or_default();
            UserSummary {
                project_count: projects.len(),
                user_id,
                full_name,
                email,
                projects,
            }
        })
        .collect())
}

async fn list_activity(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ActivityEntry>>> {
    require_admin(&user)?;

    let rows = sqlx::query_as::<_, (String, String, String, Option<String>, String)>(
        r#"
        SELECT a.id, a.timestamp, u.email, u.full_name, a.action
        FROM activity a
        JOIN users u ON u.id = a.user_id
        ORDER BY a.timestamp DESC
        "#,
    )
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(
                |(activity_id, timestamp, user_email, user_full_name, action)| ActivityEntry {
                    activity_id,
                    timestamp,
                    user_email,
                    user_full_name,
                    action,
                },
            )
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Utc;
    use sqlx::SqlitePool;
    use uuid::Uuid;

    async fn seed_user(pool: &SqlitePool, email: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, is_active, created_at, updated_at) VALUES (?, ?, 'hash', 'user', 1, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn seed_project(pool: &SqlitePool, name: &str, owner_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO projects (id, name, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn user_summaries_carry_each_users_projects() {
        let pool = test_pool().await;
        let builder = seed_user(&pool, "builder@b.com").await;
        seed_user(&pool, "empty@b.com").await;
        let first = seed_project(&pool, "site-one", &builder).await;
        seed_project(&pool, "site-two", &builder).await;

        let summaries = user_summaries(&pool).await.unwrap();
        assert_eq!(summaries.len(), 2);

        let with_projects = summaries
            .iter()
            .find(|s| s.email == "builder@b.com")
            .unwrap();
        assert_eq!(with_projects.project_count, 2);
        let titles: Vec<_> = with_projects
            .projects
            .iter()
            .map(|p| p.title.as_str())
            .collect();
        assert!(titles.contains(&"site-one"));
        assert!(titles.contains(&"site-two"));
        assert!(with_projects.projects.iter().any(|p| p.id == first));

        let without = summaries.iter().find(|s| s.email == "empty@b.com").unwrap();
        assert_eq!(without.project_count, 0);
        assert!(without.projects.is_empty());
    }
}
