use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::auth::{AuthUser, MaybeAuthUser},
    services::activity,
    AppState,
};

/// Listing is public (anonymous callers see consented reviews only);
/// creation and deletion authenticate through the `AuthUser` extractor.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/:id", delete(delete_review))
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub review: String,
    pub consent: bool,
}

#[derive(Debug, Serialize)]
pub struct ReviewerResponse {
    pub id: String,
    pub full_name: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review_id: String,
    pub review: String,
    pub consent: bool,
    pub reviewer: ReviewerResponse,
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateReviewRequest>,
) -> Result<Json<Value>> {
    if body.review.trim().is_empty() {
        return Err(AppError::Validation("Review text is required".to_string()));
    }

    sqlx::query(
        "INSERT INTO user_reviews (id, user_id, review, consent, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(&body.review)
    .bind(body.consent)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db.pool)
    .await?;

    activity::record(
        &state.db.pool,
        &user.id,
        &format!("USER_REVIEW_ADDED, Review is: {}", body.review),
    )
    .await;

    Ok(Json(json!({
        "reviewer": user.email,
        "review": body.review,
        "consent": body.consent,
    })))
}

/// Public listing. Anonymous callers see consented reviews only; a
/// signed-in caller additionally sees their own.
async fn list_reviews(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
) -> Result<Json<Vec<ReviewResponse>>> {
    let reviews = visible_reviews(&state.db.pool, user.as_ref().map(|u| u.id.as_str())).await?;
    Ok(Json(reviews))
}

pub(crate) async fn visible_reviews(
    pool: &SqlitePool,
    viewer_id: Option<&str>,
) -> Result<Vec<ReviewResponse>> {
    let rows = sqlx::query_as::<
        _,
        (
            String,
            String,
            bool,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        ),
    >(
        r#"
        SELECT r.id, r.review, r.consent,
               u.id, u.full_name, u.linkedin, u.github, u.twitter, u.website
        FROM user_reviews r
        JOIN users u ON u.id = r.user_id
        WHERE r.consent = 1 OR r.user_id = ?
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(viewer_id.unwrap_or(""))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(review_id, review, consent, user_id, full_name, linkedin, github, twitter, website)| {
                ReviewResponse {
                    review_id,
                    review,
                    consent,
                    reviewer: ReviewerResponse {
                        id: user_id,
                        full_name,
                        linkedin,
                        github,
                        twitter,
                        website,
                    },
                }
            },
        )
        .collect())
}

async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let review = sqlx::query_as::<_, (String, String)>(
        "SELECT user_id, review FROM user_reviews WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    let (author_id, review_text) = review;
    if author_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You are not allowed to delete this review".to_string(),
        ));
    }

    activity::record(
        &state.db.pool,
        &user.id,
        &format!("USER_REVIEW_DELETE, Review was: {review_text}"),
    )
    .await;

    sqlx::query("DELETE FROM user_reviews WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(json!({ "detail": "Review deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_user(pool: &SqlitePool, email: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, is_active, full_name, created_at, updated_at) VALUES (?, ?, 'hash', 'user', 1, 'Test User', ?, ?)",
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

    async fn seed_review(pool: &SqlitePool, user_id: &str, text: &str, consent: bool) {
        sqlx::query(
            "INSERT INTO user_reviews (id, user_id, review, consent, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(text)
        .bind(consent)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn consent_gates_anonymous_visibility() {
        let pool = test_pool().await;
        let author = seed_user(&pool, "author@b.com").await;
        let other = seed_user(&pool, "other@b.com").await;

        seed_review(&pool, &author, "public praise", true).await;
        seed_review(&pool, &author, "private note", false).await;
        seed_review(&pool, &other, "their private note", false).await;

        // Anonymous: consented only
        let anon = visible_reviews(&pool, None).await.unwrap();
        assert_eq!(anon.len(), 1);
        assert_eq!(anon[0].review, "public praise");

        // The author also sees their own unconsented review
        let own = visible_reviews(&pool, Some(author.as_str())).await.unwrap();
        let texts: Vec<_> = own.iter().map(|r| r.review.as_str()).collect();
        assert_eq!(own.len(), 2);
        assert!(texts.contains(&"private note"));
        assert!(!texts.contains(&"their private note"));
    }
}
