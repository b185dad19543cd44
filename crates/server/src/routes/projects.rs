use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::publisher,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects))
        .route("/upload", post(upload_project))
        .route("/:id", put(update_project).delete(delete_project))
        .route("/admin/user/:email", get(admin_user_projects))
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectResponse>,
}

struct UploadParts {
    name: Option<String>,
    filename: Option<String>,
    data: Option<Vec<u8>>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadParts> {
    let mut parts = UploadParts {
        name: None,
        filename: None,
        data: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        match field.name() {
            Some("name") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read name field: {e}")))?;
                parts.name = Some(value);
            }
            Some("file") => {
                parts.filename = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file field: {e}")))?;
                parts.data = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    Ok(parts)
}

async fn upload_project(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let parts = read_upload(multipart).await?;
    let name = parts
        .name
        .ok_or_else(|| AppError::Validation("Project name is required".to_string()))?;
    let filename = parts
        .filename
        .ok_or_else(|| AppError::Validation("File is required".to_string()))?;
    let data = parts
        .data
        .ok_or_else(|| AppError::Validation("File is required".to_string()))?;

    let project_id = publisher::publish(
        &state.db.pool,
        state.store.as_ref(),
        &name,
        &user.id,
        &filename,
        &data,
        state.config.max_upload_bytes,
    )
    .await?;

    Ok(Json(json!({
        "message": "Project created and file uploaded successfully",
        "project_id": project_id,
    })))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let parts = read_upload(multipart).await?;
    let filename = parts
        .filename
        .ok_or_else(|| AppError::Validation("File is required".to_string()))?;
    let data = parts
        .data
        .ok_or_else(|| AppError::Validation("File is required".to_string()))?;

    let project_id = publisher::republish(
        &state.db.pool,
        state.store.as_ref(),
        &id,
        &user.id,
        &filename,
        &data,
        state.config.max_upload_bytes,
    )
    .await?;

    Ok(Json(json!({
        "message": "Project updated successfully",
        "project_id": project_id,
    })))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    publisher::delete(&state.db.pool, state.store.as_ref(), &id, &user.id).await?;
    Ok(Json(json!({ "message": "Project deleted successfully" })))
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProjectListResponse>> {
    let projects = fetch_projects(&state, &user.id).await?;
    Ok(Json(ProjectListResponse { projects }))
}

async fn admin_user_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Path(email): Path<String>,
) -> Result<Json<Value>> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }

    let target = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let projects = fetch_projects(&state, &target.0).await?;

    Ok(Json(json!({
        "user_email": email,
        "projects": projects,
    })))
}

async fn fetch_projects(state: &AppState, owner_id: &str) -> Result<Vec<ProjectResponse>> {
    let rows = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id, name, created_at FROM projects WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, created_at)| ProjectResponse {
            id,
            name,
            created_at,
        })
        .collect())
}
