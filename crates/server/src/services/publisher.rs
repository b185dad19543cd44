//! Publish pipeline: Project record creation, object-store upload, and
//! compensating deletion when an upload does not fully succeed.
//!
//! The record is committed before any object is written so that storage
//! failures always have a real, deletable project id to roll back. A
//! partially uploaded prefix left behind after a failed publish is the
//! documented residual gap; the relational side never keeps the row.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::Project,
    error::{AppError, Result},
    services::{
        activity,
        archive::{self, ArchiveError, SiteFile},
        storage::{content_type_for, ObjectStore},
    },
};

pub fn storage_prefix(name: &str) -> String {
    format!("projects/{name}/")
}

impl From<ArchiveError> for AppError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::PayloadTooLarge => AppError::PayloadTooLarge(e.to_string()),
            _ => AppError::Validation(e.to_string()),
        }
    }
}

/// Deletes the pending project row on every exit path, including
/// cancellation, unless the publish ran to completion and disarmed it.
/// Error paths call [`compensate`](Self::compensate) so the row is gone
/// before the failure is reported; the spawn from `Drop` is only the
/// backstop for a cancelled task.
struct PendingProject {
    pool: SqlitePool,
    project_id: String,
    armed: bool,
}

impl PendingProject {
    fn new(pool: SqlitePool, project_id: String) -> Self {
        Self {
            pool,
            project_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    async fn compensate(mut self) {
        self.armed = false;
        if let Err(e) = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(&self.project_id)
            .execute(&self.pool)
            .await
        {
            tracing::error!(
                "compensating delete of project {} failed: {e}",
                self.project_id
            );
        }
    }
}

impl Drop for PendingProject {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let pool = self.pool.clone();
        let project_id = self.project_id.clone();
        tokio::spawn(async move {
            if let Err(e) = sqlx::query("DELETE FROM projects WHERE id = ?")
                .bind(&project_id)
                .execute(&pool)
                .await
            {
                tracing::error!("compensating delete of project {project_id} failed: {e}");
            }
        });
    }
}

/// Publishes an upload as a new project and returns its id.
pub async fn publish(
    pool: &SqlitePool,
    store: &dyn ObjectStore,
    name: &str,
    owner_id: &str,
    filename: &str,
    data: &[u8],
    max_upload_bytes: u64,
) -> Result<String> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Project name is required".to_string()));
    }

    // Fail fast: shape and size are checked before any side effect
    let files = archive::resolve_upload(filename, data, max_upload_bytes)?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Err(AppError::Conflict(
            "Project with this name already exists".to_string(),
        ));
    }

    // Commit the record first so failed uploads can reference a real id
    let project_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO projects (id, name, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&project_id)
    .bind(name)
    .bind(owner_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let guard = PendingProject::new(pool.clone(), project_id.clone());
    if let Err(e) = upload_files(store, name, &files).await {
        guard.compensate().await;
        return Err(AppError::Internal(format!("Publish failed: {e}")));
    }
    guard.disarm();

    activity::record(pool, owner_id, &format!("NEW PROJECT CREATED: {name}")).await;

    Ok(project_id)
}

async fn upload_files(store: &dyn ObjectStore, name: &str, files: &[SiteFile]) -> Result<()> {
    for file in files {
        let key = format!("projects/{name}/{}", file.path);
        store.put(&key, &file.data, content_type_for(&key)).await?;
    }
    Ok(())
}

/// Replaces a project's content: old objects and record are removed,
/// then the upload is published again under the same name. The window
/// between deletion and re-upload is visible downtime.
pub async fn republish(
    pool: &SqlitePool,
    store: &dyn ObjectStore,
    project_id: &str,
    owner_id: &str,
    filename: &str,
    data: &[u8],
    max_upload_bytes: u64,
) -> Result<String> {
    let name = authorize_owner(pool, project_id, owner_id).await?;

    // Validate the replacement before destroying anything
    archive::resolve_upload(filename, data, max_upload_bytes)?;

    store.delete_prefix(&storage_prefix(&name)).await?;
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(pool)
        .await?;

    activity::record(pool, owner_id, &format!("PROJECT UPDATED: {name}")).await;

    publish(pool, store, &name, owner_id, filename, data, max_upload_bytes).await
}

/// Deletes a project's objects and record. A storage failure here is
/// surfaced, not swallowed: deleting the record while its objects remain
/// would orphan the storage side of the contract.
pub async fn delete(
    pool: &SqlitePool,
    store: &dyn ObjectStore,
    project_id: &str,
    owner_id: &str,
) -> Result<()> {
    let name = authorize_owner(pool, project_id, owner_id).await?;

    store.delete_prefix(&storage_prefix(&name)).await?;

    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(pool)
        .await?;

    activity::record(pool, owner_id, &format!("PROJECT DELETED: {name}")).await;

    Ok(())
}

async fn authorize_owner(pool: &SqlitePool, project_id: &str, owner_id: &str) -> Result<String> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    if project.owner_id != owner_id {
        return Err(AppError::Forbidden(
            "Not authorized to modify this project".to_string(),
        ));
    }
    Ok(project.name)
}
