//! Account lifecycle: registration (self-service and invited),
//! activation-code verification, and admin invitations.

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::{Activation, Invitation},
    error::{AppError, Result},
    services::activity,
};

const INVITATION_EXPIRY_DAYS: i64 = 7;

pub fn generate_secure_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect()
}

/// How the registrant arrived. Invited users take email and role from
/// the invitation and start active; self-service users start inactive
/// with a pending activation code.
pub enum RegistrationMode {
    SelfService,
    Invited(ResolvedInvitation),
}

#[derive(Debug)]
pub struct ResolvedInvitation {
    pub id: String,
    pub email: String,
    pub role: String,
    pub creator_id: String,
}

#[derive(Debug)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    /// Present only for self-service registrations.
    pub activation_code: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated,
    AlreadyActive,
}

/// Looks up an invitation by token, rejecting unknown and expired ones.
pub async fn resolve_invitation(pool: &SqlitePool, token: &str) -> Result<ResolvedInvitation> {
    let invitation = sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::Validation("Invalid or expired invitation token".to_string()))?;

    if invitation.expires_at <= Utc::now() {
        return Err(AppError::Validation(
            "Invalid or expired invitation token".to_string(),
        ));
    }

    Ok(ResolvedInvitation {
        id: invitation.id,
        email: invitation.email,
        role: invitation.role,
        creator_id: invitation.creator_id,
    })
}

/// Creates a user. The caller-supplied email is overridden by the
/// invitation's for invited registrations; invitation consumption and
/// user creation commit together or not at all.
pub async fn register(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    mode: RegistrationMode,
) -> Result<NewUser> {
    let (email, role, is_active, invited_by, invitation_id) = match &mode {
        RegistrationMode::SelfService => (email.to_string(), "user".to_string(), false, None, None),
        RegistrationMode::Invited(inv) => (
            inv.email.clone(),
            inv.role.clone(),
            true,
            Some(inv.creator_id.clone()),
            Some(inv.id.clone()),
        ),
    };

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let activation_code = if is_active {
        None
    } else {
        Some(generate_secure_token())
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, is_active, invited_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&email)
    .bind(password_hash)
    .bind(&role)
    .bind(is_active)
    .bind(&invited_by)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    if let Some(code) = &activation_code {
        sqlx::query(
            "INSERT INTO activations (id, user_id, activation_code, is_used, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user_id)
        .bind(code)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(invitation_id) = &invitation_id {
        sqlx::query("DELETE FROM invitations WHERE id = ?")
            .bind(invitation_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(NewUser {
        id: user_id,
        email,
        role,
        is_active,
        activation_code,
    })
}

/// Verifies an activation code. Activating an already-active account is
/// a no-op; otherwise the stored code must exist, be unused, and match
/// exactly, and is consumed atomically with the activation.
pub async fn activate(pool: &SqlitePool, email: &str, code: &str) -> Result<ActivationOutcome> {
    let user = sqlx::query_as::<_, (String, bool)>("SELECT id, is_active FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let (user_id, is_active) = user;

    if is_active {
        return Ok(ActivationOutcome::AlreadyActive);
    }

    let activation = sqlx::query_as::<_, Activation>("SELECT * FROM activations WHERE user_id = ?")
        .bind(&user_id)
        .fetch_optional(pool)
        .await?;

    let Some(activation) = activation else {
        return Err(AppError::Validation("Invalid or used token".to_string()));
    };
    if activation.is_used || activation.activation_code != code {
        return Err(AppError::Validation("Invalid or used token".to_string()));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE users SET is_active = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE activations SET is_used = 1 WHERE id = ?")
        .bind(&activation.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    activity::record(pool, &user_id, "USER_ACTIVATED").await;

    Ok(ActivationOutcome::Activated)
}

/// Creates an invitation with a fresh single-use token. Email delivery
/// of the invitation link is downstream work.
pub async fn invite(
    pool: &SqlitePool,
    email: &str,
    role: &str,
    inviter_id: &str,
) -> Result<String> {
    let token = generate_secure_token();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO invitations (id, email, role, creator_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email)
    .bind(role)
    .bind(inviter_id)
    .bind(&token)
    .bind((now + Duration::days(INVITATION_EXPIRY_DAYS)).to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_admin(pool: &SqlitePool) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, is_active, created_at, updated_at) VALUES (?, 'admin@b.com', 'hash', 'admin', 1, ?, ?)",
        )
        .bind(&id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn self_service_registration_is_inactive_with_code() {
        let pool = test_pool().await;
        let user = register(&pool, "new@b.com", "hash", RegistrationMode::SelfService)
            .await
            .unwrap();
        assert!(!user.is_active);
        assert_eq!(user.role, "user");
        assert!(user.activation_code.is_some());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let pool = test_pool().await;
        register(&pool, "new@b.com", "hash", RegistrationMode::SelfService)
            .await
            .unwrap();
        let err = register(&pool, "new@b.com", "hash", RegistrationMode::SelfService)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn invited_registration_consumes_the_invitation() {
        let pool = test_pool().await;
        let admin = seed_admin(&pool).await;
        let token = invite(&pool, "guest@b.com", "admin", &admin).await.unwrap();

        let invitation = resolve_invitation(&pool, &token).await.unwrap();
        // Caller-supplied email is overridden by the invitation's
        let user = register(
            &pool,
            "attacker@evil.com",
            "hash",
            RegistrationMode::Invited(invitation),
        )
        .await
        .unwrap();

        assert_eq!(user.email, "guest@b.com");
        assert_eq!(user.role, "admin");
        assert!(user.is_active);
        assert!(user.activation_code.is_none());

        // Single-use: the token is gone
        assert!(resolve_invitation(&pool, &token).await.is_err());
    }

    #[tokio::test]
    async fn expired_invitation_is_rejected() {
        let pool = test_pool().await;
        let admin = seed_admin(&pool).await;
        let token = generate_secure_token();
        sqlx::query(
            "INSERT INTO invitations (id, email, role, creator_id, token, expires_at, created_at) VALUES (?, 'x@b.com', 'user', ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&admin)
        .bind(&token)
        .bind((Utc::now() - Duration::days(1)).to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let err = resolve_invitation(&pool, &token).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn activation_consumes_the_code_exactly_once() {
        let pool = test_pool().await;
        let user = register(&pool, "new@b.com", "hash", RegistrationMode::SelfService)
            .await
            .unwrap();
        let code = user.activation_code.unwrap();

        assert_eq!(
            activate(&pool, "new@b.com", &code).await.unwrap(),
            ActivationOutcome::Activated
        );
        // Idempotent once active, regardless of the presented code
        assert_eq!(
            activate(&pool, "new@b.com", &code).await.unwrap(),
            ActivationOutcome::AlreadyActive
        );
    }

    #[tokio::test]
    async fn wrong_activation_code_is_rejected() {
        let pool = test_pool().await;
        register(&pool, "new@b.com", "hash", RegistrationMode::SelfService)
            .await
            .unwrap();
        let err = activate(&pool, "new@b.com", "wrong-code").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = activate(&pool, "missing@b.com", "whatever").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
