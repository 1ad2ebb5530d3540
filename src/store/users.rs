use serde::Deserialize;

use super::{PgStore, StoreError};
use crate::models::User;

// ---

const USER_COLUMNS: &str = "id, phone, password_hash, nickname, default_city_id, tag, role";

/// Profile fields a user may change on their own account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    // ---
    pub nickname: Option<String>,
    pub phone: Option<String>,
    pub default_city_id: Option<i64>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none() && self.phone.is_none() && self.default_city_id.is_none()
    }
}

impl PgStore {
    // ---
    pub async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        // ---
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1"))
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        // ---
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Insert a user with the default role. A taken phone yields [`StoreError::Conflict`].
    pub async fn create_user(
        &self,
        phone: &str,
        password_hash: &str,
        nickname: Option<&str>,
    ) -> Result<User, StoreError> {
        // ---
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (phone, password_hash, nickname) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(phone)
        .bind(password_hash)
        .bind(nickname)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_unique(e, "phone"))
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<User, StoreError> {
        // ---
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                nickname        = COALESCE($2, nickname),
                phone           = COALESCE($3, phone),
                default_city_id = COALESCE($4, default_city_id)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.nickname)
        .bind(&update.phone)
        .bind(update.default_city_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_unique(e, "phone"))?
        .ok_or(StoreError::NotFound("user"))
    }

    pub async fn update_tag(&self, id: i64, tag: &str) -> Result<User, StoreError> {
        // ---
        sqlx::query_as::<_, User>(&format!("UPDATE users SET tag = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"))
            .bind(id)
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("user"))
    }
}
