use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{CharacterId, QuestionId, SourceType};

/// Local client state: the signed-in session, checklist cursors and unsent
/// text drafts.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub api_url: String,
    pub access_token: String,
    pub email: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDraft {
    pub question_id: QuestionId,
    pub character_id: CharacterId,
    pub answer_text: String,
    pub source_type: SourceType,
    pub comment: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open local store '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply local store migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn save_session(&self, api_url: &str, access_token: &str, email: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_session (id, api_url, access_token, email, saved_at)
             VALUES (1, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                api_url = excluded.api_url,
                access_token = excluded.access_token,
                email = excluded.email,
                saved_at = excluded.saved_at",
        )
        .bind(api_url)
        .bind(access_token)
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to store auth session")?;
        Ok(())
    }

    pub async fn load_session(&self) -> Result<Option<StoredSession>> {
        let row = sqlx::query(
            "SELECT api_url, access_token, email, saved_at FROM auth_session WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to load auth session")?;

        row.map(|row| -> Result<StoredSession> {
            Ok(StoredSession {
                api_url: row.try_get("api_url")?,
                access_token: row.try_get("access_token")?,
                email: row.try_get("email")?,
                saved_at: row.try_get("saved_at")?,
            })
        })
        .transpose()
    }

    /// Returns whether a session existed.
    pub async fn clear_session(&self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auth_session WHERE id = 1")
            .execute(&self.pool)
            .await
            .context("failed to clear auth session")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn save_cursor(
        &self,
        checklist_slug: &str,
        character_id: CharacterId,
        question_id: QuestionId,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO checklist_cursor (checklist_slug, character_id, question_id, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(checklist_slug, character_id) DO UPDATE SET
                question_id = excluded.question_id,
                updated_at = excluded.updated_at",
        )
        .bind(checklist_slug)
        .bind(character_id.0)
        .bind(question_id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!("failed to store cursor for checklist '{checklist_slug}' character {character_id}")
        })?;
        Ok(())
    }

    pub async fn load_cursor(
        &self,
        checklist_slug: &str,
        character_id: CharacterId,
    ) -> Result<Option<QuestionId>> {
        let row = sqlx::query(
            "SELECT question_id FROM checklist_cursor WHERE checklist_slug = ? AND character_id = ?",
        )
        .bind(checklist_slug)
        .bind(character_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| QuestionId(r.get::<i64, _>(0))))
    }

    pub async fn upsert_draft(&self, draft: &TextDraft) -> Result<()> {
        sqlx::query(
            "INSERT INTO text_drafts
                (question_id, character_id, answer_text, source_type, comment, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(question_id, character_id) DO UPDATE SET
                answer_text = excluded.answer_text,
                source_type = excluded.source_type,
                comment = excluded.comment,
                updated_at = excluded.updated_at",
        )
        .bind(draft.question_id.0)
        .bind(draft.character_id.0)
        .bind(&draft.answer_text)
        .bind(draft.source_type.as_str())
        .bind(draft.comment.as_deref())
        .bind(draft.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store draft for question {}", draft.question_id))?;
        Ok(())
    }

    pub async fn list_drafts(&self, character_id: CharacterId) -> Result<Vec<TextDraft>> {
        let rows = sqlx::query(
            "SELECT question_id, character_id, answer_text, source_type, comment, updated_at
             FROM text_drafts
             WHERE character_id = ?
             ORDER BY updated_at ASC, question_id ASC",
        )
        .bind(character_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to list drafts")?;

        rows.into_iter().map(|row| draft_from_row(&row)).collect()
    }

    pub async fn remove_draft(
        &self,
        question_id: QuestionId,
        character_id: CharacterId,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM text_drafts WHERE question_id = ? AND character_id = ?")
                .bind(question_id.0)
                .bind(character_id.0)
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to remove draft for question {question_id}"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn draft_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TextDraft> {
    let raw_source: String = row.try_get("source_type")?;
    let source_type = SourceType::parse(&raw_source)
        .with_context(|| format!("unknown source type '{raw_source}' in draft"))?;
    Ok(TextDraft {
        question_id: QuestionId(row.try_get("question_id")?),
        character_id: CharacterId(row.try_get("character_id")?),
        answer_text: row.try_get("answer_text")?,
        source_type,
        comment: row.try_get("comment")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
