use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::enrollment;
use crate::models::lesson_content::LessonContent;
use crate::models::media_object::MediaObject;
use crate::services::access_service::{self, AccessContext, AccessDecision};
use crate::services::storage_service::StorageService;

pub struct NewMediaObject {
    pub secure_id: String,
    pub storage_key: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub category: String,
    pub uploaded_by: Uuid,
    pub course_id: Option<Uuid>,
    pub is_public: bool,
}

#[derive(Clone)]
pub struct MediaService {
    pool: PgPool,
}

impl MediaService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve a servable object. Soft-deleted rows are gone as far as the
    /// gate is concerned.
    pub async fn get_by_secure_id(&self, secure_id: &str) -> Result<MediaObject> {
        let media = sqlx::query_as::<_, MediaObject>(
            r#"SELECT * FROM media_objects WHERE secure_id = $1 AND deleted_at IS NULL"#,
        )
        .bind(secure_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(media)
    }

    /// Gather the rows the rule chain needs, then run the pure decision.
    /// Lookups are skipped when an earlier rule already settles the answer.
    pub async fn authorize(
        &self,
        media: &MediaObject,
        caller: Option<&AuthUser>,
    ) -> Result<AccessDecision> {
        let mut ctx = AccessContext {
            caller,
            ..Default::default()
        };

        if !media.is_public && media.is_video() {
            ctx.free_preview = self.is_free_preview(media.id).await?;
        }

        if let (Some(user), Some(course_id), false) = (caller, media.course_id, ctx.free_preview) {
            if user.id != media.uploaded_by && !user.is_admin() {
                ctx.active_enrollment = self.has_active_enrollment(user.id, course_id).await?;
                if !ctx.active_enrollment {
                    ctx.course_instructor = self.is_course_instructor(user.id, course_id).await?;
                }
            }
        }

        Ok(access_service::evaluate(media, &ctx))
    }

    async fn is_free_preview(&self, media_id: Uuid) -> Result<bool> {
        let content = sqlx::query_as::<_, LessonContent>(
            r#"SELECT * FROM lesson_contents
               WHERE video_media_id = $1 AND is_free = TRUE LIMIT 1"#,
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content.is_some())
    }

    async fn has_active_enrollment(&self, user_id: Uuid, course_id: Uuid) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            r#"SELECT 1 FROM enrollments
               WHERE user_id = $1 AND course_id = $2 AND status = $3 LIMIT 1"#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(enrollment::STATUS_ACTIVE)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn is_course_instructor(&self, user_id: Uuid, course_id: Uuid) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            r#"SELECT 1 FROM courses WHERE id = $1 AND instructor_id = $2 LIMIT 1"#,
        )
        .bind(course_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn create(&self, new: NewMediaObject) -> Result<MediaObject> {
        let media = sqlx::query_as::<_, MediaObject>(
            r#"
            INSERT INTO media_objects (
                secure_id, storage_key, file_name, size_bytes, content_type,
                category, uploaded_by, course_id, is_public
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&new.secure_id)
        .bind(&new.storage_key)
        .bind(&new.file_name)
        .bind(new.size_bytes)
        .bind(&new.content_type)
        .bind(&new.category)
        .bind(new.uploaded_by)
        .bind(new.course_id)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await?;
        Ok(media)
    }

    /// Soft-delete first; payload removal is a separate, reconcilable step.
    /// Only the uploader or an admin may delete.
    pub async fn delete(
        &self,
        media: &MediaObject,
        caller: &AuthUser,
        storage: &StorageService,
    ) -> Result<()> {
        if caller.id != media.uploaded_by && !caller.is_admin() {
            return Err(Error::Forbidden("not_authorized".to_string()));
        }

        let now = Utc::now();
        let affected = sqlx::query(
            r#"UPDATE media_objects SET deleted_at = $2
               WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(media.id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("media object not found".to_string()));
        }

        // Best effort; the sweeper retires the payload if this fails.
        match storage.remove(&media.storage_key).await {
            Ok(()) => {
                let _ = sqlx::query(r#"UPDATE media_objects SET purged_at = $2 WHERE id = $1"#)
                    .bind(media.id)
                    .bind(Utc::now())
                    .execute(&self.pool)
                    .await;
            }
            Err(e) => {
                tracing::warn!(
                    media_id = %media.id,
                    error = %e,
                    "payload removal failed, leaving it to the sweeper"
                );
            }
        }

        tracing::info!(media_id = %media.id, secure_id = %media.secure_id, "media object deleted");
        Ok(())
    }

    /// Remove payloads left behind by soft-deleted rows. Returns how many
    /// payloads were retired.
    pub async fn sweep_deleted_payloads(&self, storage: &StorageService) -> Result<u64> {
        let orphans = sqlx::query_as::<_, MediaObject>(
            r#"SELECT * FROM media_objects
               WHERE deleted_at IS NOT NULL AND purged_at IS NULL
               LIMIT 100"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut purged = 0u64;
        for media in orphans {
            if let Err(e) = storage.remove(&media.storage_key).await {
                tracing::warn!(media_id = %media.id, error = %e, "payload sweep failed");
                continue;
            }
            sqlx::query(r#"UPDATE media_objects SET purged_at = $2 WHERE id = $1"#)
                .bind(media.id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            purged += 1;
        }

        if purged > 0 {
            tracing::info!(purged, "retired orphaned media payloads");
        }
        Ok(purged)
    }
}
