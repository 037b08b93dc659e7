use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::course::Course;
use crate::models::enrollment::{self, Enrollment};

/// How a caller reached a course's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseAccess {
    Enrolled,
    Instructor,
    Admin,
}

#[derive(Clone)]
pub struct CourseService {
    pool: PgPool,
}

impl CourseService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_course_by_slug(&self, slug: &str) -> Result<Course> {
        let course = sqlx::query_as::<_, Course>(
            r#"SELECT id, slug, title, instructor_id, is_published, created_at, updated_at
               FROM courses WHERE slug = $1"#,
        )
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(course)
    }

    pub async fn find_active_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>> {
        let row = sqlx::query_as::<_, Enrollment>(
            r#"SELECT id, user_id, course_id, status, progress_percent,
                      enrolled_at, last_accessed_at, completed_at, expires_at
               FROM enrollments
               WHERE user_id = $1 AND course_id = $2 AND status = $3"#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(enrollment::STATUS_ACTIVE)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Course-content access: active enrollment, course instructor, or
    /// admin. Everyone else is refused.
    pub async fn ensure_course_access(
        &self,
        course: &Course,
        user: &AuthUser,
    ) -> Result<CourseAccess> {
        if user.is_admin() {
            return Ok(CourseAccess::Admin);
        }
        if course.instructor_id == user.id {
            return Ok(CourseAccess::Instructor);
        }
        if self
            .find_active_enrollment(user.id, course.id)
            .await?
            .is_some()
        {
            return Ok(CourseAccess::Enrolled);
        }
        Err(Error::Forbidden("not_enrolled".to_string()))
    }

    /// Fire-and-forget bump of the enrollment's last-access timestamp.
    pub async fn touch_enrollment(&self, user_id: Uuid, course_id: Uuid) {
        let res = sqlx::query(
            r#"UPDATE enrollments SET last_accessed_at = NOW()
               WHERE user_id = $1 AND course_id = $2 AND status = $3"#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(enrollment::STATUS_ACTIVE)
        .execute(&self.pool)
        .await;
        if let Err(e) = res {
            tracing::warn!(error = ?e, "failed to touch enrollment last_accessed_at");
        }
    }
}
