use axum::http::StatusCode;

use crate::middleware::auth::AuthUser;
use crate::models::media_object::MediaObject;

/// Why access was granted. Serialized into logs and audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    Public,
    FreePreview,
    Owner,
    Admin,
    Enrolled,
    Instructor,
}

impl AccessReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessReason::Public => "public",
            AccessReason::FreePreview => "free_preview",
            AccessReason::Owner => "owner",
            AccessReason::Admin => "admin",
            AccessReason::Enrolled => "enrolled",
            AccessReason::Instructor => "instructor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    AuthenticationRequired,
    NotAuthorized,
}

impl AccessDenied {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDenied::AuthenticationRequired => "authentication_required",
            AccessDenied::NotAuthorized => "not_authorized",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccessDenied::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AccessDenied::NotAuthorized => StatusCode::FORBIDDEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(AccessReason),
    Denied(AccessDenied),
}

/// Everything the rule chain needs, gathered up front so the decision
/// itself stays a pure function.
#[derive(Debug, Default)]
pub struct AccessContext<'a> {
    pub caller: Option<&'a AuthUser>,
    /// The object backs a lesson video flagged `is_free`.
    pub free_preview: bool,
    /// The caller holds an `active` enrollment in the owning course.
    pub active_enrollment: bool,
    /// The caller is the owning course's instructor.
    pub course_instructor: bool,
}

/// Tiered access rules for a media object, first match wins:
/// public, free preview, owner, admin, enrolled, instructor.
pub fn evaluate(media: &MediaObject, ctx: &AccessContext) -> AccessDecision {
    if media.is_public {
        return AccessDecision::Granted(AccessReason::Public);
    }
    if media.is_video() && ctx.free_preview {
        return AccessDecision::Granted(AccessReason::FreePreview);
    }
    let Some(caller) = ctx.caller else {
        return AccessDecision::Denied(AccessDenied::AuthenticationRequired);
    };
    if caller.id == media.uploaded_by {
        return AccessDecision::Granted(AccessReason::Owner);
    }
    if caller.is_admin() {
        return AccessDecision::Granted(AccessReason::Admin);
    }
    if media.course_id.is_some() {
        if ctx.active_enrollment {
            return AccessDecision::Granted(AccessReason::Enrolled);
        }
        if ctx.course_instructor {
            return AccessDecision::Granted(AccessReason::Instructor);
        }
    }
    AccessDecision::Denied(AccessDenied::NotAuthorized)
}
