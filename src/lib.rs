pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    attempt_service::AttemptService, audit_service::AuditService, course_service::CourseService,
    media_service::MediaService, quiz_service::QuizService, storage_service::StorageService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub storage: StorageService,
    pub media_service: MediaService,
    pub course_service: CourseService,
    pub quiz_service: QuizService,
    pub attempt_service: AttemptService,
    pub audit_service: AuditService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let storage = StorageService::new(config.media_root.clone());
        let media_service = MediaService::new(pool.clone());
        let course_service = CourseService::new(pool.clone());
        let quiz_service = QuizService::new(pool.clone());
        let attempt_service = AttemptService::new(pool.clone());
        let audit_service = AuditService::new(pool.clone());

        Self {
            pool,
            storage,
            media_service,
            course_service,
            quiz_service,
            attempt_service,
            audit_service,
        }
    }
}
