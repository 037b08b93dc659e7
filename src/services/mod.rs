pub mod access_service;
pub mod attempt_service;
pub mod audit_service;
pub mod course_service;
pub mod grading_service;
pub mod media_service;
pub mod quiz_service;
pub mod storage_service;
