pub mod audit_log;
pub mod course;
pub mod enrollment;
pub mod lesson_content;
pub mod media_object;
pub mod quiz;
pub mod quiz_attempt;
pub mod quiz_question;
pub mod user;
