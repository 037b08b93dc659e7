pub mod media_dto;
pub mod quiz_dto;
