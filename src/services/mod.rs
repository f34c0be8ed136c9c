pub mod auth_service;
pub mod conflict_guard;
pub mod session_reaper;
