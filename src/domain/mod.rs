pub mod repository;
pub mod task;
pub mod user;
pub mod validation;
