pub mod credentials;
pub mod task_service;
pub mod user_service;

#[cfg(test)]
mod task_service_tests;
