pub mod auth;
pub mod payload;
pub mod routes;
pub mod routing;
pub mod types;
