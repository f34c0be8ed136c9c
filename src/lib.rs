pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod ws;
mod state;

pub use routes::create_app;
pub use state::AppState;
