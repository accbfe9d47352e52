pub mod app;
pub mod calendar;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod handlers;
pub mod index;
pub mod models;
pub mod state;
pub mod stats;
pub mod storage;
pub mod timeline;

pub use app::router;
pub use config::Config;
pub use coordinator::MutationCoordinator;
pub use state::AppState;
pub use storage::{LocalStore, RemoteStore};
