pub mod api;
pub mod limiter;
pub mod server;

pub use server::{router, run_server, AppState};
