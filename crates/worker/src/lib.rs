pub mod health;
pub mod state;
pub mod telemetry;

pub use health::build_router;
pub use state::AppState;
