pub mod analytics;
pub mod app;
pub mod config;
pub mod conservation;
pub mod controls;
pub mod dashboard;
pub mod detector;
pub mod forecasting;
pub mod http;
pub mod metrics;
pub mod query;
pub mod seed;
pub mod state;

// Re-export commonly used types for tests
pub use app::AppContext;
pub use detector::{Alert, AlertKind, AnomalyDetector, Priority, Status};
pub use state::{AlertLog, Reading, ReadingStore};
