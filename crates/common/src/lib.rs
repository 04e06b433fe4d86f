pub mod config;
pub mod logging;
pub mod shutdown;
pub mod telemetry;

pub use config::Environment;
pub use logging::setup_logging;
pub use shutdown::Shutdown;
pub use telemetry::TelemetryGuard;
