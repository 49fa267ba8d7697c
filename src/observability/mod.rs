pub mod metrics;
pub mod ratelimit;
pub mod tracing;

pub use metrics::{EngineMetrics, TimingGuard};
pub use ratelimit::LogLimiter;
pub use self::tracing::init_tracing;
