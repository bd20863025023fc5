//! Request dispatch: app and route resolution, environment construction,
//! execution and response mapping.

mod dispatcher;
mod error;
mod metrics;

pub use dispatcher::{
    base_path, Dispatcher, DispatcherConfig, Phase, RequestContext, DEFAULT_MAX_OUTPUT_SIZE,
    DEFAULT_TIMEOUT,
};
pub use error::{DispatchError, ErrorKind};
pub use metrics::{InMemoryMetrics, MetricNames, MetricsSink, MetricsSnapshot, TimerStats};
