pub mod greeter;
pub mod metrics_exporter;
pub mod refresh_scheduler;
pub mod requester;

pub use greeter::{Greeter, Greeting};
pub use metrics_exporter::MetricsExporter;
pub use refresh_scheduler::{RefreshHandle, RefreshScheduler};
pub use requester::Requester;
