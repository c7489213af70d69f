//! Streaming HTTP access-log tailing, parsing, and sliding-window alerting.

pub mod error;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod window;

pub use error::{ConfigError, ParseError, TailError};
pub use metrics::{Metrics, Rank};
pub use model::{Entry, Request};
pub use monitor::{Config, Monitor};
pub use pool::{BufferPool, EntryPool};
pub use queue::EntryQueue;
pub use window::{Alert, AlertStatus, Window};
