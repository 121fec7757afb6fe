pub mod config;
pub mod error;
pub mod events;
pub mod middleware;
pub mod types;

pub use config::CrawlConfig;
pub use error::{AbortReason, CrawlError};
pub use events::{CrawlEvent, CrawlLogger, MemoryLogger, NullLogger, TracingLogger};
pub use middleware::{CrawlMiddleware, MiddlewareChain};
pub use types::*;
