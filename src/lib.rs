//! A polite, resumable concurrent web crawler.
//!
//! Give [`CrawlSession`] one or more seed URLs and a [`CrawlSink`]; it runs
//! one domain engine per seed with a bounded worker pool each, respecting
//! robots.txt, rate limits, depth/page caps, and per-domain deduplication.
//! Results stream into the sink and the session only returns once the sink
//! has received every published result.

mod engine;
pub mod filter;
pub mod session;
pub mod sink;
pub mod state;

pub use session::CrawlSession;
pub use sink::{JsonLinesSink, MemorySink};
pub use state::JsonStateStore;

pub use spinneret_core::{
    AbortReason, CommonMetadata, CompletionReason, CrawlConfig, CrawlError, CrawlEvent,
    CrawlLogger, CrawlMiddleware, CrawlReport, CrawlResult, CrawlSink, CrawlTask, DomainSummary,
    ExtractSpec, FieldRule, MemoryLogger, MiddlewareChain, NullLogger, PageData, SavedState, Seed,
    StateStore, TracingLogger,
};
pub use spinneret_frontier::{normalize, SeedDedupPolicy};
