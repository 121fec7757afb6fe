pub mod dedup;
pub mod normalize;
pub mod queue;
pub mod seeds;

pub use dedup::Deduplicator;
pub use normalize::normalize;
pub use queue::{TakeOutcome, TaskQueue};
pub use seeds::{
    dedupe_seeds, FragmentHandling, ProtocolHandling, QueryParamHandling, SeedDedupOutcome,
    SeedDedupPolicy, SeedDedupStats, SkippedSeed, TrailingSlashHandling, WwwHandling,
};
