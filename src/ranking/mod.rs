pub mod bm25;
pub mod budget;
pub mod co_activation;
pub mod degree;
pub mod fusion;
pub mod pattern_cache;
pub mod signals;
pub mod triggers;

pub use bm25::{Bm25Hit, Bm25Index, Bm25Params};
pub use budget::{BudgetAllocator, Classification, ComplexityTier, TierBudgets, TokenBudget};
pub use co_activation::{CoActivationSettings, SpreadResult};
pub use degree::DegreeChannel;
pub use fusion::{ChannelHit, ChannelSource, FusionParams, RankedItem, RankedList};
pub use signals::{Signal, SignalCategory};
pub use triggers::{TriggerMatch, TriggerMatcher};
