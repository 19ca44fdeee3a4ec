pub mod aggregation;
pub mod broadcast;
pub mod pulse;

pub use aggregation::{
    compute_snapshot, DashboardAggregator, DashboardEvent, LiveAggregationEngine, MetricSnapshot, PricingRules,
    SnapshotGate,
};
pub use broadcast::{BroadcastChannel, FeedClassifier, FeedEvent, NoticeFeedUpdate};
pub use pulse::AttentionPulse;
