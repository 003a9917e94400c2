pub mod entity;
pub mod query;
pub mod relationship;

pub use entity::{Entity, PropertyValue};
pub use query::{
    BatchReport, ContextualSearchResult, FailedBatch, GraphSchema, GraphStatistics,
    IndexBuildReport, PathResult, QueryResult, SearchHit, Subgraph, TranslatedQueryResult,
    TraversalDirection,
};
pub use relationship::Relationship;
