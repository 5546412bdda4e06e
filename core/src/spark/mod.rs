// Spark service support: block model, wire codec, repository and sync

pub mod api;
pub mod block_types;
pub mod module;
pub mod parse;
pub mod registry;
pub mod relations;
pub mod repository;
pub mod resolver;
pub mod sync;
pub mod types;

pub use api::{HttpSparkApi, SparkApi, SparkApiConfig};
pub use block_types::{BlockIntfType, BlockOrIntfType, BlockSpec, BlockStatus, BlockType, KnownBlockType, Role};
pub use module::{InMemoryWidgetStore, SparkServiceModule, SparkServiceState, Widget, WidgetConfigStore};
pub use registry::SparkServices;
pub use repository::BlockRepository;
pub use resolver::BlockReference;
pub use sync::{SyncState, SyncStats, Synchronizer};
pub use types::{
    Block, BlockAddress, BlockData, BlockFieldAddress, BlockMeta, ConnectionSummary, FieldValue, Limiters,
    Link, Quantity, RelationEdge, SparkExported, SparkPatchPayload, SparkStatePayload, SparkStatus,
    UnitAlternatives, UserUnits,
};

/// Root of the per-service state topics
pub const STATE_TOPIC: &str = "brewcast/state";

/// Full-state event discriminant
pub const SPARK_STATE_EVENT: &str = "Spark.state";

/// Patch event discriminant
pub const SPARK_PATCH_EVENT: &str = "Spark.patch";

pub fn state_topic(service_id: &str) -> String {
    format!("{}/{}", STATE_TOPIC, service_id)
}

pub fn patch_topic(service_id: &str) -> String {
    format!("{}/{}/patch", STATE_TOPIC, service_id)
}
