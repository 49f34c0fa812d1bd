pub mod cache;
pub mod channels;
pub mod clock;
pub mod config;
pub mod deduplication;
mod error;
pub mod generator;
pub mod normalize;
pub mod pagination;
pub mod store;
pub mod titles;
pub mod users;
mod workspace;


pub use error::{Error, Result};
pub use workspace::{SharedStore, ShortsWorkspace};

// Re-export the types most callers need
pub use cache::{CacheConfig, CacheKey, CacheStats, SharedCache, TtlCache};
pub use channels::{ChannelRecord, ChannelRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Settings;
pub use deduplication::{BulkAddOutcome, TitleSet};
pub use generator::{ContentGenerator, ScriptSession};
pub use normalize::TitlePolicy;
pub use pagination::TitlePage;
pub use store::{
    HttpStore, MemoryStore, Payload, RemoteStore, ResourceKey, ResourceKind, TimeoutStore,
    WriteMode,
};
pub use titles::TitleLibrary;
pub use users::{ApprovalStatus, Role, UserDirectory, UserRecord};
