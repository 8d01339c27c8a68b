pub mod aggregator;
pub mod config;
pub mod fetcher;
pub mod normalize;
pub mod sources;
pub mod state;
pub mod traits;
pub mod types;
pub mod view;

pub use aggregator::{AdapterRegistry, FeedAggregator, LoadOutcome, RefreshSummary};
pub use config::{EndpointConfig, FetchConfig};
pub use fetcher::Fetcher;
pub use sources::{FeatureSource, ForumSource, NewsSource, QuoteSource};
pub use state::{InstanceId, SourceInstance};
pub use traits::SourceAdapter;
pub use types::*;
pub use view::{project, project_sorted, ProjectedView, SortKey};
