pub mod feature;
pub mod forum;
pub mod news;
pub mod quote;

pub use feature::FeatureSource;
pub use forum::ForumSource;
pub use news::NewsSource;
pub use quote::QuoteSource;

use crate::config::FetchConfig;
use crate::fetcher::Fetcher;
use crate::traits::SourceAdapter;
use crate::types::Result;
use std::sync::Arc;

/// One HTTP adapter per source type, all sharing a single client.
pub fn http_adapters(config: &FetchConfig) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    config.validate()?;
    let fetcher = Fetcher::new(config)?;

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(NewsSource::new(fetcher.clone(), config)?),
        Arc::new(ForumSource::new(fetcher.clone(), config)?),
        Arc::new(FeatureSource::new(fetcher.clone(), config)?),
        Arc::new(QuoteSource::new(fetcher, config)?),
    ];
    Ok(adapters)
}
