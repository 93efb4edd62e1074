pub mod aggregator;
pub mod config;
pub mod detector;
pub mod extractor;
pub mod fetcher;
pub mod parser;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod types;

pub use aggregator::FeedAggregator;
pub use config::AppConfig;
pub use fetcher::PageFetcher;
pub use scheduler::{spawn_update_loop, SchedulerHandle};
pub use store::Store;
pub use types::*;
