pub mod flatten;
pub mod provider;
pub mod types;

pub use flatten::flatten;
pub use provider::{HttpFeedClient, ReadingFetcher};
pub use types::{FeatureRecord, HistoricalRecord, RawReading};
