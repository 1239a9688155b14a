pub mod extractor;
pub mod history_index;
pub mod stats;

pub use extractor::FeatureExtractor;
pub use history_index::HistoryIndex;
