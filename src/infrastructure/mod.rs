pub mod clock;
pub mod core;
pub mod http_uploader;
pub mod observability;
pub mod persistence;
pub mod progress_bus;
pub mod repositories;
pub mod synthetic;

pub use clock::{ManualClock, SystemClock};
pub use http_uploader::HttpArtifactUploader;
pub use persistence::FileModelStore;
pub use progress_bus::ProgressBus;
pub use repositories::InMemoryRaceRepository;
pub use synthetic::SyntheticRaceGenerator;
