pub mod csv_loader;
pub mod in_memory;

pub use csv_loader::{load_events, write_events};
pub use in_memory::InMemoryRaceRepository;
