// Event, entrant and history records
pub mod types;

pub use types::{
    Entrant, EventSnapshot, Going, HandlerRole, HistoricalRecord, Sex, Surface,
};
