pub mod paths;
pub mod settings;
pub mod store;

pub use paths::Paths;
pub use store::{write_atomic, write_private, StateStore, WorkerRecord};
