pub mod host;
pub mod layout_store;
pub mod refresh_coordinator;
pub mod state_storage;
pub mod window_snapshot;
pub mod window_state_service;

pub use host::create_window_host;
pub use state_storage::{FileStorage, MemoryStorage, StateStorage};
pub use window_state_service::WindowStateService;
