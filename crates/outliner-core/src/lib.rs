pub mod actions;
pub mod block;
pub mod draft;
pub mod error;
pub mod exchange;
pub mod history;
pub mod outline;
pub mod properties;
pub mod reconcile;
pub mod repo;
pub mod settings;
pub mod store;
pub mod ui_state;

#[cfg(test)]
mod fixtures;

pub use block::{Block, Position};
pub use error::{Error, Result};
pub use repo::{BlockSeed, ListenerId, Repo};
pub use store::{BlockData, BlockId, ChangeScope, DocumentStore, MemoryStore, StoreEvent};
pub use ui_state::{UiState, UiStateRegistry};
