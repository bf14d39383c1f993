pub mod broadcast;
pub mod memory;

pub use broadcast::BroadcastRenderer;
pub use memory::InMemoryMessageStore;
