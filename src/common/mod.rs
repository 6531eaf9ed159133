pub mod commands;
pub mod types;

pub use commands::NetworkCommand;
pub use types::{ChatMessage, PeerAddress};
