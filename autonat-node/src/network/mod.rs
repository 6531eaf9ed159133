pub mod behavior;
pub mod node;
