//! TCP access to the shared store for external collaborators

pub mod server;
pub mod wire;

pub use server::{Request, Response, StoreServer};
pub use wire::{FrameReader, MAX_MESSAGE_SIZE, read_message, write_message};
