mod handlers;
mod server;

pub use server::{Server, ServerConfig};
