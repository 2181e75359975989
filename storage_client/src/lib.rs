mod error;
mod file_storage;
mod http_loader;
mod interface;

pub mod testing_utils;

pub use error::{Result, StorageError};
pub use file_storage::FileStorage;
pub use http_loader::HttpLoader;
pub use interface::{Loader, Stat, Storage};
