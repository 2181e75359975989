mod blob;
mod error;
pub mod fanout;

pub use blob::{AsyncReadSeek, Blob, BlobType, SeekableSource, StreamSource, MAX_MEMORY_SIZE};
pub use error::{BlobError, Result};
pub use fanout::{Fanout, FanoutReader};
