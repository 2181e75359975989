mod context;
mod error;
mod processor;
mod service;

pub use blob::{Blob, BlobError, BlobType, Fanout, FanoutReader};
pub use context::RequestContext;
pub use error::{PictorError, Result, TimeoutPhase};
pub use pictor_path::{Filter, HmacSigner, Params, Signer, SignerType};
pub use processor::Processor;
pub use service::{Pictor, PictorBuilder, ServiceOptions};
pub use storage_client::{Loader, Stat, Storage, StorageError};
