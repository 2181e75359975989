use std::sync::Arc;

use blob::Blob;
use pictor_path::Params;

use crate::context::RequestContext;
use crate::error::Result;

/// An opaque image-processing engine.
///
/// The service tries processors in registration order; one that cannot handle
/// the given source returns `UnsupportedFormat`, handing the request to the
/// next. Native bindings live entirely behind this interface; the request
/// core only touches blobs.
#[async_trait::async_trait]
pub trait Processor: Send + Sync {
    async fn startup(&self) -> Result<()> {
        Ok(())
    }

    /// Transform the source blob according to the parsed spec and return the
    /// output artifact. The request scope is available for deferred cleanup
    /// and scratch caching.
    async fn process(&self, ctx: &RequestContext, source: Arc<Blob>, params: &Params) -> Result<Arc<Blob>>;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
