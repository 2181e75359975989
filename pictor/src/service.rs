use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use blob::{Blob, BlobError};
use pictor_config::PictorConfig;
use pictor_path::{Params, Signer};
use sha2::{Digest, Sha256};
use storage_client::{Loader, Storage, StorageError};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use utils::singleflight::Group;

use crate::context::RequestContext;
use crate::error::{PictorError, Result, TimeoutPhase};
use crate::processor::Processor;

/// Behavioral knobs for the request core, typically sourced from
/// [`PictorConfig`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub allow_unsafe: bool,
    pub auto_webp: bool,
    pub auto_avif: bool,
    pub modified_time_check: bool,
    pub disable_error_body: bool,
    pub disable_params_endpoint: bool,
    pub base_path_redirect: Option<String>,
    pub base_params: Option<String>,
    pub request_timeout: Duration,
    pub load_timeout: Duration,
    pub save_timeout: Duration,
    pub process_timeout: Duration,
    pub process_concurrency: i64,
    pub cache_header_ttl: Duration,
    pub cache_header_swr: Duration,
    pub cache_header_no_cache: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            allow_unsafe: false,
            auto_webp: false,
            auto_avif: false,
            modified_time_check: false,
            disable_error_body: false,
            disable_params_endpoint: false,
            base_path_redirect: None,
            base_params: None,
            request_timeout: Duration::from_secs(30),
            load_timeout: Duration::from_secs(20),
            save_timeout: Duration::from_secs(20),
            process_timeout: Duration::from_secs(20),
            process_concurrency: -1,
            cache_header_ttl: Duration::from_secs(7 * 24 * 3600),
            cache_header_swr: Duration::from_secs(24 * 3600),
            cache_header_no_cache: false,
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &PictorConfig) -> Self {
        let service = &config.service;
        Self {
            allow_unsafe: service.allow_unsafe,
            auto_webp: service.auto_webp,
            auto_avif: service.auto_avif,
            modified_time_check: service.modified_time_check,
            disable_error_body: service.disable_error_body,
            disable_params_endpoint: service.disable_params_endpoint,
            base_path_redirect: service.base_path_redirect.clone(),
            base_params: service.base_params.clone(),
            request_timeout: service.request_timeout,
            load_timeout: service.load_timeout,
            save_timeout: service.save_timeout,
            process_timeout: service.process_timeout,
            process_concurrency: service.process_concurrency,
            cache_header_ttl: service.cache_header_ttl,
            cache_header_swr: service.cache_header_swr,
            cache_header_no_cache: service.cache_header_no_cache,
        }
    }
}

/// One slot in the load chain. Source stores are probed before plain loaders
/// and remembered as such, so a source that came out of storage is not
/// persisted right back into it.
enum ChainEntry {
    Loader(Arc<dyn Loader>),
    Storage(Arc<dyn Storage>),
}

impl ChainEntry {
    async fn get(&self, key: &str) -> storage_client::Result<Blob> {
        match self {
            ChainEntry::Loader(l) => l.get(key).await,
            ChainEntry::Storage(s) => s.get(key).await,
        }
    }

    fn is_storage(&self) -> bool {
        matches!(self, ChainEntry::Storage(_))
    }
}

pub struct PictorBuilder {
    loaders: Vec<Arc<dyn Loader>>,
    storages: Vec<Arc<dyn Storage>>,
    result_storages: Vec<Arc<dyn Storage>>,
    processors: Vec<Arc<dyn Processor>>,
    signer: Option<Arc<dyn Signer>>,
    options: ServiceOptions,
}

impl PictorBuilder {
    pub fn with_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storages.push(storage);
        self
    }

    pub fn with_result_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.result_storages.push(storage);
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Pictor {
        let mut chain = Vec::new();
        for storage in &self.storages {
            chain.push(ChainEntry::Storage(storage.clone()));
        }
        for loader in &self.loaders {
            chain.push(ChainEntry::Loader(loader.clone()));
        }
        let semaphore = match self.options.process_concurrency {
            n if n > 0 => Some(Arc::new(Semaphore::new(n as usize))),
            _ => None,
        };
        Pictor {
            chain,
            storages: self.storages,
            result_storages: self.result_storages,
            processors: self.processors,
            signer: self.signer,
            semaphore,
            in_flight: Group::new(),
            options: self.options,
        }
    }
}

/// The request coordination core: turns a verified processing spec into a
/// returned artifact, with result caching, in-flight dedup, a process
/// concurrency gate, and best-effort source/result persistence.
pub struct Pictor {
    chain: Vec<ChainEntry>,
    storages: Vec<Arc<dyn Storage>>,
    result_storages: Vec<Arc<dyn Storage>>,
    processors: Vec<Arc<dyn Processor>>,
    signer: Option<Arc<dyn Signer>>,
    semaphore: Option<Arc<Semaphore>>,
    in_flight: Group<Arc<Blob>, PictorError>,
    options: ServiceOptions,
}

impl Pictor {
    pub fn builder() -> PictorBuilder {
        PictorBuilder {
            loaders: Vec::new(),
            storages: Vec::new(),
            result_storages: Vec::new(),
            processors: Vec::new(),
            signer: None,
            options: ServiceOptions::default(),
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub async fn startup(&self) -> Result<()> {
        for processor in &self.processors {
            processor.startup().await?;
        }
        info!(processors = self.processors.len(), chain = self.chain.len(), "service started");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        for processor in &self.processors {
            processor.shutdown().await?;
        }
        Ok(())
    }

    /// Serve one request: verify, consult the result stores, and on a miss
    /// drive loader -> processor -> storage, deduplicating identical in-flight
    /// requests along the way.
    pub async fn serve(&self, ctx: &RequestContext, params: Params) -> Result<Arc<Blob>> {
        self.verify(&params)?;
        let params = self.apply_base_params(params);

        let fingerprint = fingerprint(&params);
        if let Some(hit) = self.check_result_stores(&fingerprint, &params).await {
            return Ok(hit);
        }

        // At most one loader+processor execution per fingerprint per moment;
        // late arrivals share the owner's artifact.
        let result = self
            .in_flight
            .work(&fingerprint, self.execute(ctx, &params, &fingerprint))
            .await;
        result.map_err(PictorError::from)
    }

    fn verify(&self, params: &Params) -> Result<()> {
        if params.unsafe_mode {
            return if self.options.allow_unsafe {
                Ok(())
            } else {
                Err(PictorError::SignatureMismatch)
            };
        }
        let (Some(signer), Some(hash)) = (&self.signer, &params.hash) else {
            return Err(PictorError::SignatureMismatch);
        };
        if signer.verify(hash, &params.path) {
            Ok(())
        } else {
            Err(PictorError::SignatureMismatch)
        }
    }

    /// Prepend the configured base params to the verified spec and re-parse.
    fn apply_base_params(&self, params: Params) -> Params {
        let Some(base) = &self.options.base_params else {
            return params;
        };
        let merged = format!("{}/{}", base.trim_matches('/'), params.path);
        let mut merged_params = pictor_path::parse_params(&merged);
        merged_params.hash = params.hash;
        merged_params.unsafe_mode = params.unsafe_mode;
        merged_params
    }

    async fn check_result_stores(&self, fingerprint: &str, params: &Params) -> Option<Arc<Blob>> {
        for store in &self.result_storages {
            let blob = match store.get(fingerprint).await {
                Ok(blob) => blob,
                Err(_) => continue,
            };
            if blob.err().await.is_some() || blob.is_empty().await {
                continue;
            }
            if self.options.modified_time_check && self.result_is_stale(store, fingerprint, params).await {
                continue;
            }
            debug!(fingerprint, "result store hit");
            return Some(Arc::new(blob));
        }
        None
    }

    /// A result is stale when the source has been modified after the stored
    /// artifact. Stores without mtime support opt out implicitly.
    async fn result_is_stale(&self, store: &Arc<dyn Storage>, fingerprint: &str, params: &Params) -> bool {
        let Ok(result_stat) = store.stat(fingerprint).await else {
            return false;
        };
        let Some(result_mtime) = result_stat.modified else {
            return false;
        };
        for storage in &self.storages {
            if let Ok(stat) = storage.stat(&params.image).await {
                if let Some(source_mtime) = stat.modified {
                    return source_mtime > result_mtime;
                }
            }
        }
        false
    }

    async fn execute(&self, ctx: &RequestContext, params: &Params, fingerprint: &str) -> Result<Arc<Blob>> {
        let _permit = match &self.semaphore {
            Some(semaphore) => Some(self.acquire(ctx, semaphore).await?),
            None => None,
        };

        let (source, from_storage) = self.load(ctx, &params.image).await?;
        let source = Arc::new(source);

        // Source persistence tees off the same fan-out the processor reads;
        // both observe byte-identical streams.
        if !from_storage {
            self.save_source(&params.image, source.clone());
        }

        let output = self.process(ctx, source, params).await?;

        self.save_results(fingerprint, output.clone());
        Ok(output)
    }

    async fn acquire(
        &self,
        ctx: &RequestContext,
        semaphore: &Arc<Semaphore>,
    ) -> Result<tokio::sync::OwnedSemaphorePermit> {
        tokio::select! {
            permit = semaphore.clone().acquire_owned() => {
                permit.map_err(|_| PictorError::Internal("process semaphore closed".to_string()))
            },
            _ = ctx.cancelled() => Err(PictorError::Timeout(TimeoutPhase::Request)),
        }
    }

    fn phase_budget(&self, ctx: &RequestContext, phase: Duration) -> Duration {
        match ctx.remaining() {
            Some(remaining) => remaining.min(phase),
            None => phase,
        }
    }

    async fn load(&self, ctx: &RequestContext, image: &str) -> Result<(Blob, bool)> {
        let budget = self.phase_budget(ctx, self.options.load_timeout);
        tokio::time::timeout(budget, self.load_chain(image))
            .await
            .map_err(|_| PictorError::Timeout(TimeoutPhase::Load))?
    }

    /// Probe the chain in order; the first non-empty blob with no latched
    /// error wins. Not-found (and expired) entries fall through to the next
    /// loader; any other error stops the chain.
    async fn load_chain(&self, image: &str) -> Result<(Blob, bool)> {
        if image.is_empty() {
            return Err(PictorError::NotFound);
        }
        for entry in &self.chain {
            let blob = match entry.get(image).await {
                Ok(blob) => blob,
                Err(StorageError::NotFound) | Err(StorageError::Expired) => continue,
                Err(e) => return Err(e.into()),
            };
            match blob.err().await {
                Some(BlobError::NotFound) => continue,
                Some(e) => return Err(e.into()),
                None => {},
            }
            if blob.is_empty().await {
                continue;
            }
            return Ok((blob, entry.is_storage()));
        }
        Err(PictorError::NotFound)
    }

    /// Best-effort asynchronous persistence of the loaded source into the
    /// first source store. Failures are logged, never surfaced.
    fn save_source(&self, image: &str, source: Arc<Blob>) {
        let Some(store) = self.storages.first().cloned() else {
            return;
        };
        let key = image.to_string();
        let save_timeout = self.options.save_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(save_timeout, store.put(&key, &source)).await {
                Ok(Ok(())) => debug!(key, "source persisted"),
                Ok(Err(e)) => warn!(key, "source persist failed: {e}"),
                Err(_) => warn!(key, "source persist timed out"),
            }
        });
    }

    async fn process(&self, ctx: &RequestContext, source: Arc<Blob>, params: &Params) -> Result<Arc<Blob>> {
        if self.processors.is_empty() {
            return Ok(source);
        }
        let budget = self.phase_budget(ctx, self.options.process_timeout);

        let processors = self.processors.clone();
        let ctx = ctx.clone();
        let params = params.clone();
        // The processor may be a native call; run it on its own task so a
        // panic is recovered instead of tearing down the request task.
        let mut handle = tokio::spawn(async move {
            let mut last = PictorError::UnsupportedFormat;
            for processor in processors {
                match processor.process(&ctx, source.clone(), &params).await {
                    Ok(output) => return Ok(output),
                    Err(PictorError::UnsupportedFormat) => last = PictorError::UnsupportedFormat,
                    Err(e) => return Err(e),
                }
            }
            Err(last)
        });

        match tokio::time::timeout(budget, &mut handle).await {
            Err(_) => {
                handle.abort();
                Err(PictorError::Timeout(TimeoutPhase::Process))
            },
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(PictorError::Internal("processor panicked".to_string()))
            },
            Ok(Err(_)) => Err(PictorError::Internal("processor task cancelled".to_string())),
            Ok(Ok(result)) => result,
        }
    }

    /// Persist the artifact into every result store in parallel; the response
    /// may start streaming before these finish.
    fn save_results(&self, fingerprint: &str, output: Arc<Blob>) {
        let save_timeout = self.options.save_timeout;
        for store in self.result_storages.iter().cloned() {
            let key = fingerprint.to_string();
            let output = output.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(save_timeout, store.put(&key, &output)).await {
                    Ok(Ok(())) => debug!(key, "result persisted"),
                    Ok(Err(e)) => warn!(key, "result persist failed: {e}"),
                    Err(_) => warn!(key, "result persist timed out"),
                }
            });
        }
    }
}

/// Stable digest of the canonical spec, including any negotiated output
/// format appended as a filter. Used as the result-store key and the
/// in-flight dedup key.
pub fn fingerprint(params: &Params) -> String {
    let canonical = pictor_path::generate(params);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
