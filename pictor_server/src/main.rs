use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pictor::{HmacSigner, Pictor, ServiceOptions, SignerType};
use pictor_config::pictor_config;
use pictor_server::{Server, ServerConfig};
use storage_client::{FileStorage, HttpLoader};
use tracing_subscriber::EnvFilter;

/// Image transformation server. Configuration is environment-driven
/// (PICTOR_* variables); the flags below override the listener settings.
#[derive(Parser, Debug)]
#[command(name = "pictor", version)]
struct Cli {
    /// Network interface to bind to.
    #[arg(long)]
    host: Option<String>,

    /// TCP port for the HTTP server.
    #[arg(long)]
    port: Option<u16>,

    /// Shorthand for a debug-level log filter.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = pictor_config();

    let default_filter = if cli.debug { "debug" } else { config.log.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    // An unknown signer algorithm is a startup failure, never a request
    // error.
    let signer_type: SignerType = config
        .signer
        .signer_type
        .parse()
        .context("invalid PICTOR_SIGNER_SIGNER_TYPE")?;
    let signer = HmacSigner::new(signer_type, config.signer.truncate, &config.signer.secret);

    let mut builder = Pictor::builder()
        .with_signer(Arc::new(signer))
        .with_options(ServiceOptions::from_config(config));

    if let Some(base_dir) = &config.file_storage.base_dir {
        builder = builder.with_storage(Arc::new(
            FileStorage::new(base_dir)
                .with_path_prefix(&config.file_storage.path_prefix)
                .with_expiration(config.file_storage.expiration),
        ));
    }
    if let Some(base_dir) = &config.file_storage.loader_base_dir {
        if Some(base_dir) != config.file_storage.base_dir.as_ref() {
            builder = builder.with_loader(Arc::new(
                FileStorage::new(base_dir).with_path_prefix(&config.file_storage.path_prefix),
            ));
        }
    }
    if let Some(base_dir) = &config.result_storage.base_dir {
        builder = builder.with_result_storage(Arc::new(
            FileStorage::new(base_dir)
                .with_path_prefix(&config.result_storage.path_prefix)
                .with_expiration(config.result_storage.expiration),
        ));
    }
    if !config.http_loader.disable {
        // The HTTP loader is the fallback for any source the stores miss.
        let mut http_loader = HttpLoader::new()
            .with_max_allowed_size(config.http_loader.max_allowed_size)
            .with_default_scheme(&config.http_loader.default_scheme)
            .with_accept(&config.http_loader.accept);
        if let Some(sources) = &config.http_loader.allowed_sources {
            http_loader = http_loader.with_allowed_sources(sources);
        }
        builder = builder.with_loader(Arc::new(http_loader));
    }

    let app = builder.build();
    app.startup().await?;

    let mut server_config = ServerConfig::from_config(config);
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }

    let server = Server::new(app, server_config);
    server.run().await?;
    Ok(())
}
