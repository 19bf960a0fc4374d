//! camlink - Main entry point
//!
//! Serves live views of cloud cameras over HTTP, or probes a streaming
//! endpoint with every handshake format.

mod args;

use args::{Args, Command};
use camlink::account::{AccountService, StaticAccountService};
use camlink::config::Config;
use camlink::relay::{FfmpegSpawner, LiveView};
use camlink::transport::{EndpointReference, Negotiator, TlsConnector, Transport};
use camlink::web::{self, SharedState};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config {:?}: {}, using defaults", args.config, e);
            Config::default()
        }
    };

    // Initialize logging with noise filtering for third-party crates
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("CAMLINK_LOG").unwrap_or(log_level))
        .filter_module("hyper", log::LevelFilter::Warn)
        .filter_module("native_tls", log::LevelFilter::Warn)
        .init();

    info!("camlink v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Some(Command::Probe { ref reference, ref camera }) => {
            validated(&config)?;
            probe(&config, reference, camera.as_deref()).await
        }
        Some(Command::Serve { ref host, port }) => {
            let mut config = config;
            if let Some(host) = host {
                config.http.host = host.clone();
            }
            if let Some(port) = port {
                info!("Overriding HTTP port to {}", port);
                config.http.port = port;
            }
            validated(&config)?;
            serve(config).await
        }
        None => {
            validated(&config)?;
            serve(config).await
        }
    }
}

fn validated(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }
    Ok(())
}

fn account_service(config: &Config) -> Arc<StaticAccountService> {
    Arc::new(StaticAccountService::new(
        config.account.clone(),
        config.cameras.clone(),
    ))
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let account = account_service(&config);
    match account.login().await {
        Ok(()) => {}
        Err(e) => warn!("Login failed: {}; live views will fall back to snapshots", e),
    }
    info!("Serving {} camera(s)", config.cameras.len());

    let live_view = LiveView::new(
        account,
        Arc::new(TlsConnector::new()),
        Arc::new(FfmpegSpawner::new(config.transcoder.clone())),
        config.stream.stream_config(),
    );
    let host = config.http.host.clone();
    let port = config.http.port;
    let state = Arc::new(SharedState::new(config, live_view));

    let http_state = state.clone();
    let mut http_handle = tokio::spawn(async move {
        if let Err(e) = web::run_http_server(&host, port, http_state).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            http_handle.abort();
        }
        _ = &mut http_handle => {
            warn!("HTTP server stopped");
        }
    }

    info!(
        "Shut down after {:.0}s with {} viewer(s) connected",
        state.uptime().as_secs_f64(),
        state.viewer_count()
    );
    Ok(())
}

/// Parse, resolve and negotiate `reference`, then print what every
/// handshake format got back
async fn probe(
    config: &Config,
    reference: &str,
    camera_id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = EndpointReference::parse(reference)?;
    println!("Endpoint:  {}", endpoint);
    println!("Scheme:    {}", endpoint.scheme);
    println!("Host:      {}:{}", endpoint.host, endpoint.port);
    println!("Path:      {}", endpoint.path);
    println!(
        "Session:   {}",
        endpoint.session_id.as_deref().unwrap_or("(none)")
    );

    let resolved: Vec<_> = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await?
        .collect();
    for addr in &resolved {
        println!("Resolved:  {}", addr);
    }

    if !endpoint.is_proprietary() {
        println!("Standard {} endpoint, no negotiation needed", endpoint.scheme);
        return Ok(());
    }

    let account = account_service(config);
    let camera = match camera_id {
        Some(id) => account.find_camera(id).await?,
        None => account
            .list_cameras()
            .await?
            .into_iter()
            .next()
            .ok_or("no cameras configured")?,
    };
    let ctx = account
        .session_context(&camera)
        .await?
        .with_session(endpoint.session_id.clone());

    let stream = config.stream.stream_config();
    let mut negotiator = Negotiator::new(
        Arc::new(TlsConnector::new()),
        stream.candidates,
        stream.negotiator,
    );

    let report = match negotiator.negotiate(&endpoint, &ctx).await {
        Ok(mut negotiated) => {
            negotiated.transport.close().await;
            println!("Accepted:  '{}' format", negotiated.candidate);
            negotiated.report
        }
        Err(failed) => {
            println!("Accepted:  none");
            failed.report
        }
    };

    println!();
    for attempt in &report.attempts {
        println!(
            "  {:<22} {:>5} bytes sent -> {}",
            attempt.candidate.name(),
            attempt.payload_len,
            attempt.outcome
        );
    }
    println!("{} connection attempt(s)", report.connection_attempts());
    Ok(())
}
