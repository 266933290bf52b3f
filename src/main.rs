use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use axum::Router;
use clap::Parser;
use tokio::sync::broadcast;

use reelpass::catalog::file::load_catalog;
use reelpass::events::{DEFAULT_EVENT_BUFFER, EventDispatcher, EventSink, FanOutSink, JsonLinesSink, LogSink};
use reelpass::heartbeat::HeartbeatMonitor;
use reelpass::lease::clock::SystemClock;
use reelpass::negotiator::SessionNegotiator;
use reelpass::stats::ViewStats;
use reelpass::{cli, config, events, heartbeat, http};

/// Set to true once the first Ctrl+C is received. Second Ctrl+C force-exits.
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Wait for the first Ctrl+C (graceful shutdown); a second one force-exits.
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("error: failed to install Ctrl+C handler: {e}");
        std::process::exit(1);
    }
    if SHUTTING_DOWN.swap(true, Ordering::SeqCst) {
        eprintln!("\nreelpass: forced exit");
        std::process::exit(1);
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let file_config = config::find_config_file(args.config.as_deref()).and_then(|path| {
        match config::load_config(&path) {
            Ok(cfg) => {
                tracing::debug!("Loaded config from {}", path.display());
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}", e);
                None
            }
        }
    });

    let config = config::Config::resolve(file_config, &args).unwrap_or_else(|e| fail(e));

    let catalog = load_catalog(&config.catalog).unwrap_or_else(|e| fail(e));
    if catalog.links().is_empty() {
        tracing::warn!("Catalog {} defines no share links", config.catalog.display());
    }

    tracing::info!(
        "reelpass {} on port {} (heartbeat every {:?}, timeout {:?})",
        env!("GIT_VERSION"),
        config.port,
        config.heartbeat.renew_interval,
        config.heartbeat.timeout
    );

    let sink: Arc<dyn EventSink> = match &config.events_file {
        Some(path) => match JsonLinesSink::open(path) {
            Ok(sink) => {
                tracing::info!("Writing viewing events to {}", path.display());
                Arc::new(sink)
            }
            Err(e) => fail(format!("cannot open events file {}: {}", path.display(), e)),
        },
        None => Arc::new(LogSink),
    };
    let stats = Arc::new(ViewStats::new());
    let sink: Arc<dyn EventSink> = Arc::new(FanOutSink::new(vec![sink, stats.clone()]));

    let store = Arc::new(config.heartbeat.lease_store(Arc::new(SystemClock)));
    let monitor = Arc::new(HeartbeatMonitor::new(store, config.heartbeat));
    let (dispatcher, events_rx) = EventDispatcher::channel(DEFAULT_EVENT_BUFFER);
    let negotiator = Arc::new(SessionNegotiator::new(
        Arc::new(RwLock::new(catalog)),
        Arc::clone(&monitor),
        dispatcher,
    ));

    if config.admin_token.is_none() {
        tracing::info!("No admin_token configured; admin routes disabled");
    }
    let state = http::state::AppState {
        negotiator,
        stats,
        admin_token: config.admin_token.as_deref().map(Arc::from),
    };
    let app = http::build_router(state);

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let sweeper = tokio::spawn(heartbeat::run(monitor, shutdown_tx.subscribe()));
    let dispatcher_task = tokio::spawn(events::run_dispatcher(events_rx, sink, shutdown_tx.subscribe()));

    if config.localhost {
        run_localhost(config.port, app, &shutdown_tx).await;
    } else {
        run_dual_stack(config.port, app, &shutdown_tx).await;
    }

    wait_for_shutdown().await;
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(());

    // Give the dispatcher a moment to flush queued events.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), dispatcher_task).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), sweeper).await;

    tracing::info!("Goodbye.");
}

fn spawn_server(listener: tokio::net::TcpListener, app: Router, shutdown_tx: &broadcast::Sender<()>, label: &'static str) {
    let mut rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await
            .unwrap_or_else(|e| tracing::error!("{} server error: {}", label, e));
    });
}

/// Serve on 127.0.0.1 only.
async fn run_localhost(port: u16, app: Router, shutdown_tx: &broadcast::Sender<()>) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| fail(format!("failed to bind {}: {}", addr, e)));
    tracing::info!("Serving on http://{} (localhost only)", addr);
    spawn_server(listener, app, shutdown_tx, "HTTP");
}

/// Serve on separate IPv4 (0.0.0.0) and IPv6 (::) sockets.
async fn run_dual_stack(port: u16, app: Router, shutdown_tx: &broadcast::Sender<()>) {
    let ipv4_addr = format!("0.0.0.0:{}", port);
    let ipv4_listener = tokio::net::TcpListener::bind(&ipv4_addr)
        .await
        .unwrap_or_else(|e| fail(format!("failed to bind IPv4 {}: {}", ipv4_addr, e)));

    // IPV6_V6ONLY keeps the two sockets independent; Linux defaults to a shared stack.
    let ipv6_listener = match bind_ipv6(port) {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!("IPv6 listener unavailable ({}); serving IPv4 only", e);
            None
        }
    };

    tracing::info!(
        "Serving on port {} ({})",
        port,
        if ipv6_listener.is_some() { "IPv4 + IPv6" } else { "IPv4" }
    );

    if let Some(listener) = ipv6_listener {
        spawn_server(listener, app.clone(), shutdown_tx, "IPv6");
    }
    spawn_server(ipv4_listener, app, shutdown_tx, "IPv4");
}

fn bind_ipv6(port: u16) -> std::io::Result<tokio::net::TcpListener> {
    let addr: std::net::SocketAddr = std::net::SocketAddr::new(std::net::Ipv6Addr::UNSPECIFIED.into(), port);
    let socket = socket2::Socket::new(
        socket2::Domain::IPV6,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    if let Err(e) = socket.set_only_v6(true) {
        tracing::warn!("Could not set IPV6_V6ONLY: {} -- dual-bind may fail on Linux", e);
    }
    if let Err(e) = socket.set_reuse_address(true) {
        tracing::warn!("Could not set SO_REUSEADDR on IPv6 socket: {}", e);
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener)
}
