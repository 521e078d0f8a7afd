//! `restorage-server` binary.
//!
//! Opens a [`FileSystemStore`] rooted at `STORAGE_ROOT` and exposes it over
//! HTTP with `restorage-http`. Storage calls are blocking and run on tokio's
//! blocking pool; `WORKER_THREADS` bounds that pool.
//!
//! ```text
//! STORAGE_ROOT=/data GATEWAY_LISTEN=0.0.0.0:7000 restorage-server
//! restorage-server --health-check   # exit status 0 when the local server is up
//! ```
//!
//! Configuration is read from the environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `STORAGE_ROOT` | `/var/lib/restorage` | Directory holding buckets and objects |
//! | `GATEWAY_LISTEN` | `0.0.0.0:7000` | Socket address to listen on |
//! | `DELETE_MODE` | `tombstone` | `tombstone` or `unlink` |
//! | `MAX_TOMBSTONES` | `3` | Tombstones kept per key |
//! | `BUCKET_CACHE_CAPACITY` | `10000` | Entries in the bucket lookup cache |
//! | `BUCKET_CACHE_TTL_SECS` | `300` | Lifetime of a cached bucket lookup |
//! | `HASH_ALGORITHM` | `md5` | `md5` or `sha256` |
//! | `SYNC_WRITES` | `false` | fsync after object and descriptor writes |
//! | `WORKER_THREADS` | `256` | Upper bound on concurrent storage calls |
//! | `LOG_LEVEL` | `info` | Default tracing directive |
//! | `RUST_LOG` | *(unset)* | Full tracing filter; wins over `LOG_LEVEL` |

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use restorage_core::{FileSystemStore, StoreConfig};
use restorage_http::{RestorageHttpConfig, RestorageHttpService};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path answered by the service's health route.
const HEALTH_PATH: &str = "/_health";

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    HealthCheck,
}

impl Mode {
    fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        if args.into_iter().skip(1).any(|a| a == "--health-check") {
            Self::HealthCheck
        } else {
            Self::Serve
        }
    }
}

/// `RUST_LOG` when present, else `LOG_LEVEL`.
fn log_filter(log_level: &str) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid RUST_LOG filter: {directives}")),
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid LOG_LEVEL filter: {log_level}")),
    }
}

fn install_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(log_level)?)
        .with_target(true)
        .init();
    Ok(())
}

/// Accept loop. Stops taking connections once `stop` resolves and returns
/// after every open connection has finished.
async fn serve_until<F>(listener: TcpListener, service: RestorageHttpService, stop: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let builder = HttpConnBuilder::new(TokioExecutor::new());
    let drain = GracefulShutdown::new();
    let mut stop = std::pin::pin!(stop);

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            () = &mut stop => break,
        };
        let (socket, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let connection = drain.watch(
            builder
                .serve_connection(TokioIo::new(socket), service.clone())
                .into_owned(),
        );
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(%peer, error = %e, "connection ended with an error");
            }
        });
    }

    info!("listener closed, waiting for open connections");
    drain.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("ctrl-c received");
}

/// Where a local health check should connect for a given listen address.
fn local_target(listen: &str) -> String {
    listen.replace("0.0.0.0", "127.0.0.1")
}

fn is_healthy_reply(reply: &str) -> bool {
    let status_ok = reply
        .lines()
        .next()
        .is_some_and(|line| line.split_whitespace().nth(1) == Some("200"));
    status_ok && reply.contains(r#""status":"running""#)
}

/// One-shot HTTP/1.1 request against the health route.
async fn check_health(target: &str) -> Result<()> {
    let mut socket = TcpStream::connect(target)
        .await
        .with_context(|| format!("no server reachable at {target}"))?;

    let request =
        format!("GET {HEALTH_PATH} HTTP/1.1\r\nHost: {target}\r\nConnection: close\r\n\r\n");
    socket.write_all(request.as_bytes()).await?;

    let mut reply = String::new();
    socket.read_to_string(&mut reply).await?;
    debug!(target, bytes = reply.len(), "health reply received");

    anyhow::ensure!(is_healthy_reply(&reply), "server at {target} is not healthy");
    Ok(())
}

async fn start(config: StoreConfig) -> Result<()> {
    install_logging(&config.log_level)?;
    info!(
        version = VERSION,
        storage_root = %config.root_dir.display(),
        gateway_listen = %config.gateway_listen,
        delete_mode = %config.delete_mode,
        max_tombstones = config.max_tombstones,
        hash_algorithm = %config.hash_algorithm,
        worker_threads = config.worker_threads,
        "restorage-server starting",
    );

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("GATEWAY_LISTEN is not a socket address: {}", config.gateway_listen))?;

    let store = tokio::task::spawn_blocking(move || FileSystemStore::open(&config))
        .await
        .context("storage startup panicked")?
        .context("cannot open storage root")?;
    let service = RestorageHttpService::new(Arc::new(store), RestorageHttpConfig::default());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(%addr, "accepting connections");

    serve_until(listener, service, shutdown_signal()).await
}

fn main() -> Result<()> {
    let config = StoreConfig::from_env();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.worker_threads.max(1))
        .build()
        .context("cannot start tokio runtime")?;

    match Mode::from_args(std::env::args()) {
        Mode::HealthCheck => {
            let target = local_target(&config.gateway_listen);
            let healthy = runtime.block_on(check_health(&target)).is_ok();
            std::process::exit(i32::from(!healthy));
        }
        Mode::Serve => runtime.block_on(start(config)),
    }
}
