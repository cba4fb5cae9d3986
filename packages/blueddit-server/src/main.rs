//! Blueddit Server
//!
//! Serves the built Blueddit client and a liveness endpoint:
//!
//! 1. **`GET /api/health`**: `{"status":"ok","timestamp":"<RFC 3339>"}`.
//!
//! 2. **Static client**: any other path is looked up in the static directory;
//!    unknown paths get `index.html` so client-side routes resolve.
//!
//! A panicking handler yields `500 {"error":"Something broke!"}`.

mod routes;

use std::path::PathBuf;

use clap::Parser;

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "blueddit-server", version, about = "Blueddit static client server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "PORT")]
    port: u16,

    /// Directory holding the built client (index.html and assets)
    #[arg(long, default_value = "dist", env = "STATIC_DIR")]
    static_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false, env = "LOG_JSON")]
    log_json: bool,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blueddit_server=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if !args.static_dir.join("index.html").is_file() {
        tracing::warn!(
            static_dir = %args.static_dir.display(),
            "index.html not found, client routes will 404"
        );
    }

    let app = routes::app(&args.static_dir);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Blueddit server running on port {}", args.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
