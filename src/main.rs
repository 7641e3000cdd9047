//! AssignHub - assignment and solution exchange backend
//! Mission: Let students post assignments, helpers answer them, and admins keep order

use anyhow::{Context, Result};
use assignhub_backend::{
    auth::{JwtHandler, PasswordHasher},
    build_router,
    db::Database,
    storage::{DiskStorage, FileStorage},
    AppState, Config,
};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();
    config.validate()?;

    info!("🚀 AssignHub backend starting");
    info!("⚙️  {:?}", config);

    let db = Database::open(&config.db_path)?;
    let jwt = JwtHandler::new(
        &config.jwt_secret,
        chrono::Duration::minutes(config.token_ttl_minutes),
    );
    let hasher = PasswordHasher::new(config.bcrypt_cost)?;
    let assignment_files: Arc<dyn FileStorage> = Arc::new(DiskStorage::new(&config.upload_dir));
    let solution_files: Arc<dyn FileStorage> =
        Arc::new(DiskStorage::new(&config.solution_upload_dir));

    info!("🔐 Authentication initialized (bcrypt cost {})", hasher.cost());

    let state = AppState::new(
        db,
        jwt,
        hasher,
        assignment_files,
        solution_files,
        config.max_upload_bytes,
    );
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("🎯 API server listening on {}", config.bind);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assignhub_backend=debug,assignhub=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // cwd and parents first, then the crate root when launched from elsewhere
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
