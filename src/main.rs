use std::sync::Arc;

use tracing::{error, info};

use talking::chat::ChatHub;
use talking::db::RoomRepository;
use talking::web::WebServer;
use talking::{Config, Database, JwtVerifier};

#[tokio::main]
async fn main() {
    // Load configuration
    let mut config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = talking::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        talking::logging::init_console_only(&config.logging.level);
    }

    info!("TALKING - real-time chat server");

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> talking::Result<()> {
    config.validate()?;

    let db = Database::open(&config.database.path).await?;
    let seeded = RoomRepository::new(db.pool()).seed_defaults().await?;
    if seeded > 0 {
        info!("Created {} default rooms", seeded);
    }

    let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
    let hub = Arc::new(ChatHub::new(db, verifier, &config));

    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );
    WebServer::new(&config.server, hub)?.run().await
}
