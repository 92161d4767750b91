use clap::Parser;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uid_gateway::{Config, ConfigLoad, Gateway};

/// RADIUS accounting to firewall User-ID gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "uid-gateway")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start the gateway)
    #[arg(short, long)]
    validate: bool,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_summary(config: &Config) {
    println!("✓ Configuration validated successfully!");
    println!();
    println!("Configuration summary:");
    println!("  Listen: {}:{}", config.listen_address, config.accounting_port);
    println!("  Log level: {}", config.log_filter());
    println!(
        "  Batching: {} events, {} ms wait",
        config.uid_api.batch_size, config.uid_api.batch_wait_ms
    );
    if let Some(ref addr) = config.metrics_address {
        println!("  Metrics: {}", addr);
    }
    println!();

    if config.radius_clients.is_empty() {
        println!("⚠️  WARNING: No RADIUS clients configured!");
    } else {
        println!("RADIUS clients:");
        for client in &config.radius_clients {
            println!("  {} - {}", client.host, client.display_name());
        }
    }

    if config.uid_api.endpoints.is_empty() {
        println!("⚠️  WARNING: No User-ID API endpoints configured!");
    } else {
        println!("User-ID API endpoints (failover order):");
        for endpoint in &config.uid_api.endpoints {
            println!("  {}", endpoint.url);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = if cli.validate {
        Config::from_file(&cli.config_path).map(ConfigLoad::Loaded)
    } else {
        Config::load_or_create(&cli.config_path)
    };

    let config = match loaded {
        Ok(ConfigLoad::Loaded(cfg)) => cfg,
        Ok(ConfigLoad::Created) => {
            init_tracing("info");
            warn!("No config file found at {}", cli.config_path);
            info!("Created example configuration at: {}", cli.config_path);
            info!("Please edit {} and restart the gateway", cli.config_path);
            process::exit(0);
        }
        Err(e) => {
            init_tracing("info");

            if cli.validate {
                eprintln!("❌ Configuration validation failed!");
                eprintln!("   Error: {}", e);
            } else {
                error!("Could not load config file from {}: {}", cli.config_path, e);
            }
            process::exit(1);
        }
    };

    if cli.validate {
        if let Err(e) = config.validate() {
            eprintln!("❌ Configuration validation failed!");
            eprintln!("   Error: {}", e);
            process::exit(1);
        }
        print_summary(&config);
        process::exit(0);
    }

    init_tracing(config.log_filter());

    info!("RADIUS User-ID gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let gateway = match Gateway::start(&config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            process::exit(1);
        }
    };

    info!("Press Ctrl+C to stop");

    if let Err(e) = gateway.run_until(shutdown_signal()).await {
        error!("Gateway error: {}", e);
        process::exit(1);
    }
}
