use anyhow::Context;
use clap::Parser;
use kagami::config::Config;
use kagami::proxy::GatewayProxy;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;

/// Kagami - signed-URL image transformation gateway built on Pingora
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override server.address
    #[arg(long)]
    address: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override security.secret
    #[arg(long)]
    secret: Option<String>,

    /// Accept unsigned `unsafe/` paths
    #[arg(long = "unsafe")]
    unsafe_mode: bool,

    /// Override logging.level (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.server.address = address.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(secret) = &self.secret {
            config.security.secret = secret.clone();
        }
        if self.unsafe_mode {
            config.security.unsafe_mode = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    kagami::logging::init_subscriber(&config.logging)
        .context("failed to initialize logging subsystem")?;

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        unsafe_mode = config.security.unsafe_mode,
        coalescing = config.coalescing.enabled,
        "Configuration loaded successfully"
    );

    if args.test {
        tracing::info!("Configuration test passed");
        return Ok(());
    }

    // Backends are built once; their clients are runtime-agnostic
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start setup runtime")?;
    let engine = runtime
        .block_on(config.build_engine())
        .context("failed to build engine")?;

    tracing::info!(
        loaders = engine.loader_count(),
        processors = engine.processor_count(),
        storages = engine.storage_count(),
        "Engine ready"
    );

    let opt = Opt {
        daemon: args.daemon,
        upgrade: args.upgrade,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt)).context("failed to create Pingora server")?;
    server.bootstrap();

    let proxy = GatewayProxy::new(
        engine,
        config.server.path_prefix.clone(),
        config.security.unsafe_mode,
    );
    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);

    let listen_addr = config.server.listen_addr();
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(address = %listen_addr, "Starting Kagami image gateway");

    server.add_service(proxy_service);
    server.run_forever();
}
