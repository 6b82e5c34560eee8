//! grasshopper-mcp: MCP server bridging AI assistants to Grasshopper
//!
//! Tool calls arrive over stdio and are forwarded to the Grasshopper MCP
//! component as line-delimited JSON over TCP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use grasshopper_mcp::config::{self, Config};
use grasshopper_mcp::grasshopper::{
    CommandDispatcher, GrasshopperClient, KnowledgeBaseAccessor, KnowledgeSource, TcpTransport,
    WireProtocol,
};
use grasshopper_mcp::mcp::server::McpServer;

/// MCP server bridging AI assistants to Rhino Grasshopper.
///
/// Exposes canvas editing, document and scripting tools, forwarding each call
/// to the Grasshopper MCP component listening on a TCP port.
#[derive(Parser, Debug)]
#[command(name = "grasshopper-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Grasshopper host (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Grasshopper port (overrides the configuration file)
    #[arg(long)]
    port: Option<u16>,

    /// Envelope shape sent to Grasshopper: legacy or jsonrpc
    #[arg(long)]
    protocol: Option<WireProtocol>,

    /// Wait time for each exchange with Grasshopper, in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Applies command-line overrides on top of the loaded configuration.
    fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.grasshopper.host.clone_from(host);
        }
        if let Some(port) = self.port {
            cfg.grasshopper.port = port;
        }
        if let Some(protocol) = self.protocol {
            cfg.grasshopper.protocol = protocol;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            cfg.grasshopper.timeout_ms = timeout_ms;
        }
    }
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the dispatcher described by the configuration.
fn build_dispatcher(cfg: &Config) -> CommandDispatcher {
    let gh = &cfg.grasshopper;
    let transport = TcpTransport::new(&gh.host, gh.port, gh.timeout());
    let client = GrasshopperClient::new(transport, gh.protocol);

    let source = cfg
        .knowledge_base_path
        .clone()
        .map_or(KnowledgeSource::Embedded, KnowledgeSource::File);

    CommandDispatcher::new(client, Arc::new(KnowledgeBaseAccessor::new(source)))
}

/// Entry point for the grasshopper-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("See config/example-config.json for the expected format");
            return ExitCode::FAILURE;
        }
    };

    args.apply_overrides(&mut cfg);
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting grasshopper-mcp server"
    );
    info!(
        host = %cfg.grasshopper.host,
        port = cfg.grasshopper.port,
        protocol = %cfg.grasshopper.protocol,
        timeout_ms = cfg.grasshopper.timeout_ms,
        "Grasshopper connection configured"
    );

    let mut server = McpServer::new(build_dispatcher(&cfg));

    info!("MCP server ready, waiting for client connection...");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(server.run());

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn overrides_replace_file_values() {
        let args = Args::parse_from([
            "grasshopper-mcp",
            "--host",
            "rhino-box",
            "--port",
            "9000",
            "--protocol",
            "jsonrpc",
            "--timeout-ms",
            "250",
        ]);
        let mut cfg = Config::default();
        args.apply_overrides(&mut cfg);

        assert_eq!(cfg.grasshopper.host, "rhino-box");
        assert_eq!(cfg.grasshopper.port, 9000);
        assert_eq!(cfg.grasshopper.protocol, WireProtocol::JsonRpc);
        assert_eq!(cfg.grasshopper.timeout_ms, 250);
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(2, false, "warn"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "info"), Level::INFO);
        assert_eq!(get_log_level(0, false, "loud"), Level::WARN);
    }
}
