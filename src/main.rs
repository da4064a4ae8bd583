use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keyvault_mcp::azure::{DefaultAzureCredential, TokenCredential};
use keyvault_mcp::core::config::{Config, KEYVAULT_URL_ENV, WORKSPACE_ID_ENV};
use keyvault_mcp::mcp::{self, KeyVaultService, LOGS_NOT_CONFIGURED, MCP_PATH};

#[derive(Parser)]
#[command(name = "keyvault-mcp")]
#[command(about = "MCP server exposing Azure Key Vault secrets and audit logs as tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server (also default)
    Serve {
        #[arg(long, help = "Bind host (default: MCP_HOST or 0.0.0.0)")]
        host: Option<String>,
        #[arg(long, help = "Bind port (default: MCP_PORT or 3000)")]
        port: Option<u16>,
        #[arg(long, help = "Serve over stdin/stdout instead of HTTP")]
        stdio: bool,
    },
    /// Show which tools this environment enables
    Tools {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show MCP client configuration instructions
    Install,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run_server(None, None, false),
        Some(Commands::Serve { host, port, stdio }) => run_server(host, port, stdio),
        Some(Commands::Tools { json }) => print_tools(json),
        Some(Commands::Install) => {
            print_install_instructions();
            Ok(())
        }
    }
}

/// Log to stderr; stdout carries the protocol in stdio mode.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .init();
}

fn load_config(host: Option<String>, port: Option<u16>) -> anyhow::Result<Config> {
    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    Ok(config)
}

fn run_server(host: Option<String>, port: Option<u16>, stdio: bool) -> anyhow::Result<()> {
    init_logging();

    let config = load_config(host, port)?;
    let credential = DefaultAzureCredential::from_env();

    info!(vault = %config.keyvault_url, "Key Vault MCP Server starting");
    info!(sources = ?credential.source_names(), "Credential chain");
    match &config.workspace_id {
        Some(workspace_id) => info!(workspace = %workspace_id, "Log Analytics enabled"),
        None => info!("Log Analytics disabled ({} not set)", WORKSPACE_ID_ENV),
    }

    let credential: Arc<dyn TokenCredential> = Arc::new(credential);
    let service = KeyVaultService::from_config(&config, credential);

    let runtime = tokio::runtime::Runtime::new()?;
    if stdio {
        runtime.block_on(mcp::run_stdio_server(service))
    } else {
        runtime.block_on(mcp::run_http_server(service, &config.bind_address()))
    }
}

fn print_tools(json: bool) -> anyhow::Result<()> {
    use colored::Colorize;

    let config = load_config(None, None)?;
    let tools = [
        ("getSecret", "secretName", true),
        ("listSecrets", "", true),
        ("queryKeyVaultLogs", "query, timeSpanHours?", config.logs_enabled()),
    ];

    if json {
        let entries: Vec<serde_json::Value> = tools
            .iter()
            .map(|(name, inputs, enabled)| {
                serde_json::json!({"name": name, "inputs": inputs, "enabled": enabled})
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "vault": config.keyvault_url.as_str(),
                "workspace": config.workspace_id,
                "tools": entries,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Key Vault MCP Tools".bold().cyan());
    println!("  Vault: {}", config.keyvault_url.as_str().yellow());
    println!();
    for (name, inputs, enabled) in tools {
        let status = if enabled {
            "enabled".green()
        } else {
            "not configured".dimmed()
        };
        println!("  • {}({}) - {}", name.green(), inputs, status);
    }
    if !config.logs_enabled() {
        println!();
        println!("  {}", LOGS_NOT_CONFIGURED.dimmed());
    }
    Ok(())
}

fn print_install_instructions() {
    use colored::Colorize;

    println!("{}", "Key Vault MCP Server Installation Guide".bold().cyan());
    println!();
    println!("{}", "Environment:".bold());
    println!("  {} - vault URL (required)", KEYVAULT_URL_ENV.yellow());
    println!(
        "  {} - enables queryKeyVaultLogs (optional)",
        WORKSPACE_ID_ENV.yellow()
    );
    println!("  AZURE_TENANT_ID / AZURE_CLIENT_ID / AZURE_CLIENT_SECRET - service principal (optional, managed identity otherwise)");
    println!();
    println!("{}", "Remote (Streamable HTTP, .mcp.json):".dimmed());
    println!(
        r#"{{
  "mcpServers": {{
    "keyvault": {{
      "type": "http",
      "url": "https://<your-host>{}"
    }}
  }}
}}"#,
        MCP_PATH
    );
    println!();
    println!("{}", "Local (stdio):".dimmed());
    println!(
        r#"{{
  "mcpServers": {{
    "keyvault": {{
      "command": "keyvault-mcp",
      "args": ["serve", "--stdio"],
      "env": {{
        "{}": "https://<vault-name>.vault.azure.net"
      }}
    }}
  }}
}}"#,
        KEYVAULT_URL_ENV
    );
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Retrieve a secret value", "getSecret".green());
    println!("  • {} - List secret names (not values)", "listSecrets".green());
    println!(
        "  • {} - Query Key Vault audit logs (KQL)",
        "queryKeyVaultLogs".green()
    );
}
