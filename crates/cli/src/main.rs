use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wabot")]
#[command(about = "WhatsApp webhook relay to a local Ollama model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a config template to fill in (verify token, access token, phone number id).
    Init {
        /// Config file path (default: WABOT_CONFIG_PATH or ~/.wabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the webhook gateway. Point the Meta app's webhook at http(s)://<host>/<webhookPath>.
    Gateway {
        /// Config file path (default: WABOT_CONFIG_PATH or ~/.wabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 5000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one prompt to the configured Ollama model and print the reply (no WhatsApp involved).
    Ask {
        /// Config file path (default: WABOT_CONFIG_PATH or ~/.wabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Prompt text.
        prompt: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("wabot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, prompt }) => {
            if let Err(e) = run_ask(config, &prompt).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(wabot::config::default_config_path);
    let dir = wabot::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = wabot::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    wabot::gateway::run_gateway(config).await
}

async fn run_ask(config_path: Option<std::path::PathBuf>, prompt: &str) -> anyhow::Result<()> {
    use wabot::config;

    let (config, _) = config::load_config(config_path)?;
    let ollama = wabot::llm::OllamaClient::new(config::resolve_ollama_base_url(&config));
    let model = config::resolve_model(&config);
    let reply = wabot::agent::generate_response(
        &ollama,
        &model,
        prompt,
        config::resolve_max_reply_chars(&config),
    )
    .await?;
    println!("{}", reply);
    Ok(())
}
