use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use mentor::config::{ChatArgs, DecomposeArgs, ServeArgs};
use mentor::gemini::GeminiClient;
use mentor::plan::DecomposeResponse;
use mentor::{chat, decompose, web_server};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the chat page and the goal decomposition API.
    Serve(ServeArgs),
    /// Chat with a running server from the terminal.
    Chat(ChatArgs),
    /// Decompose a single goal and print the weekly plan as JSON.
    Decompose(DecomposeArgs),
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,mentor=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse command-line arguments; a missing GOOGLE_API_KEY stops here
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            info!("Starting mentor on {}...", args.addr());

            // One provider client for the whole process, shared through router state
            let gemini = GeminiClient::from_args(&args.gemini)
                .context("Failed to initialize Gemini client")?;

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(&args, gemini).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            // Pin the ctrl_c future to the stack so its address is stable
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat(args) => {
            chat::run_chat(&args.server)
                .await
                .context("Chat session failed")?;
        }
        Commands::Decompose(args) => {
            let gemini = GeminiClient::from_args(&args.gemini)
                .context("Failed to initialize Gemini client")?;
            let weekly_plan = decompose::decompose_goal(&gemini, &args.goal)
                .await
                .context("Failed to decompose goal")?;
            let output = serde_json::to_string_pretty(&DecomposeResponse { weekly_plan })
                .context("Failed to serialize weekly plan")?;
            println!("{}", output);
        }
    }

    Ok(())
}
