// Command-line and environment configuration shared by the subcommands.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

/// Provider options. The API key is mandatory: a missing key stops the
/// process before anything starts.
#[derive(clap::Args, Clone)]
pub struct GeminiArgs {
    #[arg(
        long,
        env = "GOOGLE_API_KEY",
        hide_env_values = true,
        help = "API key for the Gemini API."
    )]
    pub api_key: String,
    #[arg(long, env = "GEMINI_MODEL", default_value = constants::DEFAULT_MODEL, help = "Gemini model used for decomposition.")]
    pub model: String,
    #[arg(long, env = "GEMINI_API_URL", default_value = constants::DEFAULT_API_URL, help = "Base URL of the Gemini API.")]
    pub api_url: String,
    #[arg(long, default_value_t = constants::DEFAULT_TIMEOUT_SECS, help = "Timeout for a single Gemini call, in seconds.")]
    pub timeout_secs: u64,
}

impl fmt::Debug for GeminiArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiArgs")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GeminiArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED), help = "Address to bind the web server to.")]
    pub host: IpAddr,
    #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
    pub port: u16,
    #[arg(long, default_value = "templates", help = "Directory holding index.html.")]
    pub templates_dir: PathBuf,
    #[arg(long, default_value = "static", help = "Directory served under /static.")]
    pub static_dir: PathBuf,
    #[command(flatten)]
    pub gemini: GeminiArgs,
}

impl ServeArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long, env = "MENTOR_SERVER_URL", default_value = constants::DEFAULT_SERVER_URL, help = "Base URL of a running `mentor serve`.")]
    pub server: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DecomposeArgs {
    #[arg(help = "The goal to break into weekly tasks.")]
    pub goal: String,
    #[command(flatten)]
    pub gemini: GeminiArgs,
}
