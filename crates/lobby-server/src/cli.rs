use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "lobby-server", about = "Realtime lobby and conversation server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/lobby.toml")]
    pub config: String,

    /// Override the configured bind address
    #[arg(short, long)]
    pub bind: Option<String>,
}
