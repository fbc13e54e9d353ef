use super::Parser;

#[derive(Parser, Debug)]
#[command(about = "Session credential service")]
pub struct Cli {
    /// Path to a TOML settings file; environment variables prefixed with
    /// `TURNSTILE_` override individual keys.
    #[arg(long)]
    pub settings: Option<String>,
}
