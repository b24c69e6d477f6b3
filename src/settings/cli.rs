use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "credence", about = "Access and refresh token service")]
pub struct Cli {
    /// Path to a settings file. Defaults to the profile's file under `settings/`.
    #[arg(long)]
    pub settings: Option<String>,
}
