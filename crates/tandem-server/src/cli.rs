use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tandem-server", about = "Tandem pairing and messaging server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tandem.toml")]
    pub config: String,
}
