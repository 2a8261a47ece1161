use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "morph", about = "Type-directed conversion of JSON documents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a JSON document and print the result
    Convert(ConvertArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ConvertArgs {
    /// Input file, `-` for stdin
    #[arg(long, short, default_value = "-")]
    pub input: String,

    /// Destination type: any, bool, int, float, str, list or map
    #[arg(long, default_value = "any")]
    pub to: String,

    /// Item type for `list` and `map` destinations
    #[arg(long)]
    pub item: Option<String>,

    /// Drop null items at every level
    #[arg(long)]
    pub strip_none: bool,

    /// Engine TOML configuration
    #[arg(long, env = "MORPH_CONFIG")]
    pub config: Option<String>,
}
