use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "reporter-probe",
    about = "Bring configured datasources up and report their health",
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Connect every datasource once and print its health (default)")]
    Status {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Run the health checker until interrupted")]
    Watch,

    #[command(about = "List the schemas and tables of one datasource")]
    Schemas {
        #[arg(help = "Datasource identity (CONFIG_NAME)")]
        identity: String,
    },
}
