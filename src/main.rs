use clap::{Args, Parser, Subcommand};

use skybuild::builder;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "skybuild")]
#[command(version = VERSION)]
#[command(about = "Build and deploy automation for Go services")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full build pipeline
    Build(RunArgs),
    /// Copy the built binary to the configured deploy path
    Deploy(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the build configuration file
    #[arg(short, long, default_value = "./build.cfg")]
    config: String,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build(args) => builder::build(&args.config),
        Commands::Deploy(args) => builder::deploy(&args.config),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {}", err.code(), err);
            std::process::ExitCode::FAILURE
        }
    }
}
