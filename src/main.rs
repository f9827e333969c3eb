use clap::Parser;
use canopy::cli::commands::{Cli, Commands};
use canopy::cli::handlers;

fn main() {
    let cli = Cli::parse();
    canopy::telemetry::init(cli.verbose);

    let result = match cli.command {
        // Init is handled before project discovery
        Commands::Init => handlers::start_dir(cli.project_dir.as_deref())
            .and_then(|root| handlers::cmd_init(&root, cli.json)),
        _ => handlers::dispatch(cli),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
