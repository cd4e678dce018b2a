use clap::Parser;

use pedalgrid::cli::{Cli, Commands};
use pedalgrid::commands;

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.command {
        Commands::Fishnet(args) => commands::fishnet::run(&cli, args),
        Commands::Trips(args) => commands::trips::run(&cli, args),
        Commands::Segments(args) => commands::segments::run(&cli, args),
        Commands::Emissions(args) => commands::emissions::run(&cli, args),
        Commands::Poi(args) => commands::poi::run(&cli, args),
        Commands::Roads(args) => commands::roads::run(&cli, args),
        Commands::Transit(args) => commands::transit::run(&cli, args),
        Commands::Population(args) => commands::population::run(&cli, args),
        Commands::Centre => commands::centre::run(&cli),
        Commands::Assemble(args) => commands::assemble::run(&cli, args),
        Commands::Run(args) => commands::run::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> {
    run()
}
