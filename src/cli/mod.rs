use crate::Result;
use clap::Parser;

mod config;
mod ps;
mod run;
mod serve;

#[derive(Debug, clap::Parser)]
#[clap(name = "hell", version, about = "Supervisor for a fleet of long-running daemons")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    Serve(serve::Serve),
    Run(run::Run),
    Config(config::Config),
    Ps(ps::Ps),
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    match args.command {
        Command::Serve(serve) => serve.run().await,
        Command::Run(run) => run.run().await,
        Command::Config(config) => config.run().await,
        Command::Ps(ps) => ps.run().await,
    }
}
