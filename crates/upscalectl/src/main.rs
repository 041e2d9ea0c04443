mod cli;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Upscale(args) => run::upscale(args),
        Command::Pattern(args) => run::pattern(args),
        Command::Config(args) => run::config(args),
    }
}
