use crate::context::Context;

mod run;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Run the edge server and the KV store API
    Run(run::Options),
}

pub async fn run(cmd: Command, ctx: Context) -> miette::Result<()> {
    match cmd {
        Command::Run(opts) => run::run(opts, ctx).await,
    }
}
