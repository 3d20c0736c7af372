mod cmd;
mod util;

use argp::FromArgs;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(FromArgs, PartialEq, Debug)]
/// Operator tools for the pull request code checker.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
    #[argp(switch, short = 'v', global)]
    /// print debug logs
    verbose: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Check(cmd::check::Args),
    Sign(cmd::sign::Args),
}

#[tokio::main]
async fn main() {
    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    let level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let result = match args.command {
        SubCommand::Check(args) => cmd::check::run(args).await,
        SubCommand::Sign(args) => cmd::sign::run(args),
    };
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(2);
        }
    }
}
