use crate::report::{run_session_report, run_tick, SessionReportArgs, TickArgs};
use crate::server;
use academy_ops::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Academy Ops",
    about = "Run the training-session compliance tracker and its dispatch scheduler",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one dispatch pass against the state file and print the digest
    Tick(TickArgs),
    /// Inspect stored training sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Print a session checklist with deadlines and statuses
    Report(SessionReportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Serve the API without the background dispatch loop
    #[arg(long)]
    pub(crate) no_scheduler: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Tick(args) => run_tick(args).await,
        Command::Session {
            command: SessionCommand::Report(args),
        } => run_session_report(args),
    }
}
