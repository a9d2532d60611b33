mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "verbtab")]
#[command(about = "Browse the web as named tabs and verbs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a URL in a tab, creating or replacing it
    Open {
        /// Tab name
        tab: String,
        /// URL to open (https:// is assumed when no scheme is given)
        url: String,
    },

    /// List a tab's verbs, or run one
    Verbs {
        /// Tab name
        tab: String,
        /// Verb to run; a container lists its subverbs
        verb: Option<String>,
        /// Subverb of a container
        child: Option<String>,

        /// Ask the planner for verbs instead of reading the page structure
        #[arg(long)]
        planner: bool,

        /// Ignore cached verbs
        #[arg(long)]
        refresh: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the text of a tab's current page
    Text {
        /// Tab name
        tab: String,
        /// Maximum number of lines
        #[arg(short = 'n', long, default_value_t = 100)]
        lines: usize,
    },

    /// List open tabs
    Tabs {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a tab
    Close {
        /// Tab name
        tab: String,
    },

    /// Re-extract verbs with the planner, guided by a description
    Refine {
        /// Tab name
        tab: String,
        /// What to look for
        guidance: String,
        /// Only rebuild the subverbs of this container
        #[arg(long)]
        into: Option<String>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Check fetcher and planner setup
    Doctor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose; logs go to stderr so stdout stays clean for --json
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Open { tab, url } => {
            commands::open::run(&tab, &url).await?;
        }
        Commands::Verbs {
            tab,
            verb,
            child,
            planner,
            refresh,
            json,
        } => {
            let opts = commands::verbs::VerbsOptions {
                planner,
                refresh,
                json,
            };
            commands::verbs::run(&tab, verb.as_deref(), child.as_deref(), opts).await?;
        }
        Commands::Text { tab, lines } => {
            commands::text::run(&tab, lines).await?;
        }
        Commands::Tabs { json } => {
            commands::tabs::run(json)?;
        }
        Commands::Close { tab } => {
            commands::close::run(&tab)?;
        }
        Commands::Refine {
            tab,
            guidance,
            into,
            json,
        } => {
            commands::refine::run(&tab, &guidance, into.as_deref(), json).await?;
        }
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
    }

    Ok(())
}
