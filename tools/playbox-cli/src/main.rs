use clap::{Parser, Subcommand};

mod cli;

use cli::config::ServeFlags;

#[derive(Parser)]
#[command(name = "playbox")]
#[command(about = "Sandboxed player for zipped HTML5 game bundles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of a bundle with their kind and size.
    Inspect {
        bundle: String,
        #[arg(long)]
        json: bool,
    },
    /// Validate a bundle the way the player would load it.
    Check { bundle: String },
    /// Serve games from the catalog API in sandboxed frames.
    Serve {
        #[arg(long)]
        listen: Option<String>,
        #[arg(long = "api-base")]
        api_base: Option<String>,
        #[arg(long = "public-base")]
        public_base: Option<String>,
        #[arg(long = "max-sessions")]
        max_sessions: Option<usize>,
    },
    /// Serve a single bundle without a catalog.
    Play {
        bundle: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "local")]
        slug: String,
        #[arg(long)]
        listen: Option<String>,
        #[arg(long = "public-base")]
        public_base: Option<String>,
        #[arg(long = "max-sessions")]
        max_sessions: Option<usize>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Inspect { bundle, json } => cli::inspect::run_inspect(&bundle, json),
        Commands::Check { bundle } => cli::check::run_check(&bundle),
        Commands::Serve {
            listen,
            api_base,
            public_base,
            max_sessions,
        } => cli::serve::run_serve(ServeFlags {
            listen,
            api_base,
            public_base,
            max_sessions,
        }),
        Commands::Play {
            bundle,
            title,
            slug,
            listen,
            public_base,
            max_sessions,
        } => cli::serve::run_play(
            &bundle,
            title,
            &slug,
            ServeFlags {
                listen,
                api_base: None,
                public_base,
                max_sessions,
            },
        ),
    };
    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
