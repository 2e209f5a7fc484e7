mod chat;
mod clipboard;
mod commands;
mod config;
mod render;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::App;

#[derive(Parser)]
#[command(name = "tvision", version, about = "T-Vision chat client")]
struct Cli {
    /// Backend base URL (overrides config and TVISION_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to the backend
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and log in
    Register {
        #[arg(short, long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored identity
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Check backend health
    Status,

    /// List your chats, most recent first
    History,

    /// Start a new chat
    New,

    /// Open a chat by id
    Open { session_id: String },

    /// Print the current chat
    Show,

    /// Delete a chat
    Delete {
        session_id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy a chat transcript to the clipboard (defaults to the current chat)
    Share {
        session_id: Option<String>,
        /// Also print the transcript
        #[arg(short, long)]
        print: bool,
    },

    /// Send a message in the current chat
    Send {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Upload an image to the current chat for analysis
    Upload { file: PathBuf },

    /// Interactive chat
    Chat,

    /// Show or toggle the color theme
    Theme {
        #[arg(long)]
        toggle: bool,
    },

    /// Show or set configuration
    Config {
        /// Set the server URL
        #[arg(long = "set-server")]
        set_server: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let server = cli.server.as_deref();
    if let Commands::Config { set_server } = &cli.command {
        return match set_server {
            Some(url) => config::set_server(url),
            None => config::show_config(server),
        };
    }

    let app = App::new(config::resolve(server)?)?;
    match cli.command {
        Commands::Login { username, password } => commands::login(&app, username, password).await,
        Commands::Register { username, password } => {
            commands::register(&app, username, password).await
        }
        Commands::Logout => commands::logout(&app),
        Commands::Whoami => commands::whoami(&app),
        Commands::Status => commands::status(&app).await,
        Commands::History => commands::history(&app).await,
        Commands::New => commands::new_chat(&app).await,
        Commands::Open { session_id } => commands::open(&app, &session_id).await,
        Commands::Show => commands::show(&app).await,
        Commands::Delete { session_id, yes } => commands::delete(&app, &session_id, yes).await,
        Commands::Share { session_id, print } => commands::share(&app, session_id, print).await,
        Commands::Send { text } => commands::send(&app, &text.join(" ")).await,
        Commands::Upload { file } => commands::upload(&app, &file).await,
        Commands::Chat => chat::run(&app).await,
        Commands::Theme { toggle } => commands::theme(&app, toggle),
        Commands::Config { .. } => Ok(()),
    }
}
