use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use social_chat::config;
use social_chat::error::ClientError;
use social_chat::network::{ApiClient, ChatApi};
use social_chat::storage::{self, CredentialDatabase, Credentials};
use social_chat::store::{ChatListStore, Session};
use social_chat::ui::{self, ChatApp};

#[derive(Parser)]
#[command(
    name = "social_chat",
    version,
    about = "Terminal client for the social network's chat and presence channel"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Command {
    /// Store the user id and bearer token used for the API and the channel
    Login {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        token: String,
    },
    /// Forget the stored token
    Logout,
    /// Show the stored login
    Whoami,
    /// Print the conversation list and exit
    Chats,
    /// Connect and chat interactively (default)
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = config::ensure_config_file(&cli.config) {
        log::warn!("Cannot write default config to {}: {err}", cli.config);
    }
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env_overrides();

    let db_path = Path::new(&app_config.database_path);
    storage::ensure_parent_dir(db_path)
        .with_context(|| format!("cannot create directory for {}", db_path.display()))?;
    let credentials = CredentialDatabase::with_path(db_path)
        .with_context(|| format!("cannot open {}", db_path.display()))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Login { user_id, token } => {
            let session = Session::login(&credentials, Credentials::new(user_id, token))?;
            println!("Logged in as {}", session.user_id());
        }
        Command::Logout => match Session::restore(&credentials) {
            Ok(session) => {
                session.logout(&credentials)?;
                println!("Logged out");
            }
            Err(ClientError::NotLoggedIn) => println!("Not logged in"),
            Err(err) => return Err(err.into()),
        },
        Command::Whoami => {
            let session = Session::restore(&credentials)?;
            println!("{}", session.user_id());
        }
        Command::Chats => {
            let session = Session::restore(&credentials)?;
            let api = ApiClient::new(app_config.api_base_url.clone(), session.token());
            print_chats(&api).await?;
        }
        Command::Run => {
            let session = Session::restore(&credentials)?;
            ChatApp::new(&app_config, session).run().await?;
        }
    }

    Ok(())
}

async fn print_chats(api: &dyn ChatApi) -> anyhow::Result<()> {
    let chat_list = ChatListStore::new();
    chat_list.load(api).await.context("failed to load conversations")?;
    println!("{}", ui::components::chat_list::render(&chat_list.snapshot()));
    Ok(())
}
