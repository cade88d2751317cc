use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use eatos::analysis::{AnalysisError, DEFAULT_IMAGE_MIME, FoodAnalyzer, GeminiClient};
use eatos::auth::{AuthError, FirebaseAuth};
use eatos::cache::{AppliedTheme, ColorScheme, CredentialCache, SecureCredentialCache, ThemePreference, ThemeSettings};
use eatos::config::data_dir_from_env;
use eatos::session::{SessionConfig, SessionStore};
use eatos::store::{EncryptedFileStore, KeyValueStore, StorageError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}: {}", .0.error_code(), .0)]
    Auth(#[from] AuthError),
    #[error("{}: {}", .0.error_code(), .0)]
    Storage(#[from] StorageError),
    #[error("{}: {}", .0.error_code(), .0)]
    Analysis(#[from] AnalysisError),
    #[error("failed to read {}: {source}", .path.display())]
    ReadImage { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "eatos", about = "Eatos session, credential cache, and food analysis CLI")]
struct Cli {
    /// Directory holding the encrypted store.
    #[arg(long, env = "EATOS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    SignIn {
        #[arg(long, env = "EATOS_EMAIL")]
        email: String,
        #[arg(long, env = "EATOS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    SignUp {
        #[arg(long, env = "EATOS_EMAIL")]
        email: String,
        #[arg(long, env = "EATOS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    SignOut,
    ResetPassword {
        #[arg(long, env = "EATOS_EMAIL")]
        email: String,
    },
    /// Change the display name and avatar of the restored session, signing
    /// in first when credentials are given.
    UpdateProfile {
        #[arg(long, env = "EATOS_EMAIL", requires = "password")]
        email: Option<String>,
        #[arg(long, env = "EATOS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        avatar_url: Option<String>,
    },
    /// Print the session once bootstrap settles, plus the cached credential.
    Whoami,
    AnalyzeText {
        text: String,
    },
    AnalyzeImage {
        path: PathBuf,
        #[arg(long, default_value = DEFAULT_IMAGE_MIME)]
        mime_type: String,
    },
    Theme {
        #[command(subcommand)]
        command: Option<ThemeCommand>,
        /// Device color scheme used to resolve `system`.
        #[arg(long, env = "EATOS_DEVICE_SCHEME", value_parser = parse_scheme)]
        device: Option<ColorScheme>,
    },
}

#[derive(Subcommand, Debug)]
enum ThemeCommand {
    Show,
    Set { preference: ThemePreference },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(data_dir_from_env);

    match cli.command {
        Command::AnalyzeText { text } => {
            let gemini = gemini()?;
            print_json(&serde_json::to_value(gemini.analyze_text(&text).await?)?)
        }
        Command::AnalyzeImage { path, mime_type } => {
            let image = tokio::fs::read(&path)
                .await
                .map_err(|source| CliError::ReadImage { path: path.clone(), source })?;
            let gemini = gemini()?;
            print_json(&serde_json::to_value(gemini.analyze_image(&image, &mime_type).await?)?)
        }
        Command::Theme { command, device } => {
            let store = open_store(data_dir).await?;
            run_theme(ThemeSettings::new(store), command.unwrap_or(ThemeCommand::Show), device).await
        }
        command => {
            let store = open_store(data_dir).await?;
            run_session(store, command).await
        }
    }
}

fn gemini() -> Result<GeminiClient, CliError> {
    let client = GeminiClient::from_env()?;
    tracing::debug!(model = client.model(), "gemini client initialized");
    Ok(client)
}

async fn open_store(data_dir: PathBuf) -> Result<Arc<dyn KeyValueStore>, CliError> {
    let store = EncryptedFileStore::open(data_dir).await?;
    tracing::debug!(dir = %store.dir().display(), "store opened");
    Ok(Arc::new(store))
}

async fn run_session(store: Arc<dyn KeyValueStore>, command: Command) -> Result<(), CliError> {
    let cache = Arc::new(SecureCredentialCache::new(store.clone()));
    let provider = Arc::new(FirebaseAuth::from_env()?.with_token_store(store));
    let session = SessionStore::start(provider.clone(), cache.clone(), SessionConfig::from_env());
    tokio::spawn(async move { provider.restore_session().await });
    session.resolved().await;

    match command {
        Command::SignIn { email, password } => session.sign_in(&email, &password).await?,
        Command::SignUp { email, password } => session.sign_up(&email, &password).await?,
        Command::SignOut => session.sign_out().await?,
        Command::ResetPassword { email } => {
            session.reset_password(&email).await?;
            return print_json(&json!({ "sent": true, "email": email }));
        }
        Command::UpdateProfile { email, password, display_name, avatar_url } => {
            if let (Some(email), Some(password)) = (email, password) {
                session.sign_in(&email, &password).await?;
            }
            session.update_profile(&display_name, avatar_url.as_deref()).await?;
        }
        Command::Whoami => {
            let cached = cache.load().await?;
            return print_json(&json!({ "session": session.state(), "cached": cached }));
        }
        Command::AnalyzeText { .. } | Command::AnalyzeImage { .. } | Command::Theme { .. } => {}
    }

    print_json(&serde_json::to_value(session.state())?)
}

async fn run_theme(
    settings: ThemeSettings,
    command: ThemeCommand,
    device: Option<ColorScheme>,
) -> Result<(), CliError> {
    let theme = settings.load(device).await;
    let applied = match command {
        ThemeCommand::Show => AppliedTheme { preference: theme.preference, scheme: theme.scheme },
        ThemeCommand::Set { preference } => theme.set_theme.set(preference).await,
    };
    print_json(&serde_json::to_value(applied)?)
}

fn parse_scheme(raw: &str) -> Result<ColorScheme, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "light" => Ok(ColorScheme::Light),
        "dark" => Ok(ColorScheme::Dark),
        other => Err(format!("unknown color scheme `{other}` (expected light or dark)")),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
