//! drive_fetch CLI - List and download Google Drive folders.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drive_fetch::{
    extract_file_id, Authenticator, DriveClient, DriveConfig, OAuthFlow, StoredToken,
};

/// CLI tool for reading Google Drive folders.
#[derive(Parser)]
#[command(name = "drive_fetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to service account JSON credentials file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", conflicts_with = "client_id")]
    credentials: Option<PathBuf>,

    /// OAuth2 client ID for user-delegated access.
    #[arg(long, env = "GOOGLE_CLIENT_ID", requires = "client_secret")]
    client_id: Option<String>,

    /// OAuth2 client secret.
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// File holding the OAuth2 token between runs.
    #[arg(long, env = "DRIVE_TOKEN_FILE", default_value = "drive_token.json")]
    token_file: PathBuf,

    /// Directory downloads are written to (defaults to the system temp dir).
    #[arg(long, short = 'o', env = "DRIVE_DOWNLOAD_DIR")]
    output_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in a folder.
    List {
        /// Folder URL or ID.
        folder: String,

        /// Include subfolders (requires authentication).
        #[arg(long, short = 'r')]
        recursive: bool,

        /// MIME types to keep (repeatable).
        #[arg(long = "mime-type", short = 'm')]
        mime_types: Vec<String>,
    },

    /// Download a single file.
    Download {
        /// File URL or ID to download.
        file: String,

        /// Local file name (defaults to file_<ID>).
        #[arg(long, short = 'n')]
        name: Option<String>,
    },

    /// Download every file of a folder.
    DownloadFolder {
        /// Folder URL or ID.
        folder: String,

        /// Only the folder itself, not its subfolders.
        #[arg(long)]
        flat: bool,
    },

    /// Run the OAuth2 consent flow and store the token.
    Auth {
        /// Authorization code from the consent page. Without it, the consent
        /// URL is printed.
        #[arg(long)]
        code: Option<String>,

        /// Redirect URI registered for the OAuth client.
        #[arg(long, default_value = drive_fetch::oauth::OOB_REDIRECT_URI)]
        redirect_uri: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = DriveConfig::default();
    if let Some(dir) = &cli.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        config = config.with_download_dir(dir);
    }

    if let Commands::Auth { code, redirect_uri } = &cli.command {
        let (client_id, client_secret) = match (&cli.client_id, &cli.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => bail!("--client-id and --client-secret are required for auth"),
        };
        let flow = OAuthFlow::new(client_id, client_secret, &config)
            .with_redirect_uri(redirect_uri);

        match code {
            None => {
                let (url, _state) = flow.authorization_url()?;
                println!("Open this URL and authorize access:\n\n{}\n", url);
                println!("Then run: drive_fetch auth --code <CODE>");
            }
            Some(code) => {
                let (_, token) = flow
                    .complete(code)
                    .await
                    .context("Failed to exchange authorization code")?;
                save_token(&cli.token_file, &token)?;
                println!("Token saved to {:?}", cli.token_file);
            }
        }
        return Ok(());
    }

    let session = load_session(&cli).await?;
    let mut client = DriveClient::new(config);
    if let Some(session) = session {
        client = client.with_session(session);
    }

    match cli.command {
        Commands::List {
            folder,
            recursive,
            mime_types,
        } => {
            let mime_types = (!mime_types.is_empty()).then_some(mime_types);
            let listing = if recursive {
                client
                    .list_folder_recursive(&folder, mime_types.as_deref())
                    .await
            } else {
                client.list_folder_files(&folder, mime_types.as_deref()).await
            };
            let files =
                listing.with_context(|| format!("Failed to list files in folder: {}", folder))?;

            if files.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<44} {:>10} {:<30} {}", "ID", "SIZE", "TYPE", "NAME");
                println!("{}", "-".repeat(100));
                for file in files {
                    println!("{}", file);
                }
            }
        }

        Commands::Download { file, name } => {
            let file_id = extract_file_id(&file);
            let name = name.unwrap_or_else(|| format!("file_{}", file_id));

            let path = client
                .download_file(&file_id, &name)
                .await
                .with_context(|| format!("Failed to download file: {}", file_id))?;

            println!("Saved to: {:?}", path);
        }

        Commands::DownloadFolder { folder, flat } => {
            let results = client
                .download_folder(&folder, !flat)
                .await
                .with_context(|| format!("Failed to download folder: {}", folder))?;

            for result in &results {
                println!("{}\t{}", result.file.id, result.local_path.display());
            }
            println!("Downloaded {} file(s).", results.len());
        }

        Commands::Auth { .. } => unreachable!("handled above"),
    }

    // Tokens may have been refreshed during the run.
    if let Some(session) = client.session() {
        if let Some(token) = session.stored_token().await {
            save_token(&cli.token_file, &token)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "drive_fetch=debug"
    } else {
        "drive_fetch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Pick a session from the service account file or the stored user token.
async fn load_session(cli: &Cli) -> Result<Option<Authenticator>> {
    if let Some(path) = &cli.credentials {
        let session = Authenticator::from_file(path)
            .with_context(|| format!("Failed to load credentials from {:?}", path))?;
        return Ok(Some(session));
    }

    if cli.client_id.is_none() {
        return Ok(None);
    }
    if !cli.token_file.exists() {
        warn!(
            "no token file at {:?}; run `drive_fetch auth` to authorize",
            cli.token_file
        );
        return Ok(None);
    }

    let content = fs::read_to_string(&cli.token_file)
        .with_context(|| format!("Failed to read token file {:?}", cli.token_file))?;
    let token: StoredToken = serde_json::from_str(&content)
        .with_context(|| format!("Invalid token file {:?}", cli.token_file))?;
    let session = Authenticator::from_stored_token(token)
        .await
        .context("Failed to restore OAuth2 session")?;

    info!("using stored OAuth2 token");
    Ok(Some(session))
}

fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    let json = serde_json::to_string_pretty(token)?;
    fs::write(path, json).with_context(|| format!("Failed to write token file {:?}", path))?;
    Ok(())
}
