use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use gravitalia_shell::config::Config;
use gravitalia_shell::db::Database;
use gravitalia_shell::session::{
  CookieStore, FetchOutcome, HttpIdentityClient, SessionStore, SqliteCookies, TokenResponse,
  SESSION_COOKIE,
};
use gravitalia_shell::telemetry;
use gravitalia_shell::worker::{
  CacheStorage, HttpNetwork, Network, OfflineWorker, Request, SqliteStorage,
};

#[derive(Parser, Debug)]
#[command(name = "gravitalia")]
#[command(about = "Session and offline cache tooling for the Gravitalia account front-end")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/gravitalia/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Identity API base URL
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the connected user as JSON
  Me {
    /// Ask the API even if nothing suggests a session
    #[arg(short, long)]
    force: bool,
  },
  /// Forget the local session
  Logout,
  /// Manage the session cookie
  #[command(subcommand)]
  Session(SessionCommand),
  /// Drive the offline cache worker
  #[command(subcommand)]
  Worker(WorkerCommand),
  /// Print the effective configuration as YAML
  Config,
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
  /// Store a session token
  Set {
    #[arg(required_unless_present = "from_json")]
    token: Option<String>,
    /// Read the token from a login response body
    #[arg(long, conflicts_with = "token")]
    from_json: Option<PathBuf>,
  },
  /// Tell whether a session token is stored
  Show,
}

#[derive(Subcommand, Debug)]
enum WorkerCommand {
  /// Fill the cache bucket from the manifest
  Install,
  /// Fetch a path or URL through the worker, body goes to stdout
  Fetch { target: String },
  /// Delete the cache bucket
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  let config = if let Some(api_url) = args.api_url {
    Config { api_url, ..config }
  } else {
    config
  };

  let _log_guard = telemetry::init(&config.logging)?;
  debug!(
    api_url = %config.api_url,
    cdn_url = %config.cdn_url,
    locales = ?config.locales,
    development = config.development,
    "configuration loaded"
  );

  let db = Arc::new(Database::open()?);

  match args.command {
    Command::Me { force } => show_user(&config, db, force).await,
    Command::Logout => {
      session_store(&config, db)?.logout()?;
      println!("Logged out.");
      Ok(())
    }
    Command::Session(cmd) => run_session(cmd, &config, db),
    Command::Worker(cmd) => run_worker(cmd, &config, db).await,
    Command::Config => {
      print!("{}", config.to_yaml()?);
      Ok(())
    }
  }
}

fn session_store(
  config: &Config,
  db: Arc<Database>,
) -> Result<SessionStore<HttpIdentityClient, SqliteCookies>> {
  let client = HttpIdentityClient::new(config)?;
  Ok(SessionStore::new(client, SqliteCookies::new(db)))
}

async fn show_user(config: &Config, db: Arc<Database>, force: bool) -> Result<()> {
  let store = session_store(config, db)?;

  let user = match store.fetch_user(force).await? {
    FetchOutcome::Fetched(user) => user,
    FetchOutcome::Skipped | FetchOutcome::Superseded => store.user()?,
  };

  if user.is_empty() {
    return Err(eyre!(
      "Not logged in. Store a token with `gravitalia session set <token>`."
    ));
  }

  println!("{}", serde_json::to_string_pretty(&user)?);
  Ok(())
}

fn run_session(cmd: SessionCommand, config: &Config, db: Arc<Database>) -> Result<()> {
  let cookies = SqliteCookies::new(db);

  match cmd {
    SessionCommand::Set { token, from_json } => {
      let token = match (token, from_json) {
        (Some(token), _) => token,
        (None, Some(path)) => {
          let contents = std::fs::read_to_string(&path)
            .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
          let response: TokenResponse = serde_json::from_str(&contents)
            .map_err(|e| eyre!("Failed to parse login response {}: {}", path.display(), e))?;
          info!(
            vanity = %response.vanity,
            locale = %response.user_settings.locale,
            "session from login response"
          );
          if !config.supports_locale(&response.user_settings.locale) {
            warn!(
              locale = %response.user_settings.locale,
              "login response locale is not one of the configured locales"
            );
          }
          response.token
        }
        (None, None) => return Err(eyre!("A token or --from-json is required")),
      };

      cookies.set(SESSION_COOKIE, &token)?;
      println!("Session stored.");
    }
    SessionCommand::Show => match cookies.get(SESSION_COOKIE)? {
      Some(token) if !token.is_empty() => println!("Session present ({} chars).", token.len()),
      _ => println!("No session."),
    },
  }

  Ok(())
}

async fn run_worker(cmd: WorkerCommand, config: &Config, db: Arc<Database>) -> Result<()> {
  let storage = Arc::new(SqliteStorage::new(db));
  let network = HttpNetwork::new(config.request_timeout())?;
  let mut worker = OfflineWorker::new(&config.worker, Arc::clone(&storage), network.clone())?;

  match cmd {
    WorkerCommand::Install => {
      worker.install().await?;
      worker.activate()?;
      println!(
        "Cached {} entries in bucket {}.",
        storage.entry_count(worker.bucket())?,
        worker.bucket()
      );
    }
    WorkerCommand::Fetch { target } => {
      let request = Request::get(worker.resolve(&target)?);

      let response = if config.register_worker() {
        if !worker.restore()? {
          worker.install().await?;
        }
        worker.activate()?;
        let result = worker.fetch(&request).await?;
        info!(url = %request.url, source = ?result.source, "served");
        result.response
      } else {
        info!("development build, worker not registered");
        network.fetch(&request).await?
      };

      if !response.is_ok() {
        eprintln!("Status {}", response.status);
      }
      std::io::stdout().write_all(&response.body)?;
    }
    WorkerCommand::Clear => {
      if storage.delete_bucket(worker.bucket())? {
        println!("Deleted bucket {}.", worker.bucket());
      } else {
        println!("Bucket {} does not exist.", worker.bucket());
      }
    }
  }

  Ok(())
}
