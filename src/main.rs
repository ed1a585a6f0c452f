use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use omniwise::api::{CachedClient, CourseRef};
use omniwise::app::App;
use omniwise::config::Config;
use omniwise::session::SessionContext;
use omniwise::store::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "omniwise")]
#[command(about = "A terminal client for the Omniwise learning platform")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/omniwise/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the Omniwise API, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Open this course instead of the last one used
  #[arg(long)]
  course: Option<u64>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Log in and remember the session (password from OMNIWISE_PASSWORD)
  Login {
    #[arg(short, long)]
    email: String,
  },
  /// Forget the stored session
  Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = omniwise::logging::init()?;

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }
  let config = Arc::new(config);

  let store = StateStore::open()?;

  match args.command {
    Some(Commands::Login { email }) => login(&config, &store, &email).await,
    Some(Commands::Logout) => {
      store.clear_session()?;
      println!("Logged out.");
      Ok(())
    }
    None => run(config, store, args.course).await,
  }
}

async fn login(config: &Config, store: &StateStore, email: &str) -> Result<()> {
  let password = Config::get_password()?;
  let client = CachedClient::new(config, None)?;

  let token = client
    .login(email, &password)
    .await
    .map_err(|e| eyre!("Login failed: {}", e))?;
  store.set_session_token(&token)?;

  let user = client
    .with_token(token)
    .me()
    .await
    .map_err(|e| eyre!("Logged in, but loading the profile failed: {}", e))?;
  info!(user = user.id, "logged in");
  println!("Logged in as {} ({})", user.full_name(), user.email);
  Ok(())
}

async fn run(config: Arc<Config>, store: StateStore, course: Option<u64>) -> Result<()> {
  let token = Config::get_token_override()
    .or(store.session_token()?)
    .ok_or_else(|| eyre!("Not logged in. Run `omniwise login --email <EMAIL>` first."))?;

  let client = CachedClient::new(&config, Some(token))?;

  let user = match client.me().await {
    Ok(user) => user,
    Err(e) if e.is_auth() => {
      store.clear_session()?;
      return Err(eyre!(
        "Session expired. Run `omniwise login --email <EMAIL>` again."
      ));
    }
    Err(e) => return Err(eyre!("Failed to load profile: {}", e)),
  };

  let course = pick_course(&client, &store, course, config.default_course).await?;
  info!(user = user.id, course = ?course.as_ref().map(|c| c.id), "starting session");

  let ctx = SessionContext::new(user, course, Arc::clone(&config));
  let mut app = App::new(ctx, client, store);
  app.run().await?;

  Ok(())
}

/// `--course`, then the last course used, then the configured default. Only
/// an explicitly requested course that fails to load stops startup.
async fn pick_course(
  client: &CachedClient,
  store: &StateStore,
  requested: Option<u64>,
  default_course: Option<u64>,
) -> Result<Option<CourseRef>> {
  let remembered = store.last_course()?.map(|c| c.id);

  let Some(id) = requested.or(remembered).or(default_course) else {
    return Ok(None);
  };

  match client.get_course(id).await {
    Ok(course) => {
      let course = CourseRef::from(&course);
      store.set_last_course(&course)?;
      Ok(Some(course))
    }
    Err(e) if requested.is_some() => Err(eyre!("Failed to open course {}: {}", id, e)),
    Err(e) => {
      warn!(course = id, error = %e, "course unavailable, starting without one");
      Ok(None)
    }
  }
}
