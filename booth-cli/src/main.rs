//! Booth CLI - Command-line client for the booth reservation backend
//!
//! Logs in and out, and manages exhibitions and booth bookings on behalf of
//! the session stored in the data directory.

use booth_client::{ApiClient, ApiClientConfig};
use booth_core::{
    init_logging, parse_timestamp, performance, validation_error, Booking, BookingUpdate,
    BoothConfig, BoothError, BoothResult, BoothType, ErrorContext, Exhibition,
    ExhibitionSummary, ExhibitionUpdate, LoggingConfig, NewBooking, NewExhibition, Reference,
    Registration, Role, Session,
};
use booth_session::{FileSessionStore, SessionManager};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "booth")]
#[command(about = "Book exhibition booths from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Service(ServiceCommand),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Commands that talk to the backend
#[derive(Subcommand)]
enum ServiceCommand {
    /// Log in and remember the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show who is logged in
    Whoami,

    /// Re-read the profile of the logged-in user
    Refresh,

    /// Create a new account
    Register {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        /// Phone number
        #[arg(short, long)]
        tel: String,

        #[arg(short, long)]
        password: String,

        /// Request an administrator account
        #[arg(long)]
        admin: bool,
    },

    /// Browse and manage exhibitions
    Exhibitions {
        #[command(subcommand)]
        action: ExhibitionCommand,
    },

    /// Manage your booth bookings
    Bookings {
        #[command(subcommand)]
        action: BookingCommand,
    },
}

#[derive(Subcommand)]
enum ExhibitionCommand {
    /// List all exhibitions
    List,

    /// Show one exhibition
    Show { id: String },

    /// Create an exhibition (administrators only)
    Create {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        venue: String,

        /// First day, as YYYY-MM-DD or RFC 3339
        #[arg(long)]
        start_date: String,

        /// Number of days the exhibition runs
        #[arg(long, default_value = "1")]
        duration_day: u32,

        #[arg(long, default_value = "0")]
        small_booth_quota: u32,

        #[arg(long, default_value = "0")]
        big_booth_quota: u32,

        /// Poster image URL
        #[arg(long, default_value = "")]
        poster_picture: String,
    },

    /// Change fields of an exhibition (administrators only)
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        venue: Option<String>,

        #[arg(long)]
        start_date: Option<String>,

        #[arg(long)]
        duration_day: Option<u32>,

        #[arg(long)]
        small_booth_quota: Option<u32>,

        #[arg(long)]
        big_booth_quota: Option<u32>,

        #[arg(long)]
        poster_picture: Option<String>,
    },

    /// Delete an exhibition (administrators only)
    Delete { id: String },
}

#[derive(Subcommand)]
enum BookingCommand {
    /// List your bookings (all bookings for administrators)
    List,

    /// Show one booking
    Show { id: String },

    /// Book booths at an exhibition
    Create {
        /// Exhibition id
        #[arg(long)]
        exhibition: String,

        /// small or big
        #[arg(long)]
        booth_type: BoothType,

        #[arg(long, default_value = "1")]
        amount: u32,

        /// Book on behalf of another user (administrators only)
        #[arg(long)]
        user: Option<String>,
    },

    /// Change the booth type or amount of a booking
    Update {
        id: String,

        #[arg(long)]
        booth_type: Option<BoothType>,

        #[arg(long)]
        amount: Option<u32>,
    },

    /// Cancel a booking
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the effective configuration
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "Command failed");
            eprintln!("❌ {}", e.user_message());
            if let Some(suggestion) = e
                .context()
                .and_then(|context| context.recovery_suggestions.first())
            {
                eprintln!("💡 {}", suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> BoothResult<()> {
    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env_overrides();

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        config.logging.clone()
    };
    init_logging(&logging_config)?;

    info!("Starting booth CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config { action } => handle_config(action, cli.config.as_deref(), &config),
        Commands::Service(command) => {
            config.validate()?;
            let app = App::new(config)?;
            performance::measure_async("command", execute(&app, command)).await
        }
    }
}

async fn execute(app: &App, command: ServiceCommand) -> BoothResult<()> {
    match command {
        ServiceCommand::Login { email, password } => handle_login(app, &email, &password).await,
        ServiceCommand::Logout => handle_logout(app).await,
        ServiceCommand::Whoami => handle_whoami(app),
        ServiceCommand::Refresh => handle_refresh(app).await,
        ServiceCommand::Register {
            name,
            email,
            tel,
            password,
            admin,
        } => {
            let role = if admin { Role::Admin } else { Role::Member };
            let registration = Registration::new(&name, &email, &tel, &password, role);
            handle_register(app, &registration).await
        }
        ServiceCommand::Exhibitions { action } => handle_exhibitions(app, action).await,
        ServiceCommand::Bookings { action } => handle_bookings(app, action).await,
    }
}

/// Everything a command needs, wired once per invocation
struct App {
    config: BoothConfig,
    api: ApiClient,
    session: SessionManager,
}

impl App {
    fn new(config: BoothConfig) -> BoothResult<Self> {
        let api = ApiClient::new(ApiClientConfig::from_backend(&config.backend))?;
        let store = FileSessionStore::new(config.storage.data_dir_path());
        let session = SessionManager::new(Arc::new(api.auth()), Arc::new(store));

        let restored = session.restore();
        debug!(status = %restored.status(), "Session restored");

        Ok(Self {
            config,
            api,
            session,
        })
    }

    /// The current session, which must be logged in
    fn require_login(&self) -> BoothResult<Session> {
        let session = self.session.current_session();
        if !session.is_authenticated() {
            return Err(BoothError::Authentication {
                message: "You need to log in first".to_string(),
                context: ErrorContext::new("cli")
                    .with_operation("require_login")
                    .with_suggestion("Run `booth login --email <email> --password <password>`"),
            });
        }
        Ok(session)
    }

    /// The current session, which must belong to an administrator
    fn require_admin(&self) -> BoothResult<Session> {
        let session = self.require_login()?;
        if session.role() != Some(Role::Admin) {
            return Err(validation_error!(
                "This action requires an administrator account",
                "role",
                "cli"
            ));
        }
        Ok(session)
    }
}

fn load_config(config_path: Option<&Path>) -> BoothResult<BoothConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        return BoothConfig::from_file(path);
    }

    for path in default_config_paths().iter().flatten() {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            return BoothConfig::from_file(path);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(BoothConfig::default())
}

fn default_config_paths() -> [Option<PathBuf>; 3] {
    [
        dirs::config_dir().map(|d| d.join("booth").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".booth").join("config.toml")),
        Some(PathBuf::from("booth.toml")),
    ]
}

/// Where `config init` writes when no `--config` is given
fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|d| d.join("booth").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("booth.toml"))
}

fn handle_config(
    action: ConfigCommand,
    config_path: Option<&Path>,
    config: &BoothConfig,
) -> BoothResult<()> {
    match action {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(config).map_err(|e| BoothError::Config {
                message: format!("Failed to render configuration: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("cli").with_operation("config_show"),
            })?;
            println!("📋 Current configuration:");
            println!("{}", rendered);
        }
        ConfigCommand::Init { force } => {
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(get_config_path);
            if path.exists() && !force {
                return Err(BoothError::Config {
                    message: format!("{} already exists", path.display()),
                    source: None,
                    context: ErrorContext::new("cli")
                        .with_operation("config_init")
                        .with_suggestion("Pass --force to overwrite it"),
                });
            }

            BoothConfig::default().save_to_file(&path)?;
            println!("✅ Configuration initialized at: {}", path.display());
        }
        ConfigCommand::Validate => {
            config.validate()?;
            println!("✅ Configuration is valid");
        }
    }

    Ok(())
}

async fn handle_login(app: &App, email: &str, password: &str) -> BoothResult<()> {
    let session = app.session.login(email, password).await?;
    if let Some(user) = session.user() {
        println!("✅ Logged in as {}", describe_user(user));
    }
    Ok(())
}

async fn handle_logout(app: &App) -> BoothResult<()> {
    if let Some(notification) = app.session.logout() {
        // Give the backend a chance to invalidate the token before exiting
        if let Err(e) = notification.await {
            warn!("Backend logout task failed: {}", e);
        }
    }
    println!("👋 Logged out");
    Ok(())
}

fn handle_whoami(app: &App) -> BoothResult<()> {
    match app.session.current_session().user() {
        Some(user) => {
            println!("{}", describe_user(user));
            println!("  id:    {}", user.id);
            if let Some(phone) = &user.phone {
                println!("  phone: {}", phone);
            }
            if let Some(created_at) = user.created_at {
                println!("  since: {}", format_date(&created_at));
            }
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

async fn handle_refresh(app: &App) -> BoothResult<()> {
    app.require_login()?;

    let session = app.session.refresh().await?;
    match session.user() {
        Some(user) => println!("🔄 Profile refreshed: {}", describe_user(user)),
        None => println!("⚠️  Session expired, please log in again"),
    }
    Ok(())
}

async fn handle_register(app: &App, registration: &Registration) -> BoothResult<()> {
    app.session.register(registration).await?;
    println!(
        "✅ Registered {} as {}. Run `booth login` to sign in.",
        registration.email, registration.role
    );
    Ok(())
}

async fn handle_exhibitions(app: &App, action: ExhibitionCommand) -> BoothResult<()> {
    let exhibitions = app.api.exhibitions();

    match action {
        ExhibitionCommand::List => {
            let session = app.session.current_session();
            let all = exhibitions.list(session.token()).await?;
            if all.is_empty() {
                println!("No exhibitions yet");
            }
            for exhibition in &all {
                println!("{}", exhibition_line(exhibition));
            }
        }
        ExhibitionCommand::Show { id } => {
            let session = app.session.current_session();
            let exhibition = exhibitions.get(&id, session.token()).await?;
            print_exhibition(&exhibition);
        }
        ExhibitionCommand::Create {
            name,
            description,
            venue,
            start_date,
            duration_day,
            small_booth_quota,
            big_booth_quota,
            poster_picture,
        } => {
            let session = app.require_admin()?;
            let new_exhibition = NewExhibition {
                name,
                description,
                venue,
                start_date: parse_start_date(&start_date)?,
                duration_day,
                small_booth_quota,
                big_booth_quota,
                poster_picture,
            };
            let created = exhibitions
                .create(&new_exhibition, session.token().unwrap_or_default())
                .await?;
            println!("✅ Created exhibition {}", created.id);
            print_exhibition(&created);
        }
        ExhibitionCommand::Update {
            id,
            name,
            description,
            venue,
            start_date,
            duration_day,
            small_booth_quota,
            big_booth_quota,
            poster_picture,
        } => {
            let session = app.require_admin()?;
            let update = ExhibitionUpdate {
                name,
                description,
                venue,
                start_date: start_date.as_deref().map(parse_start_date).transpose()?,
                duration_day,
                small_booth_quota,
                big_booth_quota,
                poster_picture,
            };
            let updated = exhibitions
                .update(&id, &update, session.token().unwrap_or_default())
                .await?;
            println!("✅ Updated exhibition {}", updated.id);
            print_exhibition(&updated);
        }
        ExhibitionCommand::Delete { id } => {
            let session = app.require_admin()?;
            exhibitions
                .delete(&id, session.token().unwrap_or_default())
                .await?;
            println!("🗑️  Deleted exhibition {}", id);
        }
    }

    Ok(())
}

async fn handle_bookings(app: &App, action: BookingCommand) -> BoothResult<()> {
    let bookings = app.api.bookings();
    let session = app.require_login()?;
    let token = session.token().unwrap_or_default();

    match action {
        BookingCommand::List => {
            let mine = bookings.list(token).await?;
            if mine.is_empty() {
                println!("No bookings yet");
            }
            for booking in &mine {
                println!("{}", booking_line(booking));
            }
        }
        BookingCommand::Show { id } => {
            let booking = bookings.get(&id, token).await?;
            println!("{}", booking_line(&booking));
        }
        BookingCommand::Create {
            exhibition,
            booth_type,
            amount,
            user,
        } => {
            if user.is_some() && session.role() != Some(Role::Admin) {
                return Err(validation_error!(
                    "Only administrators can book for another user",
                    "user",
                    "cli"
                ));
            }
            let new_booking = NewBooking {
                user,
                exhibition,
                booth_type,
                amount,
            };
            let created = bookings.create(&new_booking, token).await?;
            println!("✅ Booked: {}", booking_line(&created));
        }
        BookingCommand::Update {
            id,
            booth_type,
            amount,
        } => {
            let update = BookingUpdate { booth_type, amount };
            let updated = bookings.update(&id, &update, token).await?;
            println!("✅ Updated: {}", booking_line(&updated));
        }
        BookingCommand::Delete { id } => {
            bookings.delete(&id, token).await?;
            println!("🗑️  Cancelled booking {}", id);
        }
    }

    Ok(())
}

fn parse_start_date(value: &str) -> BoothResult<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| {
        validation_error!(
            format!("Invalid start date '{}', expected YYYY-MM-DD", value),
            "start_date",
            "cli"
        )
    })
}

fn format_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}

fn describe_user(user: &booth_core::User) -> String {
    let name = if user.display_name.is_empty() {
        user.email.as_str()
    } else {
        user.display_name.as_str()
    };
    match user.role {
        Some(role) => format!("{} <{}> [{}]", name, user.email, role),
        None => format!("{} <{}>", name, user.email),
    }
}

fn exhibition_line(exhibition: &Exhibition) -> String {
    format!(
        "{}  {}  @ {}  from {} for {} day(s)  booths: {} small / {} big",
        exhibition.id,
        exhibition.name,
        exhibition.venue,
        format_date(&exhibition.start_date),
        exhibition.duration_day,
        exhibition.small_booth_quota,
        exhibition.big_booth_quota
    )
}

fn print_exhibition(exhibition: &Exhibition) {
    println!("{}", exhibition_line(exhibition));
    if !exhibition.description.is_empty() {
        println!("  {}", exhibition.description);
    }
    if !exhibition.poster_picture.is_empty() {
        println!("  poster: {}", exhibition.poster_picture);
    }
}

fn exhibition_label(exhibition: &Reference<ExhibitionSummary>) -> &str {
    match exhibition {
        Reference::Embedded(summary) if !summary.name.is_empty() => summary.name.as_str(),
        other => other.id(),
    }
}

fn booking_line(booking: &Booking) -> String {
    format!(
        "{}  {}  {} x {}",
        booking.id,
        exhibition_label(&booking.exhibition),
        booking.amount,
        booking.booth_type
    )
}
