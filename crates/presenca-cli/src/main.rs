mod capture;
mod output;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use presenca_capture::{
    run_preflight, CameraLock, CaptureDevice, CheckStatus, PreflightCheck, StreamConstraints,
};
use presenca_core::{
    distance_meters, Class, ClassId, Coordinate, Matcher, Profile, ProfileId, RecordStore, Role,
    SchoolLocation,
};
use presenca_service::{
    Config, FixedGeolocator, RegistrationFlow, SqliteStore, VerificationFlow,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use crate::capture::{FileLoader, FilePlatform};

const DEFAULT_RADIUS_METERS: f64 = 200.0;

#[derive(Parser)]
#[command(name = "presenca", about = "Presença school attendance CLI")]
struct Cli {
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Great-circle distance in meters between two coordinates
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },
    /// Compare two descriptor files with the configured threshold
    Compare { first: PathBuf, second: PathBuf },
    /// Manage the school geofence
    #[command(subcommand)]
    Location(LocationCommands),
    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommands),
    /// Manage classes and teacher assignments
    #[command(subcommand)]
    Class(ClassCommands),
    /// Register a profile's reference face from a descriptor file
    Enroll {
        /// Profile id or registration number
        #[arg(short, long)]
        profile: String,
        #[arg(short, long)]
        descriptor: PathBuf,
    },
    /// Check in with a live descriptor and the device position
    CheckIn {
        /// Profile id or registration number
        #[arg(short, long)]
        profile: String,
        #[arg(short, long)]
        descriptor: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
    /// A profile's check-ins, newest first
    History {
        #[arg(short, long)]
        profile: String,
    },
    /// Everyone who checked in on a day (default: today), with totals
    Roll {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Check configuration, database and capture environment
    Doctor,
}

#[derive(Subcommand)]
enum LocationCommands {
    /// Show the configured school location
    Show,
    /// Set the school location
    Set {
        #[arg(long)]
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Geofence radius in meters (50-1000)
        #[arg(long, default_value_t = DEFAULT_RADIUS_METERS)]
        radius: f64,
    },
    /// Set the school location from a TOML file
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create a profile
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        registration: String,
        /// student, teacher or admin
        #[arg(long, default_value = "student")]
        role: String,
        /// Class id or name
        #[arg(long)]
        class: Option<String>,
    },
    /// List profiles
    List,
    /// Delete a profile and its check-ins
    Remove {
        /// Profile id or registration number
        profile: String,
    },
}

#[derive(Subcommand)]
enum ClassCommands {
    /// Create a class
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List classes, or only those assigned to a teacher
    List {
        /// Teacher id or registration number
        #[arg(long)]
        teacher: Option<String>,
    },
    /// Delete a class; its students are left without a class
    Remove {
        /// Class id or name
        class: String,
    },
    /// Assign a teacher to a class
    Assign {
        /// Teacher id or registration number
        #[arg(long)]
        teacher: String,
        /// Class id or name
        #[arg(long)]
        class: String,
    },
    /// Remove a teacher's assignment to a class
    Unassign {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        class: String,
    },
}

/// `location import` file format.
#[derive(Debug, Deserialize)]
struct LocationFile {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default = "default_radius")]
    radius_meters: f64,
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_METERS
}

fn load_location_file(path: &Path) -> Result<SchoolLocation> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: LocationFile =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let center = Coordinate::new(file.latitude, file.longitude)?;
    Ok(SchoolLocation::new(&file.name, center, file.radius_meters)?)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::from_env();
    let json = cli.json;

    match cli.command {
        Commands::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            output::render_distance(distance_meters(lat1, lon1, lat2, lon2)?, json)?;
        }
        Commands::Compare { first, second } => {
            let a = capture::read_descriptor(&first).await?;
            let b = capture::read_descriptor(&second).await?;
            let matcher = config.matcher();
            output::render_compare(&matcher.evaluate(&a, &b), matcher.threshold(), json)?;
        }
        Commands::Location(cmd) => {
            let store = open_store(&config).await?;
            match cmd {
                LocationCommands::Show => {}
                LocationCommands::Set {
                    name,
                    lat,
                    lon,
                    radius,
                } => {
                    let location = SchoolLocation::new(&name, Coordinate::new(lat, lon)?, radius)?;
                    store.set_school_location(&location).await?;
                }
                LocationCommands::Import { path } => {
                    store.set_school_location(&load_location_file(&path)?).await?;
                }
            }
            let current = store.fetch_school_location().await?;
            output::render_location(current.as_ref(), json)?;
        }
        Commands::Profile(ProfileCommands::Add {
            name,
            registration,
            role,
            class,
        }) => {
            let store = open_store(&config).await?;
            let class_id = match class {
                Some(key) => Some(resolve_class(&store, &key).await?.id),
                None => None,
            };
            let profile = Profile::new(&name, &registration, Role::from_str(&role)?, class_id)?;
            store
                .create_profile(&profile)
                .await
                .with_context(|| format!("registration number {}", profile.registration_number))?;
            output::render_profiles(std::slice::from_ref(&profile), json)?;
        }
        Commands::Profile(ProfileCommands::List) => {
            let store = open_store(&config).await?;
            output::render_profiles(&store.list_profiles().await?, json)?;
        }
        Commands::Profile(ProfileCommands::Remove { profile }) => {
            let store = open_store(&config).await?;
            let profile = resolve_profile(&store, &profile).await?;
            store.remove_profile(profile.id).await?;
            output::render_removed("profile", &profile.full_name, json)?;
        }
        Commands::Class(cmd) => {
            let store = open_store(&config).await?;
            class_command(&store, cmd, json).await?;
        }
        Commands::Enroll {
            profile,
            descriptor,
        } => {
            let store = open_store(&config).await?;
            let profile = resolve_profile(&store, &profile).await?;
            let outcome = RegistrationFlow::new(store.clone())
                .run(profile.id, &file_device(&config, &descriptor))
                .await;
            output::render_registration(&outcome, json)?;
            return Ok(output::exit_code(outcome.severity()));
        }
        Commands::CheckIn {
            profile,
            descriptor,
            lat,
            lon,
        } => {
            let store = open_store(&config).await?;
            let profile = resolve_profile(&store, &profile).await?;
            let geolocator = FixedGeolocator(Coordinate::new(lat, lon)?);
            let flow = VerificationFlow::new(
                store.clone(),
                Arc::new(geolocator),
                config.matcher(),
                config.geolocation_timeout(),
            );
            let outcome = flow.run(profile.id, &file_device(&config, &descriptor)).await;
            output::render_verification(&outcome, json)?;
            return Ok(output::exit_code(outcome.severity()));
        }
        Commands::History { profile } => {
            let store = open_store(&config).await?;
            let profile = resolve_profile(&store, &profile).await?;
            let events = store.attendance_history(profile.id).await?;
            let names = HashMap::from([(profile.id, profile.full_name)]);
            output::render_events(&events, &names, json)?;
        }
        Commands::Roll { date } => {
            let store = open_store(&config).await?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let events = store.attendance_on(date).await?;
            let names = store
                .list_profiles()
                .await?
                .into_iter()
                .map(|p| (p.id, p.full_name))
                .collect();
            let summary = store.summary(date).await?;
            output::render_roll(&events, &names, &summary, json)?;
        }
        Commands::Doctor => {
            let checks = doctor(&config).await;
            output::render_doctor(&checks, json)?;
            if checks.iter().any(|c| c.status == CheckStatus::Fail) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    Ok(Arc::new(store))
}

/// Look a profile up by id, falling back to its registration number.
async fn resolve_profile(store: &SqliteStore, key: &str) -> Result<Profile> {
    if let Ok(id) = ProfileId::from_str(key) {
        return Ok(store.fetch_profile(id).await?);
    }
    store
        .find_profile_by_registration(key)
        .await?
        .ok_or_else(|| anyhow!("no profile with registration number {key}"))
}

/// Look a class up by id, falling back to its name.
async fn resolve_class(store: &SqliteStore, key: &str) -> Result<Class> {
    if let Ok(id) = ClassId::from_str(key) {
        return Ok(store.fetch_class(id).await?);
    }
    store
        .find_class_by_name(key)
        .await?
        .ok_or_else(|| anyhow!("no class named {key}"))
}

async fn class_command(store: &SqliteStore, cmd: ClassCommands, json: bool) -> Result<()> {
    match cmd {
        ClassCommands::Add { name, description } => {
            let class = Class::new(&name, description.as_deref())?;
            store
                .create_class(&class)
                .await
                .with_context(|| format!("class {}", class.name))?;
            output::render_classes(std::slice::from_ref(&class), json)
        }
        ClassCommands::List { teacher: None } => {
            output::render_classes(&store.list_classes().await?, json)
        }
        ClassCommands::List {
            teacher: Some(teacher),
        } => {
            let teacher = resolve_profile(store, &teacher).await?;
            output::render_classes(&store.teacher_classes(teacher.id).await?, json)
        }
        ClassCommands::Remove { class } => {
            let class = resolve_class(store, &class).await?;
            store.remove_class(class.id).await?;
            output::render_removed("class", &class.name, json)
        }
        ClassCommands::Assign { teacher, class } => {
            let teacher = resolve_profile(store, &teacher).await?;
            let class = resolve_class(store, &class).await?;
            store
                .assign_teacher(teacher.id, class.id)
                .await
                .with_context(|| format!("assigning {} to {}", teacher.full_name, class.name))?;
            output::render_assignment(&teacher, &class, true, json)
        }
        ClassCommands::Unassign { teacher, class } => {
            let teacher = resolve_profile(store, &teacher).await?;
            let class = resolve_class(store, &class).await?;
            store.unassign_teacher(teacher.id, class.id).await?;
            output::render_assignment(&teacher, &class, false, json)
        }
    }
}

/// One device per command: the descriptor file stands in for camera and models.
fn file_device(config: &Config, descriptor: &Path) -> CaptureDevice {
    CaptureDevice::new(
        Arc::new(FilePlatform),
        Arc::new(FileLoader::new(descriptor)),
        CameraLock::new(),
        config.session_config(),
    )
}

async fn doctor(config: &Config) -> Vec<PreflightCheck> {
    let mut checks = Vec::new();
    let mut push = |name: &'static str, status: CheckStatus, message: String| {
        checks.push(PreflightCheck {
            name,
            status,
            message,
        })
    };

    push(
        "match_threshold",
        CheckStatus::Pass,
        format!("{}", config.match_threshold),
    );

    let store = SqliteStore::open(&config.db_path).await;
    match &store {
        Ok(_) => push("database", CheckStatus::Pass, config.db_path.display().to_string()),
        Err(e) => push(
            "database",
            CheckStatus::Fail,
            format!("{}: {e}", config.db_path.display()),
        ),
    }

    match store {
        Ok(store) => match store.fetch_school_location().await {
            Ok(Some(l)) => push(
                "school_location",
                CheckStatus::Pass,
                format!("{} (radius {:.0} m)", l.name, l.radius_meters),
            ),
            Ok(None) => push(
                "school_location",
                CheckStatus::Fail,
                "not configured; run `presenca location set`".to_string(),
            ),
            Err(e) => push("school_location", CheckStatus::Fail, e.to_string()),
        },
        Err(_) => push("school_location", CheckStatus::Skipped, "no database".to_string()),
    }

    if config.model_dir.is_dir() {
        push("models", CheckStatus::Pass, config.model_dir.display().to_string());
    } else {
        push(
            "models",
            CheckStatus::Skipped,
            format!(
                "{} missing; will fall back to {}",
                config.model_dir.display(),
                config.model_cdn
            ),
        );
    }

    let preferred = StreamConstraints::Preferred {
        width: config.preferred_width,
        height: config.preferred_height,
    };
    let report = run_preflight(&FilePlatform, preferred).await;
    checks.extend(report.checks);
    checks
}
