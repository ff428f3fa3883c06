use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

#[zbus::proxy(
    interface = "org.watchlist.Daemon1",
    default_service = "org.watchlist.Daemon1",
    default_path = "/org/watchlist/Daemon1"
)]
trait Daemon {
    async fn add_profile(&self, fields_json: &str, photo_path: &str) -> zbus::Result<String>;
    async fn remove_profile(&self, name: &str) -> zbus::Result<bool>;
    async fn list_profiles(&self) -> zbus::Result<String>;
    async fn add_contact(&self, phone: &str, lat: f64, lon: f64) -> zbus::Result<()>;
    async fn list_contacts(&self) -> zbus::Result<String>;
    async fn start_detection(&self) -> zbus::Result<()>;
    async fn stop_detection(&self) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "watchlist", about = "Watchlist face detection CLI", version)]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a person with a photo
    Add(AddArgs),
    /// Remove the oldest profile with this name
    Remove { name: String },
    /// List registered profiles
    List,
    /// Manage alert contacts
    #[command(subcommand)]
    Contact(ContactCommand),
    /// Start or stop live detection
    #[command(subcommand)]
    Detect(DetectCommand),
    /// Show daemon status
    Status,
}

#[derive(Args)]
struct AddArgs {
    #[arg(long)]
    name: String,
    /// Photo of the person's face
    #[arg(long)]
    photo: PathBuf,
    #[arg(long, default_value = "")]
    age: String,
    #[arg(long, default_value = "")]
    gender: String,
    /// Date of birth
    #[arg(long, default_value = "")]
    dob: String,
    #[arg(long, default_value = "")]
    blood_group: String,
    /// Father's name
    #[arg(long, default_value = "")]
    father: String,
    /// Mother's name
    #[arg(long, default_value = "")]
    mother: String,
    /// Free-text record history
    #[arg(long, default_value = "")]
    records: String,
}

impl AddArgs {
    fn fields_json(&self) -> Value {
        json!({
            "name": self.name,
            "age": self.age,
            "gender": self.gender,
            "date_of_birth": self.dob,
            "blood_group": self.blood_group,
            "father_name": self.father,
            "mother_name": self.mother,
            "records": self.records,
        })
    }
}

#[derive(Subcommand)]
enum ContactCommand {
    /// Register a phone number at a position
    Add {
        phone: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
    /// List registered contacts
    List,
}

#[derive(Subcommand)]
enum DetectCommand {
    Start,
    Stop,
}

/// `--system`, or `WATCHLIST_SYSTEM_BUS` set to anything but `0`.
fn use_system_bus(flag: bool) -> bool {
    flag || std::env::var("WATCHLIST_SYSTEM_BUS").is_ok_and(|v| !v.is_empty() && v != "0")
}

fn text(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn format_profiles(profiles: &Value) -> Vec<String> {
    let Some(list) = profiles.as_array() else {
        return Vec::new();
    };
    list.iter()
        .map(|p| {
            let mut line = text(p, "name");
            for (label, key) in [("age", "age"), ("gender", "gender"), ("dob", "date_of_birth")] {
                let v = text(p, key);
                if !v.is_empty() {
                    line.push_str(&format!("  {label}: {v}"));
                }
            }
            line.push_str(&format!("  added: {}", text(p, "created_at")));
            line
        })
        .collect()
}

fn format_contacts(contacts: &Value) -> Vec<String> {
    let Some(list) = contacts.as_array() else {
        return Vec::new();
    };
    list.iter()
        .map(|c| format!("{}  ({}, {})", text(c, "phone"), text(c, "lat"), text(c, "lon")))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = if use_system_bus(cli.system) {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    let daemon = DaemonProxy::new(&connection)
        .await
        .context("watchlistd is not reachable")?;

    match cli.command {
        Commands::Add(args) => {
            let photo = std::fs::canonicalize(&args.photo)
                .with_context(|| format!("photo not found: {}", args.photo.display()))?;
            let reply = daemon
                .add_profile(&args.fields_json().to_string(), &photo.to_string_lossy())
                .await?;
            let profile: Value = serde_json::from_str(&reply)?;
            println!("Added {} (photo {})", text(&profile, "name"), text(&profile, "photo_id"));
        }
        Commands::Remove { name } => {
            if daemon.remove_profile(&name).await? {
                println!("Removed {name}");
            } else {
                println!("No profile named {name}");
            }
        }
        Commands::List => {
            let profiles: Value = serde_json::from_str(&daemon.list_profiles().await?)?;
            let lines = format_profiles(&profiles);
            if lines.is_empty() {
                println!("No profiles registered");
            }
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Contact(ContactCommand::Add { phone, lat, lon }) => {
            daemon.add_contact(&phone, lat, lon).await?;
            println!("Added contact {phone} at ({lat}, {lon})");
        }
        Commands::Contact(ContactCommand::List) => {
            let contacts: Value = serde_json::from_str(&daemon.list_contacts().await?)?;
            let lines = format_contacts(&contacts);
            if lines.is_empty() {
                println!("No contacts registered");
            }
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Detect(DetectCommand::Start) => {
            daemon.start_detection().await?;
            println!("Detection started");
        }
        Commands::Detect(DetectCommand::Stop) => {
            if daemon.stop_detection().await? {
                println!("Detection stopped");
            } else {
                println!("Detection was not running");
            }
        }
        Commands::Status => {
            let status: Value = serde_json::from_str(&daemon.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_builds_fields_json() {
        let cli = Cli::try_parse_from([
            "watchlist", "add", "--name", "Mallory", "--photo", "m.jpg", "--dob", "1980-02-01",
            "--father", "Bob",
        ])
        .unwrap();
        let Commands::Add(args) = cli.command else {
            panic!("expected add");
        };
        let fields = args.fields_json();
        assert_eq!(fields["name"], "Mallory");
        assert_eq!(fields["date_of_birth"], "1980-02-01");
        assert_eq!(fields["father_name"], "Bob");
        assert_eq!(fields["records"], "");
    }

    #[test]
    fn test_add_requires_name_and_photo() {
        assert!(Cli::try_parse_from(["watchlist", "add", "--name", "Mallory"]).is_err());
        assert!(Cli::try_parse_from(["watchlist", "add", "--photo", "m.jpg"]).is_err());
    }

    #[test]
    fn test_contact_add_negative_coordinates() {
        let cli = Cli::try_parse_from(["watchlist", "contact", "add", "+15550100", "40.7", "-74.0"]).unwrap();
        match cli.command {
            Commands::Contact(ContactCommand::Add { phone, lat, lon }) => {
                assert_eq!(phone, "+15550100");
                assert_eq!(lat, 40.7);
                assert_eq!(lon, -74.0);
            }
            _ => panic!("expected contact add"),
        }
    }

    #[test]
    fn test_system_flag() {
        let cli = Cli::try_parse_from(["watchlist", "status", "--system"]).unwrap();
        assert!(cli.system);
        assert!(use_system_bus(cli.system));
        let cli = Cli::try_parse_from(["watchlist", "status"]).unwrap();
        assert!(!cli.system);
    }

    #[test]
    fn test_format_profiles_skips_empty_fields() {
        let profiles = json!([
            {"name": "Mallory", "age": "41", "gender": "", "date_of_birth": "",
             "photo_id": "p1", "created_at": "2026-01-01T00:00:00+00:00"}
        ]);
        assert_eq!(
            format_profiles(&profiles),
            vec!["Mallory  age: 41  added: 2026-01-01T00:00:00+00:00".to_string()]
        );
    }

    #[test]
    fn test_format_contacts() {
        let contacts = json!([{"phone": "+1", "lat": 40.7, "lon": -74.0}]);
        assert_eq!(format_contacts(&contacts), vec!["+1  (40.7, -74.0)".to_string()]);
    }
}
