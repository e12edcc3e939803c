use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::annotate::annotate_file;
use facegate_core::{BoundingBox, MatchResult, UNKNOWN_NAME};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.facegate.Facegate1",
    default_service = "org.facegate.Facegate1",
    default_path = "/org/facegate/Facegate1"
)]
trait Facegate {
    fn recognize(&self, image: &[u8]) -> zbus::Result<String>;
    fn enroll(&self, name: &str, images: Vec<(String, Vec<u8>)>) -> zbus::Result<String>;
    fn list_people(&self) -> zbus::Result<String>;
    fn remove_person(&self, name: &str) -> zbus::Result<u32>;
    fn reload(&self) -> zbus::Result<u32>;
    fn health(&self) -> zbus::Result<String>;
    fn record_attendance(&self, image: &[u8]) -> zbus::Result<String>;
    fn recent_attendance(&self, name: &str, limit: u32) -> zbus::Result<String>;
    fn attendance_stats(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facegate", about = "Face recognition and attendance CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll one or more images of a person
    Enroll {
        /// Person name (spaces become underscores, lowercased)
        name: String,
        /// Image files (png, jpg, jpeg, bmp)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Recognize every face in an image
    Recognize {
        image: PathBuf,
        /// Also write a copy of the image with every face boxed
        #[arg(long, value_name = "OUT")]
        annotate: Option<PathBuf>,
    },
    /// List enrolled people
    List,
    /// Remove every image of a person
    Remove { name: String },
    /// Rebuild the gallery from the known faces directory
    Reload,
    /// Show daemon status
    Status,
    /// Run an attendance check against an image
    Attend { image: PathBuf },
    /// Show recent attendance records
    Log {
        /// Only records for this name
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Attendance totals
    Stats,
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn upload(path: &Path) -> Result<(String, Vec<u8>)> {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        bail!("{} has no usable file name", path.display());
    };
    Ok((filename.to_string(), read_image(path)?))
}

#[derive(Deserialize)]
struct RecognizeReply {
    faces: Vec<ReplyFace>,
}

#[derive(Deserialize)]
struct ReplyFace {
    name: String,
    confidence: f32,
    location: BoundingBox,
}

impl From<ReplyFace> for MatchResult {
    fn from(face: ReplyFace) -> Self {
        Self {
            location: face.location,
            person_id: (face.name != UNKNOWN_NAME).then_some(face.name),
            confidence: face.confidence,
        }
    }
}

fn parse_faces(raw: &str) -> Result<Vec<MatchResult>> {
    let reply: RecognizeReply =
        serde_json::from_str(raw).context("unexpected recognize reply")?;
    Ok(reply.faces.into_iter().map(MatchResult::from).collect())
}

/// Pretty-print a JSON reply, falling back to the raw text.
fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string())
        ),
        Err(_) => println!("{raw}"),
    }
}

/// Turn a D-Bus method error into a readable message.
fn describe(e: zbus::Error) -> anyhow::Error {
    match e {
        zbus::Error::MethodError(name, Some(detail), _) => {
            let short = name.as_str().rsplit('.').next().unwrap_or(name.as_str()).to_string();
            anyhow::anyhow!("{short}: {detail}")
        }
        other => anyhow::Error::new(other).context("facegated request failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = FacegateProxy::new(&conn)
        .await
        .context("facegated is not reachable")?;

    match cli.command {
        Commands::Enroll { name, images } => {
            let uploads = images
                .iter()
                .map(|p| upload(p))
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(name = %name, images = uploads.len(), "enrolling");
            print_json(&proxy.enroll(&name, uploads).await.map_err(describe)?);
        }
        Commands::Recognize { image, annotate } => {
            let bytes = read_image(&image)?;
            let reply = proxy.recognize(&bytes).await.map_err(describe)?;
            print_json(&reply);
            if let Some(out) = annotate {
                let faces = parse_faces(&reply)?;
                annotate_file(&image, &out, &faces)
                    .with_context(|| format!("failed to annotate into {}", out.display()))?;
                for face in &faces {
                    println!("{} ({:.1}%)", face.name(), face.confidence);
                }
                println!("Annotated image written to {}", out.display());
            }
        }
        Commands::List => {
            print_json(&proxy.list_people().await.map_err(describe)?);
        }
        Commands::Remove { name } => {
            let removed = proxy.remove_person(&name).await.map_err(describe)?;
            println!("Removed {removed} image(s) of {name}");
        }
        Commands::Reload => {
            let count = proxy.reload().await.map_err(describe)?;
            println!("Gallery rebuilt: {count} encoding(s)");
        }
        Commands::Status => {
            print_json(&proxy.health().await.map_err(describe)?);
        }
        Commands::Attend { image } => {
            let bytes = read_image(&image)?;
            print_json(&proxy.record_attendance(&bytes).await.map_err(describe)?);
        }
        Commands::Log { name, limit } => {
            let name = name.unwrap_or_default();
            print_json(
                &proxy
                    .recent_attendance(&name, limit)
                    .await
                    .map_err(describe)?,
            );
        }
        Commands::Stats => {
            print_json(&proxy.attendance_stats().await.map_err(describe)?);
        }
    }

    Ok(())
}
