use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use student_analytics::cluster::{DEFAULT_FAN_OUT, DEFAULT_K};
use student_analytics::db::{self, PgStore};
use student_analytics::report::{self, ClassReportInput};
use student_analytics::{
    analyze_sentiment, class_performance, cluster_students, detect_inactivity, identify_at_risk,
    predict_performance, recommend_content, student_grade_buckets, AnalyticsError,
    ClusterOptions, InactivityOptions, MemoryStore, RecordStore,
};

#[derive(Parser)]
#[command(name = "student-analytics")]
#[command(
    about = "Grade forecasts, student grouping and feedback sentiment for a class",
    long_about = None
)]
struct Cli {
    /// Connection pool size for Postgres
    #[arg(long, global = true, default_value_t = 5)]
    max_connections: u32,
    /// Read records from a submissions CSV instead of Postgres
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample class
    Seed,
    /// Import submissions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Forecast the next grade of a student
    Predict {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        class: Uuid,
    },
    /// Group the students of a class by behavior
    Cluster {
        #[arg(long)]
        class: Uuid,
        #[arg(long, default_value_t = DEFAULT_K)]
        k: usize,
        #[arg(long, default_value_t = DEFAULT_FAN_OUT)]
        fan_out: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Classify the feedback text of a class
    Sentiment {
        #[arg(long)]
        class: Uuid,
    },
    /// Suggest study material for a student's weak areas
    Recommend {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        class: Uuid,
    },
    /// List students at risk across the class roster
    AtRisk {
        #[arg(long)]
        class: Uuid,
        #[arg(long, default_value_t = DEFAULT_FAN_OUT)]
        fan_out: usize,
    },
    /// Summarize the grades and pace of a whole class
    Performance {
        #[arg(long)]
        class: Uuid,
        #[arg(long, default_value_t = DEFAULT_FAN_OUT)]
        fan_out: usize,
    },
    /// Count a student's grades per band
    Buckets {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        class: Uuid,
    },
    /// List students without recent submissions
    Inactive {
        #[arg(long)]
        class: Uuid,
        #[arg(long, default_value_t = 14)]
        stale_days: i64,
        #[arg(long, default_value_t = 30)]
        critical_days: i64,
    },
    /// Generate a markdown class report
    Report {
        #[arg(long)]
        class: Uuid,
        #[arg(long, default_value_t = DEFAULT_K)]
        k: usize,
        #[arg(long, default_value_t = DEFAULT_FAN_OUT)]
        fan_out: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect(max_connections: u32) -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn open_store(cli: &Cli) -> anyhow::Result<Box<dyn RecordStore>> {
    match &cli.fixture {
        Some(path) => {
            let store = MemoryStore::from_csv(path)
                .with_context(|| format!("failed to load fixture {}", path.display()))?;
            info!(fixture = %path.display(), "using in-memory records");
            Ok(Box::new(store))
        }
        None => Ok(Box::new(PgStore::new(connect(cli.max_connections).await?))),
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Prints the outcome as JSON. Expected empty states get a one-line note.
fn print_outcome<T: Serialize>(outcome: student_analytics::Result<T>) -> anyhow::Result<()> {
    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) if err.is_expected() => {
            println!("Nothing to report: {err}.");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "analytics query failed");
            Err(err.into())
        }
    }
}

/// Turns an expected empty state into `None` so a report section can say so.
fn optional_section<T>(
    outcome: student_analytics::Result<T>,
) -> student_analytics::Result<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_expected() => Ok(None),
        Err(err) => Err(err),
    }
}

async fn write_report(
    store: &dyn RecordStore,
    class_id: Uuid,
    options: &ClusterOptions,
    seed: Option<u64>,
    out: &Path,
) -> anyhow::Result<()> {
    let mut rng = rng_from(seed);
    let inactivity_options = InactivityOptions {
        fan_out: options.fan_out,
        ..InactivityOptions::default()
    };
    let sections = async {
        let clusters =
            optional_section(cluster_students(store, class_id, options, &mut rng).await)?;
        let sentiment = optional_section(analyze_sentiment(store, class_id).await)?;
        let inactivity = optional_section(
            detect_inactivity(store, class_id, Utc::now(), &inactivity_options).await,
        )?;
        Ok::<_, AnalyticsError>((clusters, sentiment, inactivity))
    }
    .await;

    let (clusters, sentiment, inactivity) = match sections {
        Ok(sections) => sections,
        Err(err) => {
            error!(error = %err, %class_id, "failed to gather report sections");
            return Err(err.into());
        }
    };

    let markdown = report::build_class_report(&ClassReportInput {
        class_id,
        generated_at: Utc::now(),
        clusters: clusters.as_ref(),
        sentiment: sentiment.as_ref(),
        inactivity: inactivity.as_deref(),
    });
    std::fs::write(out, markdown)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Report written to {}.", out.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::InitDb => {
            let pool = connect(cli.max_connections).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(cli.max_connections).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect(cli.max_connections).await?;
            let inserted = db::import_csv(&pool, csv).await?;
            println!("Inserted {inserted} submissions from {}.", csv.display());
        }
        Commands::Predict { student, class } => {
            let store = open_store(&cli).await?;
            print_outcome(predict_performance(&*store, *student, *class).await)?;
        }
        Commands::Cluster {
            class,
            k,
            fan_out,
            seed,
        } => {
            let store = open_store(&cli).await?;
            let options = ClusterOptions {
                k: *k,
                fan_out: *fan_out,
            };
            let mut rng = rng_from(*seed);
            print_outcome(cluster_students(&*store, *class, &options, &mut rng).await)?;
        }
        Commands::Sentiment { class } => {
            let store = open_store(&cli).await?;
            print_outcome(analyze_sentiment(&*store, *class).await)?;
        }
        Commands::Recommend { student, class } => {
            let store = open_store(&cli).await?;
            print_outcome(recommend_content(&*store, *student, *class).await)?;
        }
        Commands::AtRisk { class, fan_out } => {
            let store = open_store(&cli).await?;
            print_outcome(identify_at_risk(&*store, *class, *fan_out).await)?;
        }
        Commands::Performance { class, fan_out } => {
            let store = open_store(&cli).await?;
            let outcome = class_performance(&*store, *class, Utc::now(), *fan_out).await;
            print_outcome(outcome)?;
        }
        Commands::Buckets { student, class } => {
            let store = open_store(&cli).await?;
            print_outcome(student_grade_buckets(&*store, *student, *class).await)?;
        }
        Commands::Inactive {
            class,
            stale_days,
            critical_days,
        } => {
            let store = open_store(&cli).await?;
            let options = InactivityOptions {
                stale_days: *stale_days,
                critical_days: *critical_days,
                ..InactivityOptions::default()
            };
            print_outcome(detect_inactivity(&*store, *class, Utc::now(), &options).await)?;
        }
        Commands::Report {
            class,
            k,
            fan_out,
            seed,
            out,
        } => {
            let store = open_store(&cli).await?;
            let options = ClusterOptions {
                k: *k,
                fan_out: *fan_out,
            };
            write_report(&*store, *class, &options, *seed, out).await?;
        }
    }

    Ok(())
}
