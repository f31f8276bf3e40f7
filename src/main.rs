use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use recall::config::Config;
use recall::dates::SystemClock;
use recall::reschedule::Rescheduler;
use recall::review::{NewReview, Priority, Review, ReviewDetails, Suggestion};
use recall::service::ReviewService;
use recall::store::JsonFileStore;
use recall::{agenda, import, web};

#[derive(Parser)]
#[command(name = "recall", about = "Track spaced review cycles (R1..R4) per studied topic")]
struct Cli {
    /// Path to a config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the reviews file (overrides the config)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a review and schedule R1..R4
    Add {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        topic: String,
        #[arg(long, value_parser = parse_priority, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        suggestion: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List reviews, grouped by subject
    List {
        #[arg(long)]
        subject: Option<String>,
    },
    /// Show one review with its cycles
    Show { id: String },
    /// Mark a cycle done with a 0-100 score
    Complete {
        id: String,
        cycle: i64,
        #[arg(allow_negative_numbers = true)]
        performance: i64,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        suggestion: Option<String>,
    },
    /// Move a pending cycle to another day (YYYY-MM-DD)
    Reschedule { id: String, cycle: i64, date: NaiveDate },
    /// Set the notes and suggestion of a cycle
    Annotate {
        id: String,
        cycle: i64,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        suggestion: Option<String>,
    },
    /// Change topic, priority, suggestion or notes of a review
    Edit {
        id: String,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long)]
        suggestion: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a review and all its cycles
    Delete { id: String },
    /// Cycles due today or overdue
    Due,
    /// Cycles coming up in the next days
    Agenda {
        #[arg(long)]
        days: Option<i64>,
    },
    /// Per-subject cycle counts
    Subjects,
    /// Create reviews from CSV files (subject,topic,priority,suggestion,notes)
    Import { paths: Vec<PathBuf> },
    /// Serve the JSON API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn parse_priority(s: &str) -> std::result::Result<Priority, String> {
    Priority::parse(s).ok_or_else(|| format!("unknown priority: {s} (low, medium, high)"))
}

fn parse_suggestion(s: Option<String>) -> Result<Option<Suggestion>> {
    match s {
        Some(s) => Suggestion::parse(&s).map_err(anyhow::Error::msg),
        None => Ok(None),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    let data_file = match &cli.data {
        Some(path) => path.clone(),
        None => config.data_file()?,
    };
    let store: web::DynStore = Box::new(
        JsonFileStore::open(&data_file)
            .with_context(|| format!("failed to open {}", data_file.display()))?,
    );
    let rescheduler = Rescheduler::new(config.schedule.interval_baseline);
    let service = ReviewService::new(store, Arc::new(SystemClock), rescheduler);

    if let Command::Serve { port } = cli.command {
        let port = port.unwrap_or(config.server.port);
        let state = web::AppState {
            service,
            days_ahead: config.agenda.days_ahead,
        };
        println!("Serving {} at http://localhost:{port}", data_file.display());
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(web::serve(state, port))?;
        return Ok(());
    }

    run(service, cli.command, &config)
}

fn run(mut service: ReviewService<web::DynStore>, command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Add {
            subject,
            topic,
            priority,
            suggestion,
            notes,
        } => {
            let review = service.create_review(NewReview {
                subject_id: subject,
                topic,
                priority,
                suggestion: parse_suggestion(suggestion)?,
                general_notes: notes,
            })?;
            println!("Created {}", review.id);
            print_review(&review, service.now());
        }
        Command::List { subject } => {
            let mut reviews = service.list_reviews()?;
            if let Some(subject) = &subject {
                reviews.retain(|r| &r.subject_id == subject);
            }
            if reviews.is_empty() {
                println!("No reviews.");
            }
            for group in agenda::group_by_subject(&reviews) {
                println!("{}:", group.subject_id);
                for review in &group.reviews {
                    let next = review
                        .cycles
                        .next_pending()
                        .map(|c| format!("{} {}", c.label(), c.planned_date.format("%Y-%m-%d")))
                        .unwrap_or_else(|| "done".to_string());
                    println!(
                        "  {}  {} [{:?}] {}/4 ({})",
                        review.id,
                        review.topic,
                        review.priority,
                        review.completed_count(),
                        next
                    );
                }
            }
        }
        Command::Show { id } => {
            let review = service.get_review(&id)?;
            print_review(&review, service.now());
        }
        Command::Complete {
            id,
            cycle,
            performance,
            notes,
            suggestion,
        } => {
            let review =
                service.complete_cycle(&id, cycle, performance, notes, parse_suggestion(suggestion)?)?;
            print_review(&review, service.now());
        }
        Command::Reschedule { id, cycle, date } => {
            let date = date
                .and_hms_opt(0, 0, 0)
                .context("invalid date")?
                .and_utc();
            let review = service.edit_cycle_planned_date(&id, cycle, date)?;
            print_review(&review, service.now());
        }
        Command::Annotate {
            id,
            cycle,
            notes,
            suggestion,
        } => {
            let review = service.annotate_cycle(&id, cycle, notes, parse_suggestion(suggestion)?)?;
            print_review(&review, service.now());
        }
        Command::Edit {
            id,
            topic,
            priority,
            suggestion,
            notes,
        } => {
            let details = ReviewDetails {
                topic,
                priority,
                suggestion: match suggestion {
                    Some(s) => Some(Suggestion::parse(&s).map_err(anyhow::Error::msg)?),
                    None => None,
                },
                general_notes: notes.map(Some),
            };
            let review = service.update_details(&id, details)?;
            print_review(&review, service.now());
        }
        Command::Delete { id } => {
            service.delete_review(&id)?;
            println!("Deleted {id}");
        }
        Command::Due => {
            let reviews = service.list_reviews()?;
            let due = agenda::due_cycles(&reviews, service.now());
            if due.is_empty() {
                println!("Nothing due.");
            }
            for e in due {
                println!(
                    "  {} R{} {} / {} ({})",
                    e.planned_date.format("%Y-%m-%d"),
                    e.cycle,
                    e.subject_id,
                    e.topic,
                    agenda::remaining_label(e.remaining_days)
                );
            }
        }
        Command::Agenda { days } => {
            let days = days.unwrap_or(config.agenda.days_ahead);
            if days < 1 {
                bail!("--days must be at least 1");
            }
            let reviews = service.list_reviews()?;
            let upcoming = agenda::upcoming(&reviews, service.now(), days);
            if upcoming.is_empty() {
                println!("Nothing in the next {days} days.");
            }
            for subject in upcoming {
                println!("{}:", subject.subject_id);
                for e in subject.entries {
                    println!(
                        "  {} R{} {} ({}, {:?})",
                        e.planned_date.format("%Y-%m-%d"),
                        e.cycle,
                        e.topic,
                        agenda::remaining_label(e.remaining_days),
                        e.urgency
                    );
                }
            }
        }
        Command::Subjects => {
            let reviews = service.list_reviews()?;
            for group in agenda::group_by_subject(&reviews) {
                println!(
                    "  {}: {} reviews, {} pending / {} done cycles",
                    group.subject_id,
                    group.reviews.len(),
                    group.pending_cycles,
                    group.completed_cycles
                );
            }
        }
        Command::Import { paths } => {
            let files = import::discover_files(&paths);
            if files.is_empty() {
                bail!("No CSV files found.");
            }
            let mut rows = Vec::new();
            for file in &files {
                match import::load_csv(file) {
                    Ok(file_rows) => rows.extend(file_rows),
                    Err(e) => {
                        warn!(file = %file.display(), error = %e, "skipping file");
                        eprintln!("Warning: {e}");
                    }
                }
            }
            // one write for the whole batch; a bad row stores nothing
            let created = service.create_reviews(rows)?;
            println!("Imported {} reviews from {} files.", created.len(), files.len());
        }
        Command::Serve { .. } => {}
    }
    Ok(())
}

fn print_review(review: &Review, now: chrono::DateTime<chrono::Utc>) {
    println!("{} / {}  [{:?}]", review.subject_id, review.topic, review.priority);
    if let Some(s) = review.suggestion {
        println!("  suggestion: {s:?}");
    }
    if let Some(notes) = &review.general_notes {
        println!("  notes: {notes}");
    }
    for c in &review.cycles {
        let status = match c.performance {
            Some(p) if c.is_completed => format!("done ({p})"),
            _ => agenda::remaining_label(agenda::remaining_days(c.planned_date, now)),
        };
        let notes = c.notes.as_deref().map(|n| format!("  {n}")).unwrap_or_default();
        println!(
            "  {} {}  {}{}",
            c.label(),
            c.planned_date.format("%Y-%m-%d"),
            status,
            notes
        );
    }
}
