//! tzpc-review - command-line review client
//!
//! Lists analyses, submits new ones and records the specialist's review of
//! each compared characteristic.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tzpc_common::api::OverallReviewUpdate;
use tzpc_common::model::{AnalysisStatus, ComparisonMode, ManualVerification};
use tzpc_common::{ClientConfig, ConfigOverrides, Error};
use tzpc_review::{render, AnalysisPoller, AnalysisStore, HttpBackend, ReconciliationViewModel, UploadFile};

/// Command-line arguments for tzpc-review
#[derive(Parser, Debug)]
#[command(name = "tzpc-review")]
#[command(about = "Review TZ / passport comparison results")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/tzpc/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Session cookie sent with every request, e.g. "session=abc"
    #[arg(long, global = true)]
    session: Option<String>,

    /// Log filter (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List analyses
    List,

    /// Re-list analyses until none is pending or processing
    Watch,

    /// Upload a TZ and a passport for comparison
    Create {
        /// Requirement document (TZ)
        #[arg(long)]
        tz: PathBuf,

        /// Product passport
        #[arg(long)]
        passport: PathBuf,

        /// flexible or strict
        #[arg(long, default_value = "flexible")]
        mode: String,

        /// Wait for the comparison to finish
        #[arg(long)]
        wait: bool,
    },

    /// Wait until an analysis is completed or failed
    Wait { id: i64 },

    /// Show an analysis with its review rows
    Show {
        id: i64,

        /// Show a single field in full
        #[arg(long)]
        field: Option<String>,
    },

    /// Record the review of one field
    Verify {
        id: i64,

        /// Field key as shown by `show`
        key: String,

        /// true, false or unset
        #[arg(long)]
        verdict: String,

        /// Specialist comment; empty clears it
        #[arg(long)]
        comment: Option<String>,
    },

    /// Record the overall comment and decision of an analysis
    Comment {
        id: i64,

        #[arg(long, default_value = "")]
        text: String,

        /// true, false or unset
        #[arg(long, default_value = "")]
        verdict: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        base_url: args.base_url.clone(),
        session_cookie: args.session.clone(),
        config_file: args.config.clone(),
        log_level: args.log_level.clone(),
    };
    let config = ClientConfig::resolve(&overrides).context("Failed to load configuration")?;

    // Logs go to stderr; stdout carries the rendered output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(base_url = %config.base_url, "tzpc-review v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args.command, config).await {
        match e.downcast_ref::<Error>() {
            Some(Error::Unauthorized { login_url }) => {
                eprintln!("Not logged in. Sign in at {} and pass the session cookie with --session", login_url);
            }
            _ => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Command, config: ClientConfig) -> Result<()> {
    let poll_interval = config.poll_interval;
    let wait_timeout = config.wait_timeout;
    let backend = Arc::new(HttpBackend::new(config)?);
    let poller = AnalysisPoller::new(backend.clone(), poll_interval, wait_timeout);

    match command {
        Command::List => {
            let records = backend.list_analyses().await.map_err(|e| e.into_read_error())?;
            let summaries: Vec<_> = records.iter().map(|r| r.summary()).collect();
            print!("{}", render::render_analysis_list(&summaries));
        }

        Command::Watch => {
            poller
                .watch_list(|summaries| {
                    println!();
                    print!("{}", render::render_analysis_list(summaries));
                })
                .await?;
        }

        Command::Create {
            tz,
            passport,
            mode,
            wait,
        } => {
            let mode: ComparisonMode = mode.parse()?;
            let tz_file = UploadFile::from_path(&tz)
                .await
                .with_context(|| format!("Cannot use {}", tz.display()))?;
            let passport_file = UploadFile::from_path(&passport)
                .await
                .with_context(|| format!("Cannot use {}", passport.display()))?;

            let id = backend
                .create_analysis(tz_file, passport_file, mode)
                .await
                .map_err(|e| e.into_read_error())?;

            match id {
                Some(id) => {
                    println!("Analysis #{} created", id);
                    if wait {
                        wait_and_show(&poller, id).await?;
                    }
                }
                None => {
                    println!("Analysis created");
                    info!("Server did not report the new analysis id; use `list` to find it");
                }
            }
        }

        Command::Wait { id } => wait_and_show(&poller, id).await?,

        Command::Show { id, field } => {
            let view_model = ReconciliationViewModel::with_backend(backend);
            let report = view_model.load(id).await?;

            if let Some(key) = field {
                print!("{}", render::render_row_detail(&view_model.get_row(&key)?));
                return Ok(());
            }

            print!("{}", render::render_summary(&view_model.summary()?));
            if let Some(notices) = render::render_load_notices(&report) {
                eprint!("{}", notices);
            }
            if report.status != AnalysisStatus::Completed {
                return Ok(());
            }
            if let Some(verdict) = view_model.verdict()? {
                println!();
                print!("{}", render::render_verdict(&verdict));
            }
            println!();
            print!("{}", render::render_rows(&view_model.rows()?));
        }

        Command::Verify {
            id,
            key,
            verdict,
            comment,
        } => {
            let view_model = ReconciliationViewModel::with_backend(backend);
            view_model.load(id).await?;

            view_model.set_manual_verification_input(&key, &verdict)?;
            if let Some(comment) = comment {
                view_model.set_comment(&key, &comment)?;
            }
            if !view_model.get_row(&key)?.dirty {
                println!("No changes for {}", key);
                return Ok(());
            }

            let row = view_model.save_row(&key).await?;
            print!("{}", render::render_row_detail(&row));
        }

        Command::Comment { id, text, verdict } => {
            let verification: ManualVerification = verdict.parse()?;
            if OverallReviewUpdate::new(&text, verification).is_empty() {
                anyhow::bail!("Nothing to save: pass --text and/or --verdict");
            }

            let view_model = ReconciliationViewModel::with_backend(backend);
            view_model.load(id).await?;
            let summary = view_model.save_overall_comment(&text, verification).await?;
            print!("{}", render::render_summary(&summary));
        }
    }

    Ok(())
}

async fn wait_and_show(poller: &AnalysisPoller, id: i64) -> Result<()> {
    let summary = poller
        .wait_for_completion(id, |s| {
            eprintln!("Analysis #{}: {}", s.id, render::status_label(s.status));
        })
        .await?;
    print!("{}", render::render_summary(&summary));
    Ok(())
}
