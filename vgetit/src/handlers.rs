use anyhow::{Context, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use vgetit_core::keys::normalize_target_key;
use vgetit_core::model::{Job, JobState, TargetDetails};
use vgetit_core::{Database, Orchestrator, SchedulerConfig, ScrapeResponse, SystemClock};
use vgetit_scanner::{Confidence, FactExtractor, FallbackExtractor, HttpExtractor};

pub const DB_FILE_NAME: &str = "vgetit.db";

// Helper functions for the scrape handler

/// Load target keys from either a hosts file or the positional arguments.
/// Keys are normalized and deduplicated, first occurrence wins.
pub fn load_keys_from_source(
    keys: &[String],
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    let loaded = if let Some(hosts_file_path) = hosts_file {
        load_keys_from_file(hosts_file_path)?
    } else if !keys.is_empty() {
        let parsed: Vec<String> = keys.iter().filter_map(|k| parse_key_line(k)).collect();
        if parsed.is_empty() {
            return Err("None of the given targets is a valid host".to_string());
        }
        parsed
    } else {
        return Err("Either <KEY>... or --hosts-file must be provided".to_string());
    };

    let mut seen = HashSet::new();
    Ok(loaded
        .into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect())
}

/// Load and normalize target keys from a newline-delimited file
pub fn load_keys_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let keys: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_key_line)
        .collect();

    if keys.is_empty() {
        return Err(format!("No valid targets found in {}", path.display()));
    }

    Ok(keys)
}

/// Parse a single line as a target key (bare host or URL)
pub fn parse_key_line(line: &str) -> Option<String> {
    match normalize_target_key(line) {
        Ok(key) => Some(key),
        Err(_) => {
            eprintln!("{}  Skipping invalid target '{}'", "⚠".yellow(), line.trim());
            None
        }
    }
}

pub fn resolve_db_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Environment settings, then command-line overrides.
pub fn scheduler_config(interval: Option<u64>, sweep_every: Option<u64>) -> SchedulerConfig {
    let mut config = SchedulerConfig::from_env();
    if let Some(secs) = interval {
        config = config.with_min_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = sweep_every.filter(|s| *s > 0) {
        config = config.with_sweep_every(Duration::from_secs(secs));
    }
    config
}

pub fn build_extractor(
    primary: &Url,
    light: Option<&Url>,
    timeout_secs: u64,
) -> anyhow::Result<Arc<dyn FactExtractor>> {
    let full = HttpExtractor::with_timeout(primary.as_str(), timeout_secs)
        .context("Failed to build extractor client")?;

    let Some(light) = light else {
        return Ok(Arc::new(full));
    };
    let light = HttpExtractor::with_timeout(light.as_str(), timeout_secs)
        .context("Failed to build light extractor client")?
        .with_confidence(Confidence::Light);
    Ok(Arc::new(FallbackExtractor::new(Arc::new(full), Arc::new(light))))
}

// Rendering

fn state_label(state: JobState) -> String {
    let padded = format!("{:<10}", state.as_str());
    match state {
        JobState::Pending => padded.yellow().to_string(),
        JobState::Processing => padded.cyan().to_string(),
        JobState::Completed => padded.green().to_string(),
        JobState::Failed => padded.red().to_string(),
    }
}

fn check_mark(verified: bool) -> String {
    if verified {
        "✓".green().bold().to_string()
    } else {
        "✗".bright_black().to_string()
    }
}

pub fn render_job_line(job: &Job) -> String {
    let mut line = format!(
        "{} {}  retries={}",
        state_label(job.state),
        job.key.bright_white(),
        job.retry_count
    );
    if let Some(at) = job.last_executed_at {
        line.push_str(&format!("  last={}", at.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(message) = &job.error_message {
        line.push_str(&format!("  {}", message.bright_black()));
    }
    line
}

pub fn render_response(key: &str, response: &ScrapeResponse) -> String {
    match response {
        ScrapeResponse::Exists { target } => format!(
            "{} {} already scraped (score {:.1})",
            "✓".green().bold(),
            key.bright_white(),
            target.target.score
        ),
        ScrapeResponse::Processing { slug, job_state } => {
            let state = job_state.map(|s| s.as_str()).unwrap_or("queued");
            format!(
                "{} {} {} [{}]",
                "→".blue(),
                key.bright_white(),
                state.cyan(),
                slug
            )
        }
        ScrapeResponse::Error { message } => {
            format!("{} {}: {}", "✗".red().bold(), key.bright_white(), message)
        }
    }
}

pub fn render_target_details(details: &TargetDetails) -> String {
    let target = &details.target;
    let mut report = String::new();

    let title = if target.name.is_empty() {
        target.key.clone()
    } else {
        format!("{} ({})", target.name, target.key)
    };
    report.push_str(&format!("{}\n", title.bright_white().bold()));
    report.push_str(&format!("  Slug: {}\n", target.slug));
    report.push_str(&format!("  Score: {:.1} / 5.0\n", target.score));
    if !target.processed {
        report.push_str(&format!("  {}\n", "Not scraped yet".yellow()));
    }

    if let Some(address) = &details.address {
        report.push_str(&format!(
            "  Address: {} {}\n",
            address.address,
            check_mark(address.verified)
        ));
    }

    if !details.phone_numbers.is_empty() {
        report.push_str("  Phone numbers:\n");
        for phone in &details.phone_numbers {
            let description = phone
                .description
                .as_ref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default();
            report.push_str(&format!(
                "    {} {}{}\n",
                check_mark(phone.verified),
                phone.number,
                description
            ));
        }
    }

    if !details.contacts.is_empty() {
        report.push_str("  Contacts:\n");
        for contact in &details.contacts {
            let level = if contact.level.is_empty() {
                String::new()
            } else {
                format!(", {}", contact.level)
            };
            report.push_str(&format!(
                "    {} {}{}\n",
                check_mark(contact.verified_profile),
                contact.name,
                level
            ));
        }
    }

    if !target.social_urls.is_empty() {
        report.push_str("  Social:\n");
        for link in &target.social_urls {
            report.push_str(&format!("    {}\n", link));
        }
    }

    if !details.ratings.is_empty() {
        report.push_str("  Ratings:\n");
        for rating in &details.ratings {
            report.push_str(&format!("    {} {}/5", rating.rater, rating.value));
            if !rating.note.is_empty() {
                report.push_str(&format!("  \"{}\"", rating.note));
            }
            report.push('\n');
        }
    }

    report
}

pub fn print_banner() {
    println!(
        "{} {}",
        "vgetit".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
    println!();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn open_database(args: &ArgMatches) -> anyhow::Result<Database> {
    let raw = args
        .get_one::<String>("db")
        .context("No database path given")?;
    let path = resolve_db_path(raw);
    if !Database::exists(&path) {
        bail!(
            "No database at {}. Run `vgetit init` first.",
            path.display()
        );
    }
    debug!(path = %path.display(), "Opening database");
    Database::new(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn orchestrator_from(args: &ArgMatches) -> anyhow::Result<Orchestrator> {
    let db = open_database(args)?;
    let extractor_url = args
        .get_one::<Url>("extractor-url")
        .context("--extractor-url is required")?;
    let light_url = args.get_one::<Url>("light-url");
    let timeout = *args.get_one::<u64>("timeout").unwrap_or(&30);
    let extractor = build_extractor(extractor_url, light_url, timeout)?;

    let config = scheduler_config(
        args.get_one::<u64>("interval").copied(),
        args.get_one::<u64>("sweep-every").copied(),
    );
    Ok(Orchestrator::new(db, extractor, config, Arc::new(SystemClock)))
}

// Command handlers

pub fn handle_init(args: &ArgMatches) -> anyhow::Result<()> {
    print_divider();
    println!("{}", "  VGETIT INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let raw = args
        .get_one::<String>("PATH")
        .context("No path given")?;
    let force = args.get_flag("force");
    let config_dir = resolve_db_path(raw);
    let db_loc = db_path_for_init(&config_dir);
    let db_path = db_loc.as_path();

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    if Database::exists(db_path) {
        if !force {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();

            let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
            println!();
            if response != "y" && response != "yes" {
                println!("{} Initialization cancelled.", "✗".red().bold());
                return Ok(());
            }
        }
        Database::drop(db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Existing database removed", "✓".green().bold());
    }

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    println!("{} Creating database...", "→".blue());
    Database::new(db_path).context("Failed to create database")?;

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

pub async fn handle_scrape(args: &ArgMatches) -> anyhow::Result<()> {
    let raw_keys: Vec<String> = args
        .get_many::<String>("KEY")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let hosts_file = args.get_one::<PathBuf>("hosts-file");
    let wait_all = args.get_flag("wait");

    let keys = load_keys_from_source(&raw_keys, hosts_file).map_err(anyhow::Error::msg)?;
    let orchestrator = orchestrator_from(args)?;
    let sweeper = orchestrator.start().await?;
    info!(targets = keys.len(), wait = wait_all, "Submitting scrape requests");

    println!("{} Requesting {} target(s)\n", "→".blue(), keys.len());

    let mut waiting = Vec::new();
    for key in &keys {
        let response = orchestrator.request_scrape(key).await;
        println!("{}", render_response(key, &response));
        if let ScrapeResponse::Processing { job_state, .. } = response {
            let admitted = job_state == Some(JobState::Processing);
            if wait_all || admitted {
                waiting.push(key.clone());
            }
        }
    }

    if !waiting.is_empty() {
        println!();
        let pb = ProgressBar::new(waiting.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        pb.enable_steady_tick(Duration::from_millis(100));

        for key in &waiting {
            pb.set_message(key.clone());
            let job = orchestrator.wait_for(key).await?;
            pb.println(render_job_line(&job));
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    sweeper.abort();

    let pending = orchestrator.store().lock().await.pending_jobs()?.len();
    if pending > 0 {
        println!(
            "\n{} {} job(s) still queued; they resume on the next run.",
            "ℹ".blue(),
            pending
        );
    }
    Ok(())
}

pub async fn handle_retry(args: &ArgMatches) -> anyhow::Result<()> {
    let key = args.get_one::<String>("KEY").context("No target given")?;
    let orchestrator = orchestrator_from(args)?;
    let sweeper = orchestrator.start().await?;

    let state = orchestrator.retry(key).await?;
    println!("{} {} {}", "→".blue(), key.bright_white(), state.as_str().cyan());

    let job = orchestrator.wait_for(key).await?;
    println!("{}", render_job_line(&job));
    sweeper.abort();
    Ok(())
}

pub fn handle_status(args: &ArgMatches) -> anyhow::Result<()> {
    let raw = args.get_one::<String>("KEY").context("No target given")?;
    let key = normalize_target_key(raw)?;
    let db = open_database(args)?;

    match db.get_job(&key)? {
        Some(job) => println!("{}", render_job_line(&job)),
        None => println!("{} No job for {}", "ℹ".blue(), key.bright_white()),
    }
    Ok(())
}

pub fn handle_show(args: &ArgMatches) -> anyhow::Result<()> {
    let raw = args.get_one::<String>("KEY").context("No target given")?;
    let db = open_database(args)?;

    // Accept either a key or a slug
    let by_key = match normalize_target_key(raw) {
        Ok(key) => db.target_details(&key)?,
        Err(_) => None,
    };
    let details = match by_key {
        Some(details) => Some(details),
        None => match db.get_target_by_slug(raw.trim())? {
            Some(target) => db.target_details(&target.key)?,
            None => None,
        },
    };

    match details {
        Some(details) => print!("{}", render_target_details(&details)),
        None => println!("{} Nothing known about {}", "ℹ".blue(), raw.bright_white()),
    }
    Ok(())
}

pub fn handle_rate(args: &ArgMatches) -> anyhow::Result<()> {
    let raw = args.get_one::<String>("KEY").context("No target given")?;
    let rater = args.get_one::<String>("rater").context("--rater is required")?;
    let value = *args.get_one::<i64>("value").context("--value is required")?;
    let note = args.get_one::<String>("note").map(String::as_str).unwrap_or("");

    let key = normalize_target_key(raw)?;
    let mut db = open_database(args)?;
    db.submit_rating(&key, rater, value, note)?;

    let score = db
        .get_target(&key)?
        .map(|t| t.score)
        .context("Target disappeared while rating")?;
    println!(
        "{} Rated {} {}/5, score now {:.1}",
        "✓".green().bold(),
        key.bright_white(),
        value,
        score
    );
    Ok(())
}

pub fn handle_jobs(args: &ArgMatches) -> anyhow::Result<()> {
    let db = open_database(args)?;
    let jobs = db.list_jobs()?;
    if jobs.is_empty() {
        println!("{} No jobs recorded", "ℹ".blue());
        return Ok(());
    }
    for job in &jobs {
        println!("{}", render_job_line(job));
    }
    Ok(())
}

pub fn db_path_for_init(dir: &Path) -> PathBuf {
    dir.join(DB_FILE_NAME)
}
