use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use company_curator::curate::{self, BatchReport, DomainFilter};
use company_curator::{
    Curator, OrgContext, OrganizationStore, Role, RoleApplier, RoleRegistry, Settings, SqliteStore,
};

#[derive(Parser)]
#[command(name = "company_curator", about = "Classify and curate the links discovered for organizations")]
struct Cli {
    /// Settings file (default: ./curator.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Curate a JSON Lines batch of extracted links into the store
    Ingest {
        file: PathBuf,
        /// Organizations per parallel chunk
        #[arg(long, default_value = "200")]
        chunk: usize,
    },
    /// Re-classify every data source of an organization
    Classify {
        slug: String,
        /// Only write and show these roles (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        role: Vec<Role>,
    },
    /// Re-classify one data source
    ClassifyOne { slug: String, url: String },
    /// List data sources, optionally only one role
    List {
        slug: String,
        #[arg(short, long)]
        role: Option<Role>,
    },
    /// Unset the roles of an organization
    Clear {
        slug: String,
        /// Only unset these roles (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        role: Vec<Role>,
    },
    /// Unset the role of one data source
    ClearOne { slug: String, url: String },
    /// Show the role enumeration and the registered rules
    Roles,
    /// Classify a single URL against a primary domain without touching the store
    Check {
        url: String,
        #[arg(short, long)]
        domain: String,
    },
    /// Print the curated model of an organization as JSON
    Model { slug: String },
    /// Store statistics
    Stats,
}

struct App {
    store: Arc<SqliteStore>,
    applier: Arc<RoleApplier>,
    curator: Curator,
}

impl App {
    fn open(settings: &Settings) -> anyhow::Result<Self> {
        if let Some(dir) = settings.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let store = Arc::new(
            SqliteStore::open(&settings.db_path)
                .with_context(|| format!("opening {}", settings.db_path.display()))?,
        );
        let lists = settings.domain_lists();
        let registry = Arc::new(settings.registry(Arc::clone(&lists)));
        let dyn_store: Arc<dyn OrganizationStore> = store.clone();
        let applier = Arc::new(RoleApplier::new(dyn_store, registry));
        let curator = Curator::new(Arc::clone(&applier), DomainFilter::new(lists));
        Ok(App {
            store,
            applier,
            curator,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    let result = match cli.command {
        Commands::Ingest { file, chunk } => {
            let app = App::open(&settings)?;
            let reader = BufReader::new(File::open(&file).with_context(|| format!("opening {}", file.display()))?);
            let batch = curate::read_jsonl(reader)?;
            for bad in &batch.bad_lines {
                eprintln!("line {}: {}", bad.line, bad.error);
            }
            if batch.organizations.is_empty() {
                println!("No organizations in {}.", file.display());
                return Ok(());
            }
            println!("Curating {} organizations...", batch.organizations.len());
            let report = ingest(&app.curator, &batch.organizations, chunk.max(1));
            print_batch(&report, batch.bad_lines.len());
            Ok(())
        }
        Commands::Classify { slug, role } => {
            let app = App::open(&settings)?;
            let targets = (!role.is_empty()).then_some(role.as_slice());
            let out = app.applier.classify_company_datasources(&slug, targets)?;
            for a in &out.assignments {
                println!("{:<24} {}", a.role, a.normalized_url);
            }
            println!(
                "\n{} evaluated, {} shown, {} changed",
                out.processed,
                out.assignments.len(),
                out.changed
            );
            Ok(())
        }
        Commands::ClassifyOne { slug, url } => {
            let app = App::open(&settings)?;
            let role = app.applier.classify_single_datasource(&slug, &url)?;
            println!("{}", role);
            Ok(())
        }
        Commands::List { slug, role } => {
            let app = App::open(&settings)?;
            let sources = match role {
                Some(r) => app.applier.get_datasources_by_role(&slug, r)?,
                None => app.applier.list_datasources(&slug)?,
            };
            if sources.is_empty() {
                println!("No data sources.");
                return Ok(());
            }
            println!("{:>3} | {:<24} | {:<6} | {:<60} | Texts", "#", "Role", "Kind", "URL");
            println!("{}", "-".repeat(110));
            for (i, ds) in sources.iter().enumerate() {
                let role = ds.role.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:>3} | {:<24} | {:<6} | {:<60} | {}",
                    i + 1,
                    role,
                    ds.kind,
                    truncate(&ds.normalized_url, 60),
                    truncate(&ds.texts.join(" / "), 40)
                );
            }
            let counts = app.applier.role_counts(&slug)?;
            println!("\n{} data sources, {} unset", sources.len(), counts.unset);
            Ok(())
        }
        Commands::Clear { slug, role } => {
            let app = App::open(&settings)?;
            let targets = (!role.is_empty()).then_some(role.as_slice());
            let n = app.applier.clear_all_company_roles(&slug, targets)?;
            println!("Cleared {} roles.", n);
            Ok(())
        }
        Commands::ClearOne { slug, url } => {
            let app = App::open(&settings)?;
            if app.applier.clear_single_datasource_role(&slug, &url)? {
                println!("Cleared.");
            } else {
                println!("Role was already unset.");
            }
            Ok(())
        }
        Commands::Roles => {
            let registry = settings.registry(settings.domain_lists());
            for role in registry.available_roles() {
                println!("{}", role);
            }
            println!("\n--- Rules (evaluation order) ---");
            for rule in registry.rules() {
                println!("  {:>5}  {:<26} -> {}", rule.priority(), rule.name(), rule.role());
            }
            Ok(())
        }
        Commands::Check { url, domain } => {
            let lists = settings.domain_lists();
            let registry: RoleRegistry = settings.registry(Arc::clone(&lists));
            let filter = DomainFilter::new(lists);
            let ctx = OrgContext::new(&domain);
            let normalized = registry.normalizer().normalize(&url)?;
            let rule = registry.matching_rule(&normalized, &ctx);
            println!("Normalized: {}", normalized);
            println!("Role:       {}", registry.classify(&normalized, &ctx));
            println!("Rule:       {}", rule.map(|r| r.name()).unwrap_or("-"));
            println!("Category:   {}", filter.categorize(&normalized, &ctx));
            match filter.verdict(&normalized, &ctx) {
                curate::Verdict::Retain => println!("Verdict:    retain"),
                curate::Verdict::Prune(reason) => println!("Verdict:    prune ({})", reason),
            }
            Ok(())
        }
        Commands::Model { slug } => {
            let app = App::open(&settings)?;
            let model = app.curator.model(&slug)?;
            println!("{}", serde_json::to_string_pretty(&model)?);
            Ok(())
        }
        Commands::Stats => {
            let app = App::open(&settings)?;
            let s = app.store.stats()?;
            println!("Organizations: {}", s.organizations);
            println!("Data sources:  {}", s.data_sources);
            for (role, n) in &s.by_role {
                println!("  {:<24} {}", role, n);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn ingest(curator: &Curator, organizations: &[curate::OrganizationLinks], chunk: usize) -> BatchReport {
    let pb = ProgressBar::new(organizations.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut report = BatchReport::default();
    for part in organizations.chunks(chunk) {
        report.merge(curator.curate_batch(part));
        pb.inc(part.len() as u64);
    }
    pb.finish_and_clear();
    report
}

fn print_batch(report: &BatchReport, bad_lines: usize) {
    let retained: usize = report.succeeded.iter().map(|r| r.retained).sum();
    let pruned: usize = report.succeeded.iter().map(|r| r.pruned.len()).sum();
    let created = report.succeeded.iter().filter(|r| r.created).count();
    println!(
        "Curated {} organizations ({} new): {} links kept, {} pruned, {} invalid, {} bad lines.",
        report.succeeded.len(),
        created,
        retained,
        pruned,
        report.skipped_invalid,
        bad_lines,
    );
    if !report.failed.is_empty() {
        println!("\n--- Failed ---");
        for f in &report.failed {
            println!("  {}: {}", truncate(&f.organization, 24), f.error);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
