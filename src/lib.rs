pub mod applier;
pub mod config;
pub mod fleet;
pub mod logging;
pub mod model;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use applier::{ApplyPolicy, ApplyReport, TargetPropertyApplier, display};
use config::AppConfig;
use fleet::{DryRunFleet, EmcliClient, FleetApi, MemoryFleet};
use model::{FilterSpec, PropertyMapping, SortKey, Target};

/// Exit code when a best-effort batch finished with rejected records.
pub const EXIT_PARTIAL_APPLY: u8 = 3;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "emprops",
    version,
    about = "Filter Enterprise Manager targets by agent, type and name, then bulk-apply target properties"
)]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "EMPROPS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Serve targets and properties from a JSON snapshot instead of emcli
    #[arg(long, value_name = "PATH", global = true)]
    pub fixture: Option<PathBuf>,

    /// Machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output on stderr (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Target selection flags. Anything omitted falls back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Regex searched in the managing agent URL; agent-less targets always pass
    #[arg(long, value_name = "REGEX")]
    pub agent: Option<String>,

    /// Regex searched in the target type
    #[arg(long = "type", value_name = "REGEX")]
    pub target_type: Option<String>,

    /// Regex searched in the target name
    #[arg(long, value_name = "REGEX")]
    pub name: Option<String>,

    /// Sort keys, most significant first (TARGET_TYPE, TARGET_NAME, EMD_URL, TARGET_GUID)
    #[arg(long, value_name = "KEY", value_delimiter = ',')]
    pub sort: Vec<SortKey>,
}

impl FilterArgs {
    pub fn resolve(&self, defaults: FilterSpec) -> FilterSpec {
        FilterSpec {
            agent: self.agent.clone().unwrap_or(defaults.agent),
            target_type: self.target_type.clone().unwrap_or(defaults.target_type),
            name: self.name.clone().unwrap_or(defaults.name),
            sort: if self.sort.is_empty() {
                defaults.sort
            } else {
                self.sort.clone()
            },
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the targets selected by the filter
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show selected targets with their custom group (orcl_gtp_*) properties
    Show {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Set properties on every selected target
    Apply {
        #[command(flatten)]
        filter: FilterArgs,

        /// Property assignment (repeatable)
        #[arg(short = 'p', long = "prop", value_name = "NAME=VALUE", value_parser = parse_prop)]
        props: Vec<(String, String)>,

        /// TOML or JSON file of property assignments
        #[arg(long, value_name = "PATH")]
        props_file: Option<PathBuf>,

        /// What to do when a record is rejected: fail-fast or best-effort
        #[arg(long)]
        policy: Option<ApplyPolicy>,

        /// Record field separator passed to emcli
        #[arg(long)]
        separator: Option<String>,

        /// Read the fleet but do not write any property
        #[arg(long)]
        dry_run: bool,

        /// Show the selected targets after applying
        #[arg(long)]
        show: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

fn parse_prop(input: &str) -> Result<(String, String), String> {
    PropertyMapping::parse_assignment(input)
}

pub fn run() -> Result<ExitCode> {
    run_with(Cli::parse())
}

pub fn run_with(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "emprops", &mut io::stdout());
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut io::stdout())?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    let _log_guard = logging::init(cli.verbose, cli.quiet, config.logging.audit_log.as_deref())?;
    info!(version = env!("CARGO_PKG_VERSION"), "emprops starting");

    match cli.command {
        Commands::List { filter } => {
            let fleet = open_fleet(cli.fixture.as_deref(), &config)?;
            run_list(fleet, &filter.resolve(config.filter_spec()), cli.json)
        }
        Commands::Show { filter } => {
            let fleet = open_fleet(cli.fixture.as_deref(), &config)?;
            run_show(fleet, &filter.resolve(config.filter_spec()), cli.json)
        }
        Commands::Apply {
            filter,
            props,
            props_file,
            policy,
            separator,
            dry_run,
            show,
        } => {
            let mut mapping = config.properties.clone();
            if let Some(path) = &props_file {
                mapping.extend(config::load_properties_file(path)?);
            }
            mapping.extend(props.into_iter().collect());

            let fleet = open_fleet(cli.fixture.as_deref(), &config)?;
            let spec = filter.resolve(config.filter_spec());
            let options = ApplyOptions {
                policy: policy.unwrap_or(config.apply.policy),
                separator: separator.unwrap_or_else(|| config.apply.separator.clone()),
                show,
                json: cli.json,
            };
            if dry_run {
                let dry = DryRunFleet::new(fleet);
                let report = run_apply(&dry, &spec, mapping, &options)?;
                finish_apply(&report, Some(dry.skipped_writes()), options.json)
            } else {
                let report = run_apply(fleet, &spec, mapping, &options)?;
                finish_apply(&report, None, options.json)
            }
        }
        Commands::Completions { .. } | Commands::Man => Ok(ExitCode::SUCCESS),
    }
}

fn open_fleet(fixture: Option<&Path>, config: &AppConfig) -> Result<Box<dyn FleetApi>> {
    if let Some(path) = fixture {
        info!(fixture = %path.display(), "using fixture fleet");
        return Ok(Box::new(MemoryFleet::from_fixture(path)?));
    }
    let settings = config.emcli_settings()?;
    let client = EmcliClient::new(settings).context("starting emcli")?;
    Ok(Box::new(client))
}

fn run_list(fleet: Box<dyn FleetApi>, spec: &FilterSpec, json: bool) -> Result<ExitCode> {
    let mut applier = TargetPropertyApplier::new(fleet, io::stdout());
    let targets = applier.filter(spec, false)?.to_vec();

    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &targets)?;
        writeln!(out)?;
    } else {
        for target in &targets {
            display::write_target_row(&mut out, target)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_show(fleet: Box<dyn FleetApi>, spec: &FilterSpec, json: bool) -> Result<ExitCode> {
    let mut applier = TargetPropertyApplier::new(fleet, io::stdout());
    if !json {
        applier.filter(spec, true)?;
        return Ok(ExitCode::SUCCESS);
    }

    applier.filter(spec, false)?;
    let rows: Vec<serde_json::Value> = applier
        .sorted_working_set()
        .iter()
        .map(|target| target_with_group_properties(&applier, target))
        .collect();
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &rows)?;
    writeln!(out)?;
    Ok(ExitCode::SUCCESS)
}

fn target_with_group_properties<A: FleetApi, W: Write>(
    applier: &TargetPropertyApplier<A, W>,
    target: &Target,
) -> serde_json::Value {
    let properties: Vec<serde_json::Value> = applier
        .cache()
        .properties_for(&target.guid)
        .filter_map(|prop| {
            display::group_label(&prop.name).map(|label| {
                serde_json::json!({
                    "name": prop.name,
                    "label": label,
                    "value": prop.value,
                })
            })
        })
        .collect();
    serde_json::json!({
        "TARGET_GUID": target.guid,
        "TARGET_NAME": target.name,
        "TARGET_TYPE": target.target_type,
        "EMD_URL": target.agent_url,
        "properties": properties,
    })
}

struct ApplyOptions {
    policy: ApplyPolicy,
    separator: String,
    show: bool,
    json: bool,
}

fn run_apply<A: FleetApi>(
    fleet: A,
    spec: &FilterSpec,
    mapping: PropertyMapping,
    options: &ApplyOptions,
) -> Result<ApplyReport> {
    // Keep stdout clean for the JSON report; progress goes to stderr instead.
    let out: Box<dyn Write> = if options.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let mut applier = TargetPropertyApplier::new(fleet, out)
        .with_policy(options.policy)
        .with_separator(options.separator.clone());
    applier.props(mapping);

    let selected = applier.filter(spec, false)?.len();
    if selected == 0 {
        warn!(
            agent = %spec.agent,
            target_type = %spec.target_type,
            name = %spec.name,
            "no targets matched the filter"
        );
    }

    Ok(applier.set_properties(options.show)?)
}

/// Print the report and map it to an exit code. `skipped` is set for dry runs.
fn finish_apply(report: &ApplyReport, skipped: Option<usize>, json: bool) -> Result<ExitCode> {
    if json {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, report)?;
        writeln!(out)?;
    } else {
        eprintln!("{}", summary_line(report, skipped));
        for failure in &report.failures {
            eprintln!(
                "  {} ({}) {}: {}",
                failure.record.target_name,
                failure.record.target_type,
                failure.record.property,
                failure.error
            );
        }
    }

    if report.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL_APPLY))
    }
}

fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 { one } else { many }
}

fn summary_line(report: &ApplyReport, skipped: Option<usize>) -> String {
    let scope = format!(
        "{} propert{} to {} target{}",
        report.properties,
        plural(report.properties, "y", "ies"),
        report.targets,
        plural(report.targets, "", "s"),
    );
    if let Some(skipped) = skipped {
        return format!(
            "{} Would apply {scope}: {skipped} record{} (dry run, nothing written)",
            "✓".green(),
            plural(skipped, "", "s"),
        );
    }
    if report.failures.is_empty() {
        return format!(
            "{} Applied {scope}: {} record{}",
            "✓".green(),
            report.succeeded,
            plural(report.succeeded, "", "s"),
        );
    }
    format!(
        "{} {} of {} records rejected",
        "✗".red(),
        report.failures.len().to_string().bold(),
        report.attempted,
    )
}
