use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use relift_core::{
    companion_pins_connection_null, load_manifest, load_models, load_project_config,
    migrate_datastores, plan_dependencies, render_report, scan_project, synthesize_report,
    write_globals_config, write_models_config, write_report, DependencyPlan, PackageSpec,
    ProjectConfig, ScanOutcome, NOTHING_TO_REPORT,
};
use relift_domain::ModelFacts;
use relift_types::{ScanReceipt, ToolMeta, SCAN_SCHEMA_V1};

#[derive(Parser)]
#[command(name = "relift")]
#[command(about = "Kickstart the migration of a pre-1.0 Sails app to Sails 1.0", long_about = None)]
struct Cli {
    /// Enable verbose (info-level) logging to stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Enable debug-level logging to stderr.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full migration pipeline (dependencies, config files, scan).
    Migrate(MigrateArgs),

    /// Scan the project and produce the migration report, changing nothing.
    Scan(ScanArgs),

    /// Print the model facts extracted from `api/models`.
    Models(ModelsArgs),
}

#[derive(Parser, Debug)]
struct MigrateArgs {
    /// Project root (defaults to the current directory).
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Answer yes to every prompt.
    #[arg(long, short = 'y')]
    yes: bool,

    /// Skip every mutating step and only produce the scan report.
    #[arg(long)]
    report_only: bool,
}

#[derive(Parser, Debug)]
struct ScanArgs {
    /// Project root (defaults to the current directory).
    #[arg(long, default_value = ".")]
    project: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Parser, Debug)]
struct ModelsArgs {
    /// Project root (defaults to the current directory).
    #[arg(long, default_value = ".")]
    project: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> std::process::ExitCode {
    match run_with_args(std::env::args_os()) {
        Ok(code) => std::process::ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:?}");
            std::process::ExitCode::from(1)
        }
    }
}

fn run_with_args<I, T>(args: I) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    init_logging(cli.verbose, cli.debug);

    match cli.command {
        Commands::Migrate(args) => cmd_migrate(args),
        Commands::Scan(args) => cmd_scan(args),
        Commands::Models(args) => {
            cmd_models(args)?;
            Ok(0)
        }
    }
}

/// Initialize tracing/logging based on CLI flags.
fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    debug!("Logging initialized at level: {}", level);
}

/// Asks the operator before each mutating step.
trait Prompter {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

struct InteractivePrompter;

impl Prompter for InteractivePrompter {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        println!("{message}");
        print!("[y/N] ");
        io::stdout().flush().context("flush stdout")?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read confirmation")?;
        let answer = line.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

/// Used with `--yes`: prints the prompt for the record and proceeds.
struct AutoConfirm;

impl Prompter for AutoConfirm {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        println!("{message}");
        println!("[--yes: proceeding]");
        Ok(true)
    }
}

fn cmd_migrate(args: MigrateArgs) -> Result<i32> {
    let root = args.project;

    println!("----------------------------------------------------");
    println!("This utility will kickstart the process of migrating");
    println!("a pre-Sails-1.0 app to Sails 1.0.x.");
    println!("----------------------------------------------------");
    println!();

    let manifest = load_manifest(&root)?;
    let config = load_project_config(&root)?;
    let facts = load_models(&root)?;
    let plan = plan_dependencies(&manifest, &config);

    if args.report_only {
        return run_scan_and_report(&root, &facts, &config, OutputFormat::Text);
    }

    let mut prompter: Box<dyn Prompter> = if args.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(InteractivePrompter)
    };

    if !step_upgrade_sails(&root, &plan, prompter.as_mut())? {
        // Declining the framework upgrade ends the whole run, cleanly.
        return Ok(0);
    }
    step_install_packages(&root, &plan, prompter.as_mut())?;
    step_remove_packages(&root, &plan, prompter.as_mut())?;
    step_write_globals_config(&root, &config, prompter.as_mut())?;
    step_write_models_config(&root, &config, prompter.as_mut())?;
    step_migrate_datastores(&root, &config, &facts, prompter.as_mut())?;

    let scan = prompter.confirm(
        "Okay, that's about all we can do automatically.\n\n\
         In the next step, we'll do a scan of your code and create a report\n\
         of things that may need to be manually updated for Sails 1.0.\n\
         This could take a few moments depending on the size of your project.\n\n\
         Go ahead and scan your project?",
    )?;
    if !scan {
        println!("Okay, no problem.  In that case we're done!");
        return Ok(0);
    }

    // Config state may have changed above (models_1.0.js, datastores.js),
    // so reload it before reporting.
    let config = load_project_config(&root)?;
    run_scan_and_report(&root, &facts, &config, OutputFormat::Text)
}

/// Returns false when the operator declined the upgrade and the whole run
/// should stop.
fn step_upgrade_sails(
    root: &Path,
    plan: &DependencyPlan,
    prompter: &mut dyn Prompter,
) -> Result<bool> {
    if !plan.needs_sails_upgrade {
        return Ok(true);
    }
    let ok = prompter.confirm(
        "First things first -- looks like we need to install Sails 1.0.\n\nIs that okay?",
    )?;
    if !ok {
        println!(
            "Okay, exiting for now.  Run `relift migrate` again when you're ready to migrate to Sails 1.0!"
        );
        return Ok(false);
    }
    println!("Okay -- installing now (please wait)!");
    npm_install(
        root,
        &PackageSpec {
            name: "sails".to_string(),
            version: "^1.0.0-0".to_string(),
        },
    )?;
    Ok(true)
}

fn step_install_packages(
    root: &Path,
    plan: &DependencyPlan,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    if plan.install.is_empty() {
        return Ok(());
    }
    let list = plan
        .install
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    let ok = prompter.confirm(&format!(
        "Looks like we need to install the following packages:\n\n{list}\n\nIs that okay?"
    ))?;
    if !ok {
        println!("Okay, but your app may not lift without them!");
        return Ok(());
    }
    println!("Okay -- installing now!");
    for spec in &plan.install {
        npm_install(root, spec)?;
    }
    Ok(())
}

fn step_remove_packages(
    root: &Path,
    plan: &DependencyPlan,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    if plan.remove.is_empty() {
        return Ok(());
    }
    let ok = prompter.confirm(&format!(
        "Looks like we can remove the following packages:\n\n{}\n\n\
         These packages are now built-in to Sails.  Removing is strictly optional,\n\
         but will reduce your project's file size.\n\nOkay to remove the packages?",
        plan.remove.join("\n")
    ))?;
    if !ok {
        println!("Okay, no problem -- we'll leave those packages in place!");
        return Ok(());
    }
    println!("Okay -- removing now!");
    for name in &plan.remove {
        npm_uninstall(root, name)?;
    }
    Ok(())
}

fn step_write_globals_config(
    root: &Path,
    config: &ProjectConfig,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    // With every toggle already off there is nothing to carry over.
    let all_disabled = ["_", "async", "models", "sails"]
        .iter()
        .all(|key| config.global_is_disabled(key));
    if all_disabled {
        return Ok(());
    }
    let ok = prompter.confirm(
        "In order for your project to lift, your `config/globals.js` file needs to be updated.\n\
         We can add a new `config/globals_1.0.js` file for now which should allow your project\n\
         to lift, and then when you're ready you can copy that file over to `config/globals.js`.\n\n\
         Create a new `config/globals_1.0.js` file now?",
    )?;
    if !ok {
        println!("Okay, but your app may not lift without it!");
        return Ok(());
    }
    println!("Okay -- creating now!");
    let path = write_globals_config(root, config)?;
    info!(path = %path.display(), "globals config written");
    Ok(())
}

fn step_write_models_config(
    root: &Path,
    config: &ProjectConfig,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    let ok = prompter.confirm(
        "If your project uses models, you will likely need to update your `config/models.js`\n\
         before lifting with Sails 1.0.  We can add a new `config/models_1.0.js` file for now\n\
         which should allow your project to lift, and then when you're ready you merge that\n\
         file with your existing `config/models.js`.\n\n\
         Create a new `config/models_1.0.js` file now?",
    )?;
    if !ok {
        println!("Okay, but your app may not lift without it!");
        return Ok(());
    }
    println!("Okay -- creating now!");
    let path = write_models_config(root, config)?;
    info!(path = %path.display(), "models config written");
    Ok(())
}

fn step_migrate_datastores(
    root: &Path,
    config: &ProjectConfig,
    facts: &ModelFacts,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    if config.connections.is_empty() {
        return Ok(());
    }
    let ok = prompter.confirm(
        "The `connections` configuration has been changed to `datastores` in Sails 1.0.\n\
         In addition, _all_ configured datastores will now always be loaded, even if no models\n\
         are actually using them.  We can migrate your existing `config/connections.js` file over\n\
         to `config/datastores.js` for you (and back up the original file).\n\n\
         Update `config/connections.js` to `config/datastores.js` now?",
    )?;
    if !ok {
        println!("Okay, but your app may not lift without it!");
        return Ok(());
    }
    println!("Okay -- updating now!");
    if let Some(migration) = migrate_datastores(root, config, facts)? {
        info!(
            carried = migration.carried.len(),
            backup = %migration.backup.display(),
            "datastores migrated"
        );
    }
    Ok(())
}

fn npm_install(root: &Path, spec: &PackageSpec) -> Result<()> {
    println!("Installing {spec}...");
    let mut cmd = Command::new("npm");
    cmd.arg("install").arg(spec.to_string()).arg("--save");
    if spec.is_exact() {
        cmd.arg("--save-exact");
    }
    let status = cmd
        .current_dir(root)
        .status()
        .with_context(|| format!("run npm install {spec}"))?;
    if !status.success() {
        bail!("npm install {spec} exited with {status}");
    }
    Ok(())
}

fn npm_uninstall(root: &Path, name: &str) -> Result<()> {
    println!("Removing {name}...");
    let status = Command::new("npm")
        .arg("uninstall")
        .arg(name)
        .arg("--save")
        .current_dir(root)
        .status()
        .with_context(|| format!("run npm uninstall {name}"))?;
    if !status.success() {
        bail!("npm uninstall {name} exited with {status}");
    }
    Ok(())
}

fn cmd_scan(args: ScanArgs) -> Result<i32> {
    let root = args.project;
    // Same project sanity check as the full pipeline.
    load_manifest(&root)?;
    let config = load_project_config(&root)?;
    let facts = load_models(&root)?;
    run_scan_and_report(&root, &facts, &config, args.format)
}

fn run_scan_and_report(
    root: &Path,
    facts: &ModelFacts,
    config: &ProjectConfig,
    format: OutputFormat,
) -> Result<i32> {
    let companion_pins_null = companion_pins_connection_null(root);
    let outcome = scan_project(root, facts, companion_pins_null)?;
    debug!(
        files = outcome.files_scanned,
        skipped = outcome.skipped_files,
        hits = outcome.hits.len(),
        "scan complete"
    );
    let sections = synthesize_report(facts, config, &outcome);

    match format {
        OutputFormat::Json => {
            let receipt = receipt_for(&outcome, sections);
            println!(
                "{}",
                serde_json::to_string_pretty(&receipt).context("render scan receipt")?
            );
        }
        OutputFormat::Text => {
            if sections.is_empty() {
                println!("{NOTHING_TO_REPORT}");
            } else {
                let text = render_report(&sections);
                let path = write_report(root, &text)
                    .with_context(|| format!("write report under {}", root.display()))?;
                println!("{text}");
                println!("This report was saved to {}.", path.display());
            }
            if outcome.skipped_files > 0 {
                println!(
                    "Note: {} file(s) could not be read and were not scanned.",
                    outcome.skipped_files
                );
            }
        }
    }

    Ok(0)
}

fn receipt_for(outcome: &ScanOutcome, sections: Vec<relift_types::ReportSection>) -> ScanReceipt {
    ScanReceipt {
        schema: SCAN_SCHEMA_V1.to_string(),
        tool: ToolMeta {
            name: "relift".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        files_scanned: outcome.files_scanned,
        skipped_files: outcome.skipped_files,
        hits: outcome.hits.clone(),
        sections,
    }
}

fn cmd_models(args: ModelsArgs) -> Result<()> {
    let facts = load_models(&args.project)?;

    match args.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&facts.models).context("render model facts")?
            );
        }
        OutputFormat::Text => {
            if facts.models.is_empty() {
                println!("No models found under api/models.");
                return Ok(());
            }
            for model in facts.models.values() {
                match &model.connection {
                    Some(connection) => println!("{} (connection: {connection})", model.global_id),
                    None => println!("{}", model.global_id),
                }
                for attr in model.attributes.values() {
                    let kind = if attr.is_function {
                        " [function]"
                    } else if attr.is_collection {
                        " [collection]"
                    } else {
                        ""
                    };
                    println!("  {}{kind}", attr.name);
                }
            }
        }
    }

    Ok(())
}
