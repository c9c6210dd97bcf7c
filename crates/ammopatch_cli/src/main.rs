use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ammopatch_core::context::{CancellationToken, TracingProgress};
use ammopatch_core::core_api::{
    Engine, PassOptions, PatchConfig, PatchOptions, SchemaChoice, validate_output_name,
};
use ammopatch_core::plugin::OverrideFile;
use ammopatch_render::{
    TextRenderOptions, render_candidates_csv, render_override_json, render_override_text,
    render_pass_json, render_pass_text,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AMMOPATCH_LOG";

#[derive(Debug, Parser)]
#[command(name = "ammopatch", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Raise log verbosity (-v info, -vv debug). AMMOPATCH_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a load order for ammunition changes and optionally write a patch.
    Scan(ScanArgs),
    /// Print the header, masters and overrides of a patch file.
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[arg(value_name = "LOAD_ORDER_DIR")]
    dir: PathBuf,
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long = "exclude", value_name = "PLUGIN")]
    exclude: Vec<String>,
    #[arg(
        long,
        value_name = "auto|fallout4|starfield|unknown",
        value_parser = parse_schema
    )]
    schema: Option<SchemaChoice>,
    /// Write one diagnostics row per candidate.
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,
    /// Write the override patch; its file name becomes the plugin name.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    compress: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    #[arg(value_name = "FILE")]
    path: PathBuf,
    #[arg(long)]
    json: bool,
}

fn parse_schema(value: &str) -> Result<SchemaChoice, String> {
    value.parse()
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan(args) => run_scan(args, cli.verbose > 0),
        Command::Inspect(args) => run_inspect(args),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_scan(args: ScanArgs, verbose: bool) {
    let mut config = match &args.config {
        Some(path) => PatchConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Error loading config: {}", e.message);
            process::exit(1);
        }),
        None => PatchConfig::default(),
    };
    apply_overrides(&mut config, &args);

    let output_name = args.output.as_deref().map(output_file_name);
    if let Some(name) = &output_name {
        validate_output_name(name).unwrap_or_else(|e| {
            eprintln!("Error: {}", e.message);
            process::exit(2);
        });
        config.output_name = name.clone();
    }

    let session = Engine::new()
        .open_load_order(&args.dir)
        .unwrap_or_else(|e| {
            eprintln!("Error opening load order: {}", args.dir.display());
            eprintln!("  {}", e.message);
            process::exit(1);
        });

    let cancel = CancellationToken::new();
    let outcome = session
        .run(&PassOptions::from(&config), &cancel, &TracingProgress)
        .unwrap_or_else(|e| {
            eprintln!("Error running pass: {}", e.message);
            process::exit(1);
        });

    if let Some(csv_path) = &args.csv {
        fs::write(csv_path, render_candidates_csv(&outcome.candidates)).unwrap_or_else(|e| {
            eprintln!("Error writing {}: {e}", csv_path.display());
            process::exit(1);
        });
    }

    let report = args.output.as_ref().map(|out_path| {
        let report = session
            .build_patch_with(&outcome, &PatchOptions::from(&config))
            .unwrap_or_else(|e| {
                eprintln!("Error building patch: {}", e.message);
                process::exit(1);
            });
        report.write_to(out_path).unwrap_or_else(|e| {
            eprintln!("Error writing patch: {}", e.message);
            process::exit(1);
        });
        report
    });

    if args.json {
        print_json(&render_pass_json(&outcome, report.as_ref()));
        return;
    }

    print!(
        "{}",
        render_pass_text(&outcome, report.as_ref(), TextRenderOptions { verbose })
    );
    if let Some(out_path) = &args.output {
        println!("Wrote patch to {}", out_path.display());
    }
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut PatchConfig, args: &ScanArgs) {
    for plugin in &args.exclude {
        config.excluded_plugins.insert(plugin);
    }
    if let Some(schema) = args.schema {
        config.schema = schema;
    }
    if let Some(author) = &args.author {
        config.author = Some(author.clone());
    }
    config.compress |= args.compress;
}

fn output_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run_inspect(args: InspectArgs) {
    let bytes = fs::read(&args.path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", args.path.display());
        process::exit(1);
    });
    let name = output_file_name(&args.path);
    let (file, layout) = OverrideFile::parse_with_layout(&name, &bytes).unwrap_or_else(|e| {
        eprintln!("Error parsing patch file: {}", args.path.display());
        eprintln!("  {e}");
        process::exit(1);
    });

    if args.json {
        print_json(&render_override_json(&file, Some(&layout)));
    } else {
        print!("{}", render_override_text(&file, Some(&layout)));
    }
}

fn print_json(value: &JsonValue) {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON output: {e}");
        process::exit(1);
    });
    println!("{rendered}");
}
