mod config;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wikifier::Page;

use config::Config;

const SUBCOMMANDS: &[&str] = &["render", "test", "help"];

#[derive(Parser)]
#[command(name = "wikifier", version, about = "Render wikifier pages to HTML")]
struct Cli {
    /// Disable colored diagnostics
    #[arg(long, global = true)]
    no_color: bool,

    /// TOML file with page options, directories and image sizes
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log more (repeat for debug and trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a page
    Render(RenderArgs),

    /// Run .test.page test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Page source file
    file: String,

    /// Print {html, css, ...page info, warnings} as JSON
    #[arg(long)]
    json: bool,

    /// Print the stylesheet instead of the HTML
    #[arg(long)]
    css: bool,

    /// Print the block tree instead of the HTML
    #[arg(long)]
    tree: bool,

    /// Only collect page variables and print the page info as JSON
    #[arg(long)]
    vars_only: bool,

    /// Do not report warnings
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.page file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(long = "category")]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // Backwards compatibility: if the first positional arg is not a known
    // subcommand, inject "render" so `wikifier a.page` works like
    // `wikifier render a.page`.
    let mut args: Vec<String> = std::env::args().collect();
    let first_pos = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, a)| !a.starts_with('-'))
        .map(|(i, a)| (i, a.clone()));
    if let Some((pos, first_pos)) = first_pos {
        if !SUBCOMMANDS.contains(&first_pos.as_str()) && !follows_value_flag(&args[pos - 1]) {
            args.insert(pos, "render".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Command::Render(render_args) => do_render(render_args, &config, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, &config, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn follows_value_flag(prev: &str) -> bool {
    matches!(prev, "-c" | "--config")
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn do_render(args: RenderArgs, config: &Config, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let mut page = match Page::open(&args.file, config.page.clone()) {
        Ok(page) => page,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file, e);
            process::exit(1);
        }
    };
    if args.vars_only {
        page = page.vars_only();
    }
    config.apply(&mut page);

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), page.source().to_string());
    let writer = StandardStream::stderr(color_choice);
    let term_config = term::Config::default();

    if let Err(err) = page.parse() {
        let diagnostic = err.to_diagnostic(file_id, page.source());
        emit(&writer, &term_config, &files, &diagnostic);
        process::exit(1);
    }
    info!(file = %args.file, "parsed");

    if args.vars_only {
        print_json(&json!(page.info()));
        return;
    }
    if args.tree {
        print!("{}", page.hierarchy());
        return;
    }

    let html = page.html();
    let css = page.css();

    if !args.quiet {
        for warning in page.warnings() {
            let diagnostic = warning.to_diagnostic(file_id, page.source());
            emit(&writer, &term_config, &files, &diagnostic);
        }
    }

    if args.json {
        let mut out = json!({ "html": html, "css": css });
        if let (Some(out), serde_json::Value::Object(info)) = (out.as_object_mut(), json!(page.info())) {
            out.extend(info);
        }
        out["warnings"] = json!(page.warnings());
        print_json(&out);
    } else if args.css {
        print!("{}", css);
    } else {
        print!("{}", html);
    }
}

fn emit(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostic: &Diagnostic<usize>,
) {
    let _ = term::emit_to_write_style(&mut writer.lock(), config, files, diagnostic);
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("error: cannot encode JSON: {}", e);
            process::exit(1);
        }
    }
}
