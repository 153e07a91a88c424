use clap::{Parser, Subcommand};
use folio::build::Build;
use folio::{config, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once; only called at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Static site builder for markdown content")]
#[command(long_about = "\
Static site builder for markdown content

Every .md/.markdown file under the content directory becomes an HTML page;
every other file is copied as it is. Pages can carry YAML front matter:

  ---
  title: First post             # default: derived from the filename
  date: 2024-01-15              # default: file modification time
  tags: [rust, web]             # indexed when listed in `index`
  template: post.html           # default: default.html
  draft: true                   # never rendered, never listed
  hidden: true                  # rendered, but not listed
  path: about/                  # output path override
  pagination:
    data: pages                 # or an indexed key, e.g. tags
    per_page: 20
  ---

Templates see current_page, config, pages (newest first), index and derived.
The site is rendered into a staging directory and swapped into place only
when every page succeeded, so a failed build never touches the output.

Run 'folio gen-config' to generate a documented folio.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing means stock defaults)
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Content directory (overrides content_dir)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Output directory (overrides output_dir)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Staging directory (overrides temp_dir)
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,

    /// Log pipeline internals to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site: scan → index → render → publish
    Build,
    /// Scan and index content without rendering
    Check,
    /// Print a stock folio.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build => {
            let site_config = load_site_config(&cli)?;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_build_event(&event);
                }
            });
            let result = Build::from_config(site_config).and_then(|build| {
                let mut build = build.with_events(tx);
                build.run()
            });
            printer.join().ok();
            let summary = result?;
            println!("{}", output::format_build_summary(&summary));
        }
        Command::Check => {
            let site_config = load_site_config(&cli)?;
            println!("==> Checking {}", site_config.content_dir.display());
            let report = Build::from_config(site_config)?.check()?;
            output::print_check_output(&report);
            println!("==> Content is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise warnings only, or everything from this crate
/// with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "folio=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file and apply command-line overrides.
fn load_site_config(cli: &Cli) -> Result<config::SiteConfig, config::ConfigError> {
    let mut site_config = config::load_config(&cli.config)?;
    if let Some(source) = &cli.source {
        site_config.content_dir = source.clone();
    }
    if let Some(output) = &cli.output {
        site_config.output_dir = output.clone();
    }
    if let Some(temp_dir) = &cli.temp_dir {
        site_config.temp_dir = temp_dir.clone();
    }
    site_config.validate()?;
    Ok(site_config)
}
