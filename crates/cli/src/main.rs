mod config;
mod header;
mod paths;

use config::Config;
use header::HeaderPolicy;

use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser};
use colored::{control::set_override, Colorize};
use fmtbridge_core::{
    read_all_input, Bridge, BridgeError, BuiltinEngine, Destination, DylibEngine, Engine,
    EngineState, InitStatus, RawBuffer, StatusCode,
};
use similar::TextDiff;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

const LONG_ABOUT: &str = r##"
fmtb formats source code through a fmtbridge engine.

With no paths, source is read from stdin and the formatted result is written
to stdout (or to --output). With paths, every file is formatted; directories
are walked recursively, filtered by extension and by ignore files.

EXAMPLES:
  fmtb < app.rb                   Format stdin to stdout
  fmtb < app.rb -o app.out.rb     Format stdin into a file
  fmtb --tree app.json < app.rb   Format a pre-parsed tree
  fmtb -i lib/                    Rewrite every .rb file under lib/
  fmtb --check lib/ test/         Show diffs for files that would change
  fmtb @changed-files.txt         Format the files listed in a file

ENGINES:
  The built-in engine normalizes whitespace and indentation. Use --engine to
  load a shared library exporting the fmtbridge C ABI instead:
    fmtb --engine ./libextfmt.so --engine-prefix extfmt lib/

IGNORE FILES:
  Directory walks skip hidden entries, files matched by .gitignore (inside a
  git repository) and files matched by .fmtbignore. Pass --include-gitignored
  to walk gitignored files too. Files named on the command line are always
  formatted.

MAGIC COMMENTS:
  --header-opt-in   only format files containing `# fmtb: true`
  --header-opt-out  skip files containing `# fmtb: false`
  Only the first 500 bytes of each file are searched.

CONFIGURATION:
  Settings can be configured via CLI flags, environment variables, or config file.
  Precedence: CLI args > Environment vars > Config file > Defaults

  Setting          | CLI flag            | Env var               | Default
  -----------------|---------------------|-----------------------|---------
  indent_width     | --indent-width      | FMTB_INDENT_WIDTH     | 2
  max_blank_lines  | --max-blank-lines   | FMTB_MAX_BLANK_LINES  | 1
  extensions       | --extensions        | FMTB_EXTENSIONS       | rb
  engine           | --engine            | FMTB_ENGINE           | built-in
  engine_prefix    | --engine-prefix     | FMTB_ENGINE_PREFIX    | fmtbridge
  no_color         | -C, --no-color      | FMTB_NO_COLOR         | false

  Config file location: fmtb --config-path
  Generate default config: fmtb --config-init

  Note: NO_COLOR env var is also respected (https://no-color.org/)

EXIT CODES:
  0 ok, 1 engine initialization failed, 2 syntax error, 3 bad syntax tree,
  4 engine error, 5 I/O error, 6 bad file name, 7 could not create file,
  8 invalid argument, 9 differences found (--check)"##;

#[derive(Parser)]
#[command(name = "fmtb")]
#[command(version)]
#[command(about = "Format source code through a fmtbridge engine")]
#[command(long_about = LONG_ABOUT)]
struct Cli {
    /// Files or directories to format
    ///
    /// Use @path to read a list of paths (one per line) from a file.
    #[arg(value_name = "PATH")]
    paths: Vec<String>,

    /// Print a diff for every input that would change and exit non-zero if any would
    #[arg(long, conflicts_with = "in_place")]
    check: bool,

    /// Rewrite changed files in place
    #[arg(long, short = 'i')]
    in_place: bool,

    /// Write the formatted stdin input to FILE instead of stdout
    #[arg(long, short = 'o', value_name = "FILE", conflicts_with = "paths")]
    output: Option<PathBuf>,

    /// Format a pre-parsed syntax tree (JSON) for the stdin input
    #[arg(long, value_name = "FILE", conflicts_with_all = ["paths", "check"])]
    tree: Option<PathBuf>,

    /// Only format files containing the magic `# fmtb: true` comment
    #[arg(long)]
    header_opt_in: bool,

    /// Skip files containing the magic `# fmtb: false` comment
    #[arg(long)]
    header_opt_out: bool,

    /// Also walk files matched by .gitignore
    #[arg(long)]
    include_gitignored: bool,

    /// Stop at the first file that fails
    #[arg(long)]
    fail_fast: bool,

    /// Shared library providing the engine
    #[arg(long, value_name = "PATH")]
    engine: Option<PathBuf>,

    /// Symbol prefix of the engine library [default: fmtbridge]
    #[arg(long, value_name = "PREFIX")]
    engine_prefix: Option<String>,

    /// Spaces per indentation level (built-in engine)
    #[arg(long, value_name = "N", conflicts_with = "engine")]
    indent_width: Option<usize>,

    /// Longest run of blank lines kept (built-in engine)
    #[arg(long, value_name = "N", conflicts_with = "engine")]
    max_blank_lines: Option<usize>,

    /// File extensions picked up in directories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Disable colored output
    #[arg(long, short = 'C')]
    no_color: bool,

    /// Verbose output (-v debug, -vv trace) on stderr
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the config file path
    #[arg(long)]
    config_path: bool,

    /// Create a default config file
    #[arg(long)]
    config_init: bool,
}

fn main() {
    let cli = Cli::parse();

    // Handle --config-path
    if cli.config_path {
        match Config::path() {
            Some(path) => println!("{}", path.display()),
            None => {
                eprintln!(
                    "{}: Cannot determine config directory",
                    "error".red().bold()
                );
                process::exit(1);
            }
        }
        return;
    }

    // Handle --config-init
    if cli.config_init {
        match config::init_config() {
            Ok(path) => println!("Created config file: {}", path.display()),
            Err(e) => {
                eprintln!("{}: {}", "error".red().bold(), e);
                process::exit(1);
            }
        }
        return;
    }

    // Initialize tracing based on verbosity level
    let level = match cli.verbose {
        0 => LevelFilter::OFF,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    if level != LevelFilter::OFF {
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    // Precedence: CLI args > Environment vars > Config file > Defaults
    let file_config = Config::load();
    if let Some(path) = Config::path() {
        if path.exists() {
            tracing::debug!("Loaded config from: {}", path.display());
        } else {
            tracing::trace!("No config file at: {}", path.display());
        }
    }

    if cli.no_color || file_config.no_color() {
        set_override(false);
    }

    let bridge = Bridge::new(build_engine(&cli, &file_config));

    // The engine must be up before any input is read
    if bridge.initialize() == InitStatus::Error {
        let message = match bridge.state() {
            EngineState::Failed(message) => message,
            _ => "engine initialization failed".to_string(),
        };
        eprintln!(
            "{}: engine `{}` failed to initialize: {}",
            "error".red().bold(),
            bridge.engine_name(),
            message
        );
        process::exit(StatusCode::InitializationFailure.as_exit_code());
    }

    let policy = HeaderPolicy {
        opt_in: cli.header_opt_in,
        opt_out: cli.header_opt_out,
    };

    let status = if cli.paths.is_empty() {
        run_stdin(&cli, &bridge, policy)
    } else {
        let extensions = cli
            .extensions
            .clone()
            .unwrap_or_else(|| file_config.extensions());
        run_paths(&cli, &bridge, policy, &extensions)
    };

    process::exit(status.as_exit_code());
}

fn build_engine(cli: &Cli, config: &Config) -> Box<dyn Engine> {
    let library = cli.engine.clone().or_else(|| config.engine());
    match library {
        Some(path) => {
            if cli.indent_width.is_some() || cli.max_blank_lines.is_some() {
                eprintln!(
                    "{}: layout flags only apply to the built-in engine; ignoring them for {}",
                    "warning".yellow().bold(),
                    path.display()
                );
            }
            let prefix = cli.engine_prefix.clone().or_else(|| config.engine_prefix());
            tracing::debug!(path = %path.display(), ?prefix, "using engine library");
            Box::new(DylibEngine::open(path, prefix.as_deref()))
        }
        None => {
            let mut layout = config.layout();
            if let Some(n) = cli.indent_width {
                layout.indent_width = n;
            }
            if let Some(n) = cli.max_blank_lines {
                layout.max_blank_lines = n;
            }
            tracing::debug!(?layout, "using built-in engine");
            Box::new(BuiltinEngine::new(layout))
        }
    }
}

fn print_error(msg: &str, file_path: Option<&Path>) {
    match file_path {
        Some(path) => eprintln!("{}: {}: {}", "error".red().bold(), path.display(), msg),
        None => eprintln!("{}: {}", "error".red().bold(), msg),
    }
}

fn print_warning(msg: &str, file_path: &Path) {
    eprintln!("{}: {}: {}", "warning".yellow().bold(), file_path.display(), msg);
}

/// Format stdin. Every failure here ends the run.
fn run_stdin(cli: &Cli, bridge: &Bridge, policy: HeaderPolicy) -> StatusCode {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        // Nothing piped in; show usage instead of waiting on the terminal
        let _ = Cli::command().print_help();
        println!();
        return StatusCode::Ok;
    }

    let input = match read_all_input(stdin.lock()) {
        Ok(input) => input,
        Err(e) => {
            print_error(&format!("cannot read stdin: {e}"), None);
            return BridgeError::Input(e).status();
        }
    };
    tracing::debug!(
        len = input.len(),
        capacity = input.capacity(),
        growths = input.growths(),
        "read stdin"
    );

    let destination = Destination::from_path(cli.output.as_ref());
    let result = match &cli.tree {
        Some(tree_path) => format_tree(bridge, &destination, input.as_bytes(), tree_path),
        None => {
            let source = input.as_bytes();
            if !allowed(policy, source) {
                if cli.check {
                    Ok(())
                } else {
                    write_bytes(&destination, source)
                }
            } else {
                match bridge.format_buffer(input.as_raw()) {
                    Ok(out) if cli.check => {
                        if out.as_bytes() == source {
                            Ok(())
                        } else {
                            print!("{}", unified_diff("stdin", source, out.as_bytes()));
                            return StatusCode::DiffDetected;
                        }
                    }
                    Ok(out) => write_bytes(&destination, out.as_bytes()),
                    Err(e) => Err(e),
                }
            }
        }
    };

    match result {
        Ok(()) => StatusCode::Ok,
        Err(e) => {
            print_error(&e.to_string(), None);
            e.status()
        }
    }
}

fn format_tree(
    bridge: &Bridge,
    destination: &Destination,
    source: &[u8],
    tree_path: &Path,
) -> Result<(), BridgeError> {
    let tree = fs::read(tree_path).map_err(BridgeError::Input)?;
    bridge
        .format_tree(destination, RawBuffer::new(source), RawBuffer::new(&tree))
        .map(drop)
}

fn write_bytes(destination: &Destination, bytes: &[u8]) -> Result<(), BridgeError> {
    let mut writer = destination.open()?;
    writer.write(bytes)?;
    writer.finish().map(drop)
}

fn allowed(policy: HeaderPolicy, source: &[u8]) -> bool {
    match std::str::from_utf8(source) {
        Ok(text) => policy.allows(text),
        // Not text, so there is no header to find
        Err(_) => !policy.opt_in,
    }
}

/// Format files. Failures are reported per file; with `--fail-fast` the
/// first one ends the run.
fn run_paths(
    cli: &Cli,
    bridge: &Bridge,
    policy: HeaderPolicy,
    extensions: &[String],
) -> StatusCode {
    let paths = match paths::expand_lists(&cli.paths) {
        Ok(paths) => paths,
        Err((list, e)) => {
            print_error(&format!("cannot read path list: {e}"), Some(Path::new(&list)));
            return StatusCode::IoError;
        }
    };

    let mut first_failure = None;
    let mut changed = 0usize;

    for entry in paths::collect_files(&paths, extensions, cli.include_gitignored) {
        let outcome = entry
            .map_err(|(path, e)| (path, BridgeError::Input(e)))
            .and_then(|path| format_file(cli, bridge, policy, &path).map_err(|e| (path, e)));

        match outcome {
            Ok(was_changed) => changed += usize::from(was_changed),
            Err((path, e)) => {
                if cli.fail_fast {
                    print_error(&e.to_string(), Some(&path));
                    return e.status();
                }
                print_warning(&e.to_string(), &path);
                first_failure.get_or_insert(e.status());
            }
        }
    }

    tracing::debug!(changed, "finished formatting files");

    if let Some(status) = first_failure {
        return status;
    }
    if cli.check && changed > 0 {
        eprintln!(
            "{} file(s) would be reformatted",
            changed.to_string().bold()
        );
        return StatusCode::DiffDetected;
    }
    StatusCode::Ok
}

/// Format one file. Returns whether formatting changed it.
fn format_file(
    cli: &Cli,
    bridge: &Bridge,
    policy: HeaderPolicy,
    path: &Path,
) -> Result<bool, BridgeError> {
    let source = fs::read(path).map_err(BridgeError::Input)?;

    if !allowed(policy, &source) {
        tracing::debug!(path = %path.display(), "skipped by header policy");
        if !cli.check && !cli.in_place {
            write_bytes(&Destination::Stdout, &source)?;
        }
        return Ok(false);
    }

    let out = bridge.format_buffer(RawBuffer::new(&source))?;
    let changed = out.as_bytes() != source.as_slice();

    if cli.check {
        if changed {
            let name = path.display().to_string();
            print!("{}", unified_diff(&name, &source, out.as_bytes()));
        }
    } else if cli.in_place {
        if changed {
            tracing::debug!(path = %path.display(), "rewriting");
            write_bytes(&Destination::File(path.to_path_buf()), out.as_bytes())?;
        }
    } else {
        write_bytes(&Destination::Stdout, out.as_bytes())?;
    }

    Ok(changed)
}

/// Unified diff of a formatting change, labelled with `name` on both sides.
fn unified_diff(name: &str, before: &[u8], after: &[u8]) -> String {
    let before = String::from_utf8_lossy(before);
    let after = String::from_utf8_lossy(after);
    let diff = TextDiff::from_lines(before.as_ref(), after.as_ref());
    let rendered = diff.unified_diff().header(name, name).to_string();
    rendered
}
