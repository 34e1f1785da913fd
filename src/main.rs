//! Purpose: `cordis` CLI entry point for inspecting manifests and exercising interfaces.
//! Role: Binary crate root; parses args, runs one broker command, emits JSON on stdout.
//! Invariants: Errors are emitted as JSON on stderr (plain text on a TTY).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Logs go to stderr through `tracing`; stdout carries results only.
use std::ffi::OsString;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use cordis::api::{
    Broker, BrokerConfig, Error, ErrorKind, InitOptions, Kind, Manifest, ManifestLayout,
    ManifestSource, OpenFlags, OpenRequest, PathKind, default_manifest_path, get_path,
    interfaces_dir, to_exit_code,
};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cordis",
    version,
    about = "Resolve manifest names to interfaces in native libraries",
    long_about = None,
    after_help = r#"EXAMPLES
  $ cordis check
  $ cordis --manifest app.manifest.json open log --write --read
  $ cordis --main --manifest cordis.json open greet --write --data hello --read --cleanup
  $ cordis path config"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Manifest file (default: <exe>.manifest.json)",
        value_hint = ValueHint::FilePath
    )]
    manifest: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Manifest file is the broker object itself, not a document holding \"cordis\""
    )]
    main: bool,
    #[arg(
        long,
        global = true,
        help = "Base directory for relative library paths",
        value_hint = ValueHint::DirPath
    )]
    interfaces_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Open absolute paths missing from the manifest as files")]
    fs_fallback: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Validate the manifest and print its entries as JSON")]
    Check,
    #[command(about = "Open an interface and report the entry point's result")]
    Open(OpenArgs),
    #[command(about = "Print a well-known directory")]
    Path {
        #[arg(value_enum)]
        kind: PathKindCli,
    },
}

#[derive(Args)]
struct OpenArgs {
    name: String,
    #[arg(long, help = "Request write access")]
    write: bool,
    #[arg(long, value_enum, help = "Require the entry to be of this kind")]
    kind: Option<KindCli>,
    #[arg(long, help = "Opaque data string for extended interfaces")]
    data: Option<String>,
    #[arg(long, help = "Read the connection to EOF and include it in the output")]
    read: bool,
    #[arg(long, help = "Run cleanup afterwards and report unloaded interfaces")]
    cleanup: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KindCli {
    Interface,
    Fs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PathKindCli {
    Temp,
    Home,
    Exe,
    App,
    Config,
    Data,
    Cache,
}

impl From<PathKindCli> for PathKind {
    fn from(kind: PathKindCli) -> Self {
        match kind {
            PathKindCli::Temp => PathKind::Temp,
            PathKindCli::Home => PathKind::Home,
            PathKindCli::Exe => PathKind::Executable,
            PathKindCli::App => PathKind::Application,
            PathKindCli::Config => PathKind::Config,
            PathKindCli::Data => PathKind::Data,
            PathKindCli::Cache => PathKind::Cache,
        }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run(std::env::args_os()) {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run<I>(args: I) -> Result<i32, Error>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(err.kind().to_string())
                    .with_hint("Run `cordis --help` for usage."));
            }
        },
    };

    match &cli.command {
        Command::Check => {
            let manifest = Manifest::load(&manifest_source(&cli), layout(&cli), &base_dir(&cli))?;
            emit_json(&manifest.to_json());
        }
        Command::Open(args) => {
            let value = open(&cli, args)?;
            emit_json(&value);
        }
        Command::Path { kind } => {
            println!("{}", get_path((*kind).into()).display());
        }
    }
    Ok(0)
}

fn open(cli: &Cli, args: &OpenArgs) -> Result<Value, Error> {
    let broker = Broker::native().with_config(BrokerConfig {
        interfaces_dir: Some(base_dir(cli)),
        filesystem_fallback: cli.fs_fallback,
    });
    broker.init(InitOptions::new(manifest_source(cli), layout(cli)))?;

    let mut flags = OpenFlags::default();
    if args.write {
        flags = flags.with_write();
    }
    if let Some(kind) = args.kind {
        flags = flags.with_kind(match kind {
            KindCli::Interface => Kind::Interface,
            KindCli::Fs => Kind::Filesystem,
        });
    }
    let mut request = OpenRequest::new(&args.name, flags);
    request.data = args.data.clone();

    let conn = broker.open_with(&request)?;
    let mut out = Map::new();
    out.insert("name".to_string(), json!(args.name));
    out.insert("value".to_string(), json!(conn.value()));
    out.insert("origin".to_string(), json!(format!("{:?}", conn.origin())));
    if args.read {
        let mut bytes = Vec::new();
        conn.into_file().read_to_end(&mut bytes).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read connection")
                .with_source(err)
        })?;
        out.insert(
            "output".to_string(),
            json!(String::from_utf8_lossy(&bytes).into_owned()),
        );
    }
    if args.cleanup {
        out.insert("unloaded".to_string(), json!(broker.cleanup()));
    }
    Ok(Value::Object(out))
}

fn manifest_source(cli: &Cli) -> ManifestSource {
    ManifestSource::File(cli.manifest.clone().unwrap_or_else(default_manifest_path))
}

fn layout(cli: &Cli) -> ManifestLayout {
    if cli.main {
        ManifestLayout::Main
    } else {
        ManifestLayout::Document
    }
}

fn base_dir(cli: &Cli) -> PathBuf {
    cli.interfaces_dir.clone().unwrap_or_else(interfaces_dir)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn emit_json(value: &Value) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    match err.message() {
        Some(message) => message.to_string(),
        None => format!("{:?}", err.kind()),
    }
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(name) = err.name() {
        inner.insert("name".to_string(), json!(name));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(errno) = err.errno() {
        inner.insert("errno".to_string(), json!(errno));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = std::error::Error::source(err);
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn open_flags_parse() {
        let cli = Cli::try_parse_from(args(&[
            "cordis", "--main", "open", "log", "--write", "--kind", "fs", "--data", "x",
        ]))
        .expect("parse");
        assert!(cli.main);
        match cli.command {
            Command::Open(open) => {
                assert_eq!(open.name, "log");
                assert!(open.write);
                assert!(matches!(open.kind, Some(KindCli::Fs)));
                assert_eq!(open.data.as_deref(), Some("x"));
            }
            _ => panic!("expected open"),
        }
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        let err = run(args(&["cordis", "check", "--bogus"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(to_exit_code(err.kind()), 2);
    }

    #[test]
    fn error_json_includes_context() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("no manifest entry")
            .with_name("missing");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "NotFound");
        assert_eq!(value["error"]["name"], "missing");
    }
}
