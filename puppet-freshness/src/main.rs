#[macro_use]
extern crate tracing;

use std::env;
use std::net::IpAddr;

use anyhow::Context as _;
use camino::Utf8PathBuf;
use puppet_freshness::command_file::{CommandSink, DEFAULT_COMMAND_FILE, FRESHNESS_SERVICE};
use puppet_freshness::config::{CONF_PATH_ENV, DEFAULT_CONF_PATH, DirectoryConf};
use puppet_freshness::{FreshnessCfg, Outcome};
use seahorse::{App, Context, Flag, FlagType};
use tokio::runtime;
use tracing_appender::non_blocking::WorkerGuard;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_DIRECTORY: i32 = 2;

const ARGS_ENV: &str = "PUPPET_FRESHNESS_ARGS";

const DEFAULT_LOG_FILTER: &str = "info";

fn main() {
    let args: Vec<String> = if let Ok(args_str) = env::var(ARGS_ENV) {
        env::args()
            .take(1)
            .chain(parse_env_variable_as_args(&args_str))
            .collect()
    } else {
        env::args().collect()
    };

    if args.len() < 2 {
        usage_error(&anyhow::anyhow!("<IP> is missing"));
    }

    let app = App::new(env!("CARGO_PKG_NAME"))
        .description(env!("CARGO_PKG_DESCRIPTION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .usage(generate_usage())
        .action(submit_action);

    apply_flags(app).run(args);
}

fn generate_usage() -> String {
    format!(
        "{command} [OPTIONS] <IP>\n\
        \n\
        \tLooks up the instance owning <IP> in the directory and writes a passive\n\
        \t'{service}' result for it into the monitoring command file.\n\
        \n\
        \tExample: submit from an SNMP trap handler\n\
        \n\
        \t  {command} --command-file /var/lib/icinga/rw/icinga.cmd 10.68.16.4\n\
        \n\
        Exit status:\n\
        \t{EXIT_SUCCESS}  Result written, or no instance owns <IP>\n\
        \t{EXIT_USAGE}  <IP> is missing or invalid\n\
        \t{EXIT_DIRECTORY}  The directory could not be reached, bound or searched\n\
        \n\
        Arguments can also be passed with the {ARGS_ENV} environment variable.",
        command = env!("CARGO_PKG_NAME"),
        service = FRESHNESS_SERVICE,
    )
}

fn apply_flags(app: App) -> App {
    app.flag(Flag::new("config", FlagType::String).description(format!(
        "Directory configuration file [default = ${CONF_PATH_ENV} or {DEFAULT_CONF_PATH}]"
    )))
    .flag(
        Flag::new("command-file", FlagType::String)
            .description(format!("Monitoring external command file [default = {DEFAULT_COMMAND_FILE}]")),
    )
    .flag(
        Flag::new("service", FlagType::String)
            .description(format!("Service description of the result [default = {FRESHNESS_SERVICE}]")),
    )
    .flag(Flag::new("dry-run", FlagType::Bool).description("Print the command on stdout instead of writing it"))
    .flag(Flag::new("log-file", FlagType::String).description("Write logs to this file instead of stderr"))
    .flag(
        Flag::new("log-filter", FlagType::String)
            .description(format!("Logging directives [default = $RUST_LOG or {DEFAULT_LOG_FILTER}]")),
    )
}

fn submit_action(c: &Context) {
    let code = match SubmitArgs::parse(c) {
        Ok(args) => run_submit(args),
        Err(e) => usage_error(&e),
    };

    std::process::exit(code);
}

fn usage_error(error: &anyhow::Error) -> ! {
    eprintln!("error: {error:#}");
    eprintln!("Usage: {} [OPTIONS] <IP>", env!("CARGO_PKG_NAME"));
    std::process::exit(EXIT_USAGE);
}

// Returning instead of exiting lets the logger guard flush pending records.
fn run_submit(args: SubmitArgs) -> i32 {
    let _guard = match setup_logger(&args.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return EXIT_DIRECTORY;
        }
    };

    let conf = match DirectoryConf::load(&args.conf_path) {
        Ok(conf) => conf,
        Err(error) => {
            error!(error = format!("{:#}", anyhow::Error::new(error)), "Couldn't load configuration");
            return EXIT_DIRECTORY;
        }
    };

    let cfg = FreshnessCfg {
        ip: args.ip,
        conf,
        sink: args.sink,
        service: args.service,
    };

    let rt = match runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("runtime build failed")
    {
        Ok(rt) => rt,
        Err(error) => {
            error!(error = format!("{error:#}"), "Couldn't start");
            return EXIT_DIRECTORY;
        }
    };

    let res = rt.block_on(puppet_freshness::submit(cfg));

    rt.shutdown_timeout(core::time::Duration::from_millis(100));

    match res {
        Ok(Outcome::Submitted { hostname }) => {
            info!(%hostname, "Terminated successfully");
            EXIT_SUCCESS
        }
        Ok(Outcome::NoMatch) => {
            info!("Terminated successfully, nothing submitted");
            EXIT_SUCCESS
        }
        Err(error) => {
            error!(error = format!("{:#}", anyhow::Error::new(error)), "Freshness submission failed");
            EXIT_DIRECTORY
        }
    }
}

// args parsing

fn parse_env_variable_as_args(env_var_str: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut arg = String::new();
    let mut iter = env_var_str.chars();

    loop {
        match iter.next() {
            Some('"') => loop {
                match iter.next() {
                    Some('"') | None => break,
                    Some(c) => arg.push(c),
                }
            },
            Some('\'') => loop {
                match iter.next() {
                    Some('\'') | None => break,
                    Some(c) => arg.push(c),
                }
            },
            Some(' ') => {
                if !arg.is_empty() {
                    args.push(std::mem::take(&mut arg));
                }
            }
            Some(c) => arg.push(c),
            None => break,
        }
    }

    if !arg.is_empty() {
        args.push(arg);
    }

    args
}

enum Logging {
    Term,
    File { filepath: Utf8PathBuf },
}

struct LoggingArgs {
    output: Logging,
    filter: String,
}

struct SubmitArgs {
    ip: IpAddr,
    conf_path: Utf8PathBuf,
    sink: CommandSink,
    service: String,
    logging: LoggingArgs,
}

impl SubmitArgs {
    fn parse(c: &Context) -> anyhow::Result<Self> {
        let arg_ip = c.args.first().context("<IP> is missing")?;
        let ip = arg_ip
            .parse::<IpAddr>()
            .with_context(|| format!("Bad <IP>: `{arg_ip}`"))?;

        let conf_path = if let Ok(path) = c.string_flag("config") {
            Utf8PathBuf::from(path)
        } else if let Ok(path) = env::var(CONF_PATH_ENV) {
            Utf8PathBuf::from(path)
        } else {
            Utf8PathBuf::from(DEFAULT_CONF_PATH)
        };

        let sink = if c.bool_flag("dry-run") {
            CommandSink::Stdout
        } else if let Ok(path) = c.string_flag("command-file") {
            CommandSink::File(Utf8PathBuf::from(path))
        } else {
            CommandSink::File(Utf8PathBuf::from(DEFAULT_COMMAND_FILE))
        };

        let service = c
            .string_flag("service")
            .unwrap_or_else(|_| FRESHNESS_SERVICE.to_owned());

        let output = if let Ok(filepath) = c.string_flag("log-file") {
            Logging::File {
                filepath: Utf8PathBuf::from(filepath),
            }
        } else {
            Logging::Term
        };

        let filter = c
            .string_flag("log-filter")
            .ok()
            .or_else(|| env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());

        Ok(Self {
            ip,
            conf_path,
            sink,
            service,
            logging: LoggingArgs { output, filter },
        })
    }
}

// logging

fn setup_logger(logging: &LoggingArgs) -> anyhow::Result<WorkerGuard> {
    use std::panic;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let (non_blocking, guard) = match &logging.output {
        Logging::Term => tracing_appender::non_blocking(std::io::stderr()),
        Logging::File { filepath } => {
            let folder = filepath.parent().context("invalid log path (parent)")?;
            let file_name = filepath.file_name().context("invalid log path (file_name)")?;
            let folder = if folder.as_str().is_empty() {
                camino::Utf8Path::new(".")
            } else {
                folder
            };
            let file_appender = tracing_appender::rolling::Builder::new()
                .rotation(tracing_appender::rolling::Rotation::NEVER)
                .filename_prefix(file_name)
                .build(folder)
                .context("couldn't create log file")?;
            tracing_appender::non_blocking(file_appender)
        }
    };

    let ansi = matches!(logging.output, Logging::Term);
    let fmt_layer = fmt::layer().with_writer(non_blocking).with_ansi(ansi);

    let env_filter = EnvFilter::try_new(&logging.filter).context("invalid logging directives")?;

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .context("failed to set up the logger")?;

    panic::set_hook(Box::new(move |panic_info| {
        error!(%panic_info, "Panic");
        eprintln!("{panic_info}");
    }));

    Ok(guard)
}
