//! Purpose: `vpp-driver` entry point: an MCP server over stdio for vision job graphs.
//! Role: Binary crate root; parses args, sets up logging, preloads a graph, runs the loop.
//! Invariants: stdout carries protocol messages only; all diagnostics go to stderr.
//! Invariants: Errors or panics escaping the loop are logged as fatal before exiting.
//! Invariants: Process exit code is derived from `to_exit_code`.
use std::io::{self, BufReader, BufWriter};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, ValueHint};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vpp_driver::core::error::{Error, to_exit_code};
use vpp_driver::core::typeres::{NamingConvention, TypeResolver};
use vpp_driver::mcp::McpDispatcher;
use vpp_driver::model::catalog::builtin_universe;
use vpp_driver::session::Session;
use vpp_driver::store::JsonStore;
use vpp_driver::tools::VppMcpHandler;

mod mcp_stdio;

const LOG_ENV: &str = "VPP_DRIVER_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "vpp-driver",
    version,
    about = "MCP server for inspecting and editing VisionPro job graphs over stdio"
)]
struct Cli {
    /// Graph file to load before serving (ignored if it does not exist).
    #[arg(value_name = "GRAPH", value_hint = ValueHint::FilePath)]
    graph: Option<PathBuf>,

    /// Directory searched for on-demand plugin units (default: the executable's directory).
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    plugin_dir: Option<PathBuf>,

    /// Leading namespace segment used when qualifying short type names.
    #[arg(long, default_value = "Cognex")]
    vendor: String,

    /// Second namespace segment used when qualifying short type names.
    #[arg(long, default_value = "VisionPro")]
    product: String,

    /// Log filter used when neither VPP_DRIVER_LOG nor RUST_LOG is set.
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let exit_code = match panic::catch_unwind(AssertUnwindSafe(|| run(cli))) {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            error!(kind = ?err.kind(), error = %err, "fatal error, shutting down");
            to_exit_code(err.kind())
        }
        Err(_) => {
            error!("fatal panic, shutting down");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), Error> {
    let plugin_dir = cli.plugin_dir.unwrap_or_else(default_plugin_dir);
    let convention = NamingConvention::default().with_namespace(cli.vendor, cli.product);
    let resolver =
        TypeResolver::new(Rc::new(builtin_universe()), plugin_dir).with_convention(convention);
    let mut session = Session::new(JsonStore::new(), resolver);

    if let Some(graph) = cli.graph.as_deref() {
        preload(&mut session, graph);
    }

    info!(
        plugin_dir = %session.resolver().base_dir().display(),
        "serving MCP over stdio"
    );
    let mut dispatcher = McpDispatcher::new(VppMcpHandler::new(session));
    let stdin = io::stdin();
    let stdout = io::stdout();
    mcp_stdio::serve(
        &mut dispatcher,
        BufReader::new(stdin.lock()),
        BufWriter::new(stdout.lock()),
    )
}

fn preload(session: &mut Session, graph: &Path) {
    if !graph.exists() {
        warn!(path = %graph.display(), "graph file not found; starting empty");
        return;
    }
    if let Err(err) = session.load_file(graph) {
        warn!(path = %graph.display(), error = %err, "failed to preload graph; starting empty");
    }
}

fn default_plugin_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_tracing(fallback: &str) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
