mod logging;

use std::env;
use std::path::PathBuf;
use std::process;
use log::{LevelFilter, info};

use css_var_native::server::start_language_server;

const VERBOSE_FLAG: &str = "--verbose";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let verbose = args.iter().skip(1).any(|arg| arg == VERBOSE_FLAG);
    let workspace_path = args.iter().skip(1).find(|arg| !arg.starts_with("--"));

    let Some(workspace_path) = workspace_path else {
        // Use eprintln for usage info since logger isn't initialized yet
        eprintln!("Usage: {} <workspace_path> [{}]", args[0], VERBOSE_FLAG);
        eprintln!("  <workspace_path>: Workspace whose CSS variables are indexed");
        eprintln!("  {}: Log debug messages", VERBOSE_FLAG);
        eprintln!("Example: {} /home/me/projects/site", args[0]);
        eprintln!("Note: The language server talks LSP over stdin/stdout.");
        process::exit(1);
    };

    let workspace_root = PathBuf::from(workspace_path);
    if !workspace_root.is_dir() {
        eprintln!("Workspace path is not a directory: {}", workspace_root.display());
        process::exit(1);
    }

    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let log_file_path = match logging::init_logger(level) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Failed to initialize logger: {}", e);
            process::exit(1);
        }
    };

    info!("CSS Var Native starting");
    info!("Command line arguments: {:?}", args);
    info!("Logging to {}", log_file_path.display());

    start_language_server(workspace_root).await;

    info!("CSS Var Native shutting down");
}
