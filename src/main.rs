//! Binary entrypoint that starts the parley server.

use std::process::ExitCode;

use parley::start_server;

/// Start the server with configuration read from the environment.
fn main() -> ExitCode {
    start_server::run()
}
