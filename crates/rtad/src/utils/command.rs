//! Shell command execution.

use tokio::process::Command;
use tracing::{debug, warn};

use rta_core::{ErrorCode, Response};

/// Runs `command` through `sh -c` with stderr folded into stdout.
///
/// The reply carries the combined output; the code is `SUCCESS` only when
/// the command exits with status 0.
pub async fn execute_command(command: &str) -> Response {
    // Redirect on its own line ahead of the command text
    let script = format!("exec 2>&1\n{command}");
    let output = match Command::new("sh").arg("-c").arg(&script).output().await {
        Ok(output) => output,
        Err(e) => {
            warn!(command, error = %e, "Failed to run shell");
            return Response::failed("");
        }
    };

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!(command, status = %output.status, bytes = text.len(), "Command finished");

    let code = if output.status.success() {
        ErrorCode::Success
    } else {
        ErrorCode::Failed
    };
    Response::with_code(text, code)
}
