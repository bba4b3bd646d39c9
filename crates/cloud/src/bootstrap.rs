//! Instance bootstrap script.
//!
//! Every provisioned instance runs the worker once against the task's
//! callback URL and then powers itself off, whatever the worker's exit
//! status. With spot instances set to terminate on shutdown, that is what
//! returns the capacity.

/// Name of the worker binary installed in the machine image.
pub const WORKER_BINARY: &str = "spotline-worker";

/// Empty scratch directory the worker runs in.
pub const WORK_DIR: &str = "/var/lib/spotline/work";

/// Render the bash user-data for one task.
pub fn render(callback_url: &str, progress_minutes: u32) -> String {
    format!(
        "#!/usr/bin/env bash\n\
         mkdir -p {WORK_DIR}\n\
         cd {WORK_DIR}\n\
         {WORKER_BINARY} --callback {} --progress {progress_minutes} || true\n\
         shutdown now\n",
        shell_quote(callback_url),
    )
}

/// Base64 form expected by the EC2 `UserData` field.
pub fn encode(script: &str) -> String {
    aws_smithy_types::base64::encode(script.as_bytes())
}

/// Single-quote `value` for bash.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
