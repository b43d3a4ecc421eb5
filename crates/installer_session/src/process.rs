use std::{ffi::OsString, path::PathBuf};

use tokio::process::Command;

/// Builds the `tokio::process::Command` for spawning the installer binary.
///
/// `argv[0]` is the binary; `argv[1..]` are its arguments, matching the
/// `ProcessSession::new` contract (argv is a full argument vector, not just
/// the trailing arguments).
pub(crate) fn build_command(
    argv: &[OsString],
    working_dir: Option<&PathBuf>,
    include_stderr: bool,
) -> Command {
    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }
    command.stdin(std::process::Stdio::piped());
    command.stdout(std::process::Stdio::piped());
    command.stderr(if include_stderr {
        std::process::Stdio::piped()
    } else {
        std::process::Stdio::null()
    });
    command.kill_on_drop(true);
    command
}
