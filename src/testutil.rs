//! Stand-in CLI scripts for tests

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Records each invocation's argv to `calls.log` and its environment to
/// `env.<subcommand>` next to itself. Exits 1 with the contents of
/// `fail.<subcommand>` when that file exists.
const RECORDING_CLI: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
env > "$dir/env.$1"
echo "$*" >> "$dir/calls.log"
if [ -f "$dir/fail.$1" ]; then
    cat "$dir/fail.$1"
    exit 1
fi
exit 0
"#;

/// Write a recording CLI named `name` into `dir`
pub fn recording_cli(dir: &Path, name: &str) -> PathBuf {
    write_executable(&dir.join(name), RECORDING_CLI)
}

/// Write a shell script CLI with the given body
pub fn script_cli(dir: &Path, name: &str, body: &str) -> PathBuf {
    write_executable(&dir.join(name), &format!("#!/bin/sh\n{}\n", body))
}

fn write_executable(path: &Path, content: &str) -> PathBuf {
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Make the recording CLI fail `subcommand` with `output`
pub fn fail_subcommand(dir: &Path, subcommand: &str, output: &str) {
    std::fs::write(dir.join(format!("fail.{}", subcommand)), output).unwrap();
}

/// Wait until `calls.log` holds at least `n` lines
pub async fn wait_for_calls(dir: &Path, n: usize) -> Vec<String> {
    let log = dir.join("calls.log");
    for _ in 0..100 {
        if let Ok(content) = std::fs::read_to_string(&log) {
            let lines: Vec<String> = content.lines().map(str::to_string).collect();
            if lines.len() >= n {
                return lines;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {} call(s) in {:?}", n, log);
}

/// Environment recorded for `subcommand`
pub fn recorded_env(dir: &Path, subcommand: &str) -> String {
    std::fs::read_to_string(dir.join(format!("env.{}", subcommand))).unwrap_or_default()
}
