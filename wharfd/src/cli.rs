//! Command-line surface for the driver binary.
use std::path::PathBuf;

use clap::Parser;

/// Stream a child process's combined stdout/stderr to an object store as a
/// logarithmically-chunked, pollable stream.
#[derive(Debug, Parser)]
#[command(name = "wharfd", version, about)]
pub struct Opt {
    /// Store objects under this local directory instead of a remote bucket.
    #[arg(long, conflicts_with = "s3")]
    pub local_dir: Option<PathBuf>,

    /// Store objects in this S3-compatible bucket instead of a local
    /// directory. Credentials are taken from the environment the way the
    /// AWS SDK always resolves them.
    #[arg(long, conflicts_with = "local_dir")]
    pub s3: Option<String>,

    /// Name of the consolidated object. Defaults to the sanitised basename
    /// of the command's first argument.
    #[arg(long)]
    pub output_name: Option<String>,

    /// Source encoding of the child's output, as recognised by `encoding_rs`
    /// (e.g. `utf-8`, `windows-1252`).
    #[arg(long, default_value = "utf-8")]
    pub encoding: String,

    /// Raise the log level. Repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The command to run, and its arguments. Everything after `--`.
    #[arg(required = true, last = true)]
    pub command: Vec<String>,
}

impl Opt {
    /// The resolved output name: `--output-name` if given, else the
    /// sanitised basename of `command[0]`.
    #[must_use]
    pub fn output_name(&self) -> String {
        self.output_name.clone().unwrap_or_else(|| {
            sanitise(
                self.command
                    .first()
                    .map(String::as_str)
                    .unwrap_or("output"),
            )
        })
    }
}

/// Reduce a path-like string to a safe object-name component: take the
/// basename and replace anything that is not alphanumeric, `.`, `_` or `-`
/// with `_`.
fn sanitise(s: &str) -> String {
    let base = s.rsplit(['/', '\\']).next().unwrap_or(s);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "output".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitise_takes_the_basename() {
        assert_eq!(sanitise("/usr/bin/ping"), "ping");
    }

    #[test]
    fn sanitise_replaces_unsafe_characters() {
        assert_eq!(sanitise("my weird name!"), "my_weird_name_");
    }

    #[test]
    fn sanitise_of_empty_string_falls_back() {
        assert_eq!(sanitise(""), "output");
    }

    #[test]
    fn cli_rejects_local_dir_and_s3_together() {
        let err = Opt::try_parse_from([
            "wharfd",
            "--local-dir",
            "/tmp/out",
            "--s3",
            "bucket",
            "--",
            "echo",
            "hi",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn output_name_defaults_to_command_basename() {
        let opt = Opt::try_parse_from(["wharfd", "--local-dir", "/tmp/out", "--", "/bin/ping", "-c", "1"]).unwrap();
        assert_eq!(opt.output_name(), "ping");
    }

    #[test]
    fn output_name_flag_overrides_default() {
        let opt = Opt::try_parse_from([
            "wharfd",
            "--local-dir",
            "/tmp/out",
            "--output-name",
            "custom",
            "--",
            "/bin/ping",
        ])
        .unwrap();
        assert_eq!(opt.output_name(), "custom");
    }
}
