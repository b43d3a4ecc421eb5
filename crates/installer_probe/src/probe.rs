use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use installer_session::{Charset, DecodePolicy, StreamingDecoder};
use regex::Regex;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::component::{build_component_tree, ComponentTree};
use crate::error::ProbeError;

/// Placeholder used for a language-list slot the installer never assigned an
/// index to (original spec §4.5: "gaps filled with the literal
/// default-language placeholder").
pub const DEFAULT_LANGUAGE_PLACEHOLDER: &str = "<Default>";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
const HELP_PAGING_BUDGET: Duration = Duration::from_millis(2000);

fn language_line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^(\d+):(.*)$").unwrap())
}

fn component_json_line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"^\[\{"index":.*\}\]$"#).unwrap())
}

/// Builder for [`InstallerProbe`], carrying the tunables the spec exposes as
/// defaults (the 8s probe deadline) so callers can override them in tests.
#[derive(Clone, Debug)]
pub struct InstallerProbeBuilder {
    binary: PathBuf,
    timeout: Duration,
}

impl InstallerProbeBuilder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> InstallerProbe {
        InstallerProbe {
            binary: self.binary,
            timeout: self.timeout,
        }
    }
}

/// Drives the installer binary in "query mode" to extract a mod's language
/// list and per-language component tree.
///
/// Every invocation carries an absolute deadline; on elapse the child is
/// killed and the operation returns [`ProbeError::Timeout`].
pub struct InstallerProbe {
    binary: PathBuf,
    timeout: Duration,
}

impl InstallerProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        InstallerProbeBuilder::new(binary).build()
    }

    pub fn builder(binary: impl Into<PathBuf>) -> InstallerProbeBuilder {
        InstallerProbeBuilder::new(binary)
    }

    /// Strips an optional case-insensitive `setup-` prefix and `.tp2` suffix
    /// from a tp2 file's base name to get the mod's normalized name.
    pub fn normalized_mod_name(tp2_path: &Path) -> String {
        let stem = tp2_path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default();
        let without_ext = if stem.is_char_boundary(stem.len().saturating_sub(4))
            && stem.len() >= 4
            && stem[stem.len() - 4..].eq_ignore_ascii_case(".tp2")
        {
            &stem[..stem.len() - 4]
        } else {
            stem
        };
        const PREFIX: &str = "setup-";
        if without_ext.is_char_boundary(PREFIX.len())
            && without_ext.len() >= PREFIX.len()
            && without_ext[..PREFIX.len()].eq_ignore_ascii_case(PREFIX)
        {
            without_ext[PREFIX.len()..].to_string()
        } else {
            without_ext.to_string()
        }
    }

    /// Working directory rule from original §4.5: grandparent of the tp2 if
    /// its parent directory's base name normalizes (case-insensitively) to
    /// the mod name, else the parent.
    pub fn working_dir_for(tp2_path: &Path) -> PathBuf {
        let mod_name = Self::normalized_mod_name(tp2_path);
        let parent = tp2_path.parent().unwrap_or_else(|| Path::new("."));
        let parent_name = parent
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default();
        if parent_name.eq_ignore_ascii_case(&mod_name) {
            parent.parent().map(Path::to_path_buf).unwrap_or_else(|| parent.to_path_buf())
        } else {
            parent.to_path_buf()
        }
    }

    async fn run_query(&self, working_dir: &Path, args: &[&OsStr]) -> Result<Vec<u8>, ProbeError> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(ProbeError::Spawn)?;
        let wait = child.wait_with_output();

        match time::timeout(self.timeout, wait).await {
            Ok(Ok(output)) => Ok(output.stdout),
            Ok(Err(err)) => Err(ProbeError::Io(err)),
            Err(_elapsed) => Err(ProbeError::Timeout),
        }
    }

    /// `<bin> --nogame --list-languages <tp2Path>`. Parses `^[0-9]+:.*`
    /// lines into `(index, name)` pairs and returns an array sized to
    /// `1 + max(index)`, gap-filling with [`DEFAULT_LANGUAGE_PLACEHOLDER`].
    pub async fn list_languages(&self, tp2_path: &Path) -> Result<Vec<String>, ProbeError> {
        let working_dir = Self::working_dir_for(tp2_path);
        let args = [
            OsStr::new("--nogame"),
            OsStr::new("--list-languages"),
            tp2_path.as_os_str(),
        ];
        let stdout = self.run_query(&working_dir, &args).await?;

        let mut decoder = StreamingDecoder::new(Charset::Utf8, DecodePolicy::Replace);
        let text = decoder.decode(&stdout).map_err(ProbeError::Session)?;

        let mut parsed: Vec<(usize, String)> = Vec::new();
        for line in text.lines() {
            if let Some(captures) = language_line_regex().captures(line) {
                let index: usize = captures[1]
                    .parse()
                    .map_err(|_| ProbeError::ParseFailure("language index is not a valid integer"))?;
                parsed.push((index, captures[2].to_string()));
            }
        }

        if parsed.is_empty() {
            return Err(ProbeError::ParseFailure("no language lines found in installer output"));
        }

        let max_index = parsed.iter().map(|(i, _)| *i).max().unwrap_or(0);
        let mut languages = vec![DEFAULT_LANGUAGE_PLACEHOLDER.to_string(); max_index + 1];
        for (index, name) in parsed {
            languages[index] = name;
        }
        Ok(languages)
    }

    /// `<bin> --nogame --list-components-json <tp2Path> <languageIndex>`.
    /// Tries each charset candidate fail-fast except the last, which falls
    /// back to replacement decoding; selects the first line matching
    /// `^\[\{"index":.*}\]$` and parses it as the component JSON array.
    pub async fn list_components(
        &self,
        tp2_path: &Path,
        language_index: u32,
        charset_candidates: &[Charset],
    ) -> Result<ComponentTree, ProbeError> {
        let working_dir = Self::working_dir_for(tp2_path);
        let language_arg = language_index.to_string();
        let args = [
            OsStr::new("--nogame"),
            OsStr::new("--list-components-json"),
            tp2_path.as_os_str(),
            OsStr::new(&language_arg),
        ];
        let stdout = self.run_query(&working_dir, &args).await?;

        if charset_candidates.is_empty() {
            return Err(ProbeError::InvalidArguments);
        }

        let last = charset_candidates.len() - 1;
        let mut text = None;
        for (i, charset) in charset_candidates.iter().enumerate() {
            let policy = if i == last {
                DecodePolicy::Replace
            } else {
                DecodePolicy::FailFast
            };
            let mut decoder = StreamingDecoder::new(*charset, policy);
            match decoder.decode(&stdout) {
                Ok(decoded) => {
                    text = Some(decoded);
                    break;
                }
                Err(err) => {
                    debug!(?charset, ?err, "charset candidate failed to decode installer output");
                }
            }
        }
        let text = text.ok_or(ProbeError::ParseFailure("no charset candidate decoded the installer output"))?;

        let json_line = text
            .lines()
            .find(|line| component_json_line_regex().is_match(line))
            .ok_or(ProbeError::ParseFailure("no component JSON line found in installer output"))?;

        let mod_name = Self::normalized_mod_name(tp2_path);
        build_component_tree(&mod_name, json_line)
    }

    /// As [`Self::list_components`], but if `language_index > 0` fails,
    /// retries once at language index 0 before surfacing the original error
    /// (original §4.5 "Fallback on failure").
    pub async fn list_components_with_fallback(
        &self,
        tp2_path: &Path,
        language_index: u32,
        charset_candidates: &[Charset],
    ) -> Result<ComponentTree, ProbeError> {
        match self.list_components(tp2_path, language_index, charset_candidates).await {
            Ok(tree) => Ok(tree),
            Err(err) if language_index > 0 => {
                debug!(language_index, ?err, "component listing failed, retrying at language 0");
                self.list_components(tp2_path, 0, charset_candidates).await
            }
            Err(err) => Err(err),
        }
    }

    /// `<bin> --version`: identity-validation helper shared with the Binary
    /// Identity Gate's startup check.
    pub async fn version_banner(&self, working_dir: &Path) -> Result<String, ProbeError> {
        let args = [OsStr::new("--version")];
        let stdout = self.run_query(working_dir, &args).await?;
        let (decoded, _) = encoding_rs::UTF_8.decode_without_bom_handling(&stdout);
        Ok(decoded.into_owned())
    }

    /// `<bin> --help --no-exit-pause`, the help-text invocation from
    /// original §6. On non-Linux platforms the installer paginates its help
    /// output and waits for stdin; this feeds `\n` repeatedly for up to 2s
    /// to page through it. See DESIGN.md for the open question this
    /// resolves (accept truncated help text rather than block indefinitely).
    pub async fn run_help(&self) -> Result<Vec<u8>, ProbeError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--help")
            .arg("--no-exit-pause")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(ProbeError::Spawn)?;

        if !cfg!(target_os = "linux") {
            if let Some(mut stdin) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                let deadline = tokio::time::Instant::now() + HELP_PAGING_BUDGET;
                while tokio::time::Instant::now() < deadline {
                    if stdin.write_all(b"\n").await.is_err() {
                        break;
                    }
                    if time::timeout(Duration::from_millis(20), child.wait())
                        .await
                        .is_ok()
                    {
                        break;
                    }
                }
            }
        }

        let wait = child.wait_with_output();
        match time::timeout(self.timeout, wait).await {
            Ok(Ok(output)) => Ok(output.stdout),
            Ok(Err(err)) => Err(ProbeError::Io(err)),
            Err(_elapsed) => Err(ProbeError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalized_name_strips_setup_prefix_and_extension() {
        assert_eq!(
            InstallerProbe::normalized_mod_name(Path::new("setup-ascension.tp2")),
            "ascension"
        );
        assert_eq!(
            InstallerProbe::normalized_mod_name(Path::new("SETUP-Ascension.TP2")),
            "Ascension"
        );
        assert_eq!(
            InstallerProbe::normalized_mod_name(Path::new("bg2tweaks.tp2")),
            "bg2tweaks"
        );
    }

    #[test]
    fn working_dir_uses_grandparent_when_parent_matches_mod_name() {
        let tp2 = PathBuf::from("/games/bg2/ascension/setup-ascension.tp2");
        assert_eq!(
            InstallerProbe::working_dir_for(&tp2),
            PathBuf::from("/games/bg2")
        );
    }

    #[test]
    fn working_dir_uses_parent_when_parent_does_not_match_mod_name() {
        let tp2 = PathBuf::from("/games/bg2/mods/setup-ascension.tp2");
        assert_eq!(
            InstallerProbe::working_dir_for(&tp2),
            PathBuf::from("/games/bg2/mods")
        );
    }
}
