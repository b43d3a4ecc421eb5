use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::ProbeError;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// A SHA-256 digest of an installer binary's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryFingerprint([u8; 32]);

impl BinaryFingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Hashes `bytes` directly.
pub fn hash_bytes(bytes: &[u8]) -> BinaryFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    BinaryFingerprint(hasher.finalize().into())
}

/// Hashes the full contents of `reader`, reading in 16 KiB chunks.
pub fn hash_stream<R: Read>(mut reader: R) -> Result<BinaryFingerprint, ProbeError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(BinaryFingerprint(hasher.finalize().into()))
}

/// Hashes the file at `path`.
pub fn hash_file(path: &Path) -> Result<BinaryFingerprint, ProbeError> {
    let file = std::fs::File::open(path)?;
    hash_stream(file)
}

/// One row of the bundled allow-list JSON resource.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowListEntry {
    pub version: u32,
    pub os: String,
    pub arch: String,
    pub variant: u32,
    pub sha256: String,
}

/// Fingerprint-keyed allow-list of known-good installer binaries.
///
/// Advisory: a binary absent from this list is not automatically refused —
/// see [`validate_candidate`] and the caller's own strict-mode policy.
pub struct AllowList {
    entries: HashMap<BinaryFingerprint, AllowListEntry>,
}

impl AllowList {
    /// Parses the bundled allow-list JSON (`[{version, os, arch, variant,
    /// sha256}]`). Rejects a JSON document containing a duplicate
    /// fingerprint.
    pub fn parse(json: &str) -> Result<Self, ProbeError> {
        let rows: Vec<AllowListEntry> =
            serde_json::from_str(json).map_err(ProbeError::AllowListJson)?;
        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            let digest = decode_hex_fingerprint(&row.sha256)?;
            if entries.insert(digest, row).is_some() {
                return Err(ProbeError::DuplicateFingerprint);
            }
        }
        Ok(Self { entries })
    }

    pub fn lookup(&self, fingerprint: &BinaryFingerprint) -> Option<&AllowListEntry> {
        self.entries.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_hex_fingerprint(sha256: &str) -> Result<BinaryFingerprint, ProbeError> {
    let bytes = hex::decode(sha256)
        .map_err(|_| ProbeError::ParseFailure("allow-list sha256 is not valid hex"))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ProbeError::ParseFailure("allow-list sha256 is not 32 bytes"))?;
    Ok(BinaryFingerprint(array))
}

/// Where to look for a usable installer binary, in priority order.
pub struct CandidateSearch<'a> {
    pub configured_override: Option<&'a Path>,
    pub app_data_dir: &'a Path,
    pub platform: &'a str,
    pub arch: &'a str,
    pub binary_name: &'a str,
}

/// Implements the search order: configured override; app-data relative
/// `platform/arch/name`, `platform/name`, `name`; then `PATH` entries.
/// Returns the first candidate path that exists on disk.
pub fn locate_candidate(search: &CandidateSearch<'_>) -> Option<PathBuf> {
    if let Some(path) = search.configured_override {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    let candidates = [
        search
            .app_data_dir
            .join(search.platform)
            .join(search.arch)
            .join(search.binary_name),
        search.app_data_dir.join(search.platform).join(search.binary_name),
        search.app_data_dir.join(search.binary_name),
    ];
    for candidate in candidates {
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(search.binary_name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(unix)]
fn has_owner_execute_permission(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.permissions().mode() & 0o100 != 0)
}

#[cfg(not(unix))]
fn has_owner_execute_permission(_path: &Path) -> std::io::Result<bool> {
    Ok(true)
}

/// Checks owner-execute permission (unix only) and that `--version` reports
/// the expected WeiDU banner. Does not consult the allow-list; callers
/// decide whether an unlisted-but-valid binary is acceptable.
pub async fn validate_candidate(path: &Path) -> Result<String, ProbeError> {
    if !has_owner_execute_permission(path)? {
        return Err(ProbeError::BinaryNotFound);
    }

    let version_regex = regex::Regex::new(r"\bWeiDU version [0-9]+").unwrap();
    let output = tokio::process::Command::new(path)
        .arg("--version")
        .output()
        .await
        .map_err(ProbeError::Spawn)?;
    let (decoded, _) = encoding_rs::UTF_8.decode_without_bom_handling(&output.stdout);
    if version_regex.is_match(&decoded) {
        Ok(decoded.into_owned())
    } else {
        Err(ProbeError::BinaryNotFound)
    }
}
