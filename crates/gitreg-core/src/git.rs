//! Git access layer
//!
//! Drives the `git` executable as a subprocess: `ls-remote` for ref
//! discovery and `archive` for manifest discovery and content
//! download. Catalog-facing operations decode tar output with the
//! synchronous `tar` crate and run on the blocking pool; the download
//! path stays a true byte stream so a consumer can hash or forward it
//! without materializing the whole archive.

use std::io::Read;
use std::pin::Pin;
use std::process::{Command, Stdio};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout};
use tokio_util::io::ReaderStream;

use crate::error::{RegistryError, Result};
use crate::manifest::Manifest;

/// Prefix applied to every path inside a content archive
pub const ARCHIVE_PREFIX: &str = "package/";

/// One line of `git ls-remote` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// Fully qualified ref name, e.g. `refs/tags/v1.0.0`
    pub name: String,
    /// Commit SHA the ref points at
    pub sha: String,
}

/// List all refs advertised by a remote
///
/// Malformed lines are skipped; a subprocess failure (unreachable
/// remote, missing `git` binary) surfaces as `RemoteUnavailable`.
pub async fn list_refs(remote: &str) -> Result<Vec<RefEntry>> {
    let remote = remote.to_owned();
    tokio::task::spawn_blocking(move || list_refs_blocking(&remote)).await?
}

/// Archive files matching `search_glob` at `git_ref` and parse each as
/// a manifest
///
/// Yields `(containing directory, manifest)` pairs in archive order.
/// Directory and metadata entries are skipped; a manifest that fails
/// to parse aborts the whole call. A ref where the glob matches
/// nothing yields an empty list.
pub async fn archive_manifests(
    remote: &str,
    git_ref: &str,
    search_glob: &str,
) -> Result<Vec<(String, Manifest)>> {
    let remote = remote.to_owned();
    let git_ref = git_ref.to_owned();
    let search_glob = search_glob.to_owned();
    tokio::task::spawn_blocking(move || archive_manifests_blocking(&remote, &git_ref, &search_glob))
        .await?
}

/// Archive a single file at `git_ref` and return its contents
///
/// Returns `Ok(None)` when the path does not exist at that ref (the
/// archive has zero file entries). Used by the repository
/// configuration loader.
pub async fn archive_file(remote: &str, git_ref: &str, path: &str) -> Result<Option<Vec<u8>>> {
    let remote = remote.to_owned();
    let git_ref = git_ref.to_owned();
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || archive_file_blocking(&remote, &git_ref, &path)).await?
}

fn list_refs_blocking(remote: &str) -> Result<Vec<RefEntry>> {
    tracing::debug!(remote, "listing remote refs");
    let mut child = spawn_git(remote, ["ls-remote", remote])?;

    let mut stdout = String::new();
    if let Some(out) = child.stdout.as_mut() {
        out.read_to_string(&mut stdout)
            .map_err(|e| remote_unavailable(remote, &e.to_string()))?;
    }

    let refs = parse_ls_remote(&stdout);
    wait_checked(remote, child, false)?;
    tracing::debug!(remote, count = refs.len(), "listed remote refs");
    Ok(refs)
}

/// Parse `ls-remote` output lines, "<sha>\t<refname>"
///
/// Peeled entries for annotated tags (`refs/tags/x^{}`) are dropped;
/// keeping them would duplicate every annotated tag in the catalog.
fn parse_ls_remote(stdout: &str) -> Vec<RefEntry> {
    let mut refs = Vec::new();
    for line in stdout.lines() {
        let Some((sha, name)) = line.split_once('\t') else {
            continue;
        };
        if sha.is_empty() || name.is_empty() || name.ends_with("^{}") {
            continue;
        }
        refs.push(RefEntry {
            name: name.to_string(),
            sha: sha.to_string(),
        });
    }
    refs
}

fn archive_manifests_blocking(
    remote: &str,
    git_ref: &str,
    search_glob: &str,
) -> Result<Vec<(String, Manifest)>> {
    tracing::debug!(remote, git_ref, "loading manifests from ref");
    let raw = run_tar_archive(remote, git_ref, search_glob)?;

    let mut manifests = Vec::with_capacity(raw.len());
    for (entry_path, bytes) in raw {
        let manifest = Manifest::from_slice(&bytes).map_err(|e| match e {
            RegistryError::ManifestParse { message, .. } => RegistryError::ManifestParse {
                git_ref: git_ref.to_string(),
                entry: entry_path.clone(),
                message,
            },
            other => other,
        })?;
        tracing::debug!(git_ref, entry = %entry_path, "found package manifest");
        manifests.push((parent_dir(&entry_path), manifest));
    }
    Ok(manifests)
}

fn archive_file_blocking(remote: &str, git_ref: &str, path: &str) -> Result<Option<Vec<u8>>> {
    let mut raw = run_tar_archive(remote, git_ref, path)?;
    Ok(if raw.is_empty() {
        None
    } else {
        Some(raw.swap_remove(0).1)
    })
}

/// Run `git archive --format=tar` for a pathspec and decode all file
/// entries as `(path, contents)` pairs
fn run_tar_archive(remote: &str, git_ref: &str, pathspec: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let mut child = spawn_git(
        remote,
        [
            "archive",
            "--format=tar",
            &format!("--remote={}", remote),
            git_ref,
            pathspec,
        ],
    )?;

    let (entries, stream_error) = match child.stdout.take() {
        Some(stdout) => read_file_entries(stdout),
        None => (Vec::new(), None),
    };

    // The pipe is closed here, so waiting on the child cannot block
    // on a full stdout buffer.
    match stream_error {
        Some(e) => {
            // A broken tar stream usually means the subprocess failed;
            // prefer its stderr over the secondary decode error.
            match wait_checked(remote, child, true) {
                Ok(()) => Err(RegistryError::Io(e)),
                Err(process_error) => Err(process_error),
            }
        }
        None => {
            wait_checked(remote, child, true)?;
            Ok(entries)
        }
    }
}

/// Decode every regular-file entry of a tar stream
///
/// Single pass, non-restartable. pax headers and directory entries are
/// skipped. A decode failure stops the pass and is reported alongside
/// whatever was read before it.
fn read_file_entries<R: Read>(stdout: R) -> (Vec<(String, Vec<u8>)>, Option<std::io::Error>) {
    let mut archive = tar::Archive::new(stdout);
    let mut out = Vec::new();

    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => return (out, Some(e)),
    };
    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => return (out, Some(e)),
        };
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = match entry.path() {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => return (out, Some(e)),
        };
        let mut bytes = Vec::new();
        if let Err(e) = entry.read_to_end(&mut bytes) {
            return (out, Some(e));
        }
        out.push((path, bytes));
    }
    (out, None)
}

/// Archive `path` at `git_ref` in the requested container format
///
/// Every path in the archive is prefixed with `package/`. The returned
/// stream pipes git's stdout directly; the subprocess is killed if the
/// stream is dropped before it is exhausted.
pub fn archive_content(
    remote: &str,
    git_ref: &str,
    path: &str,
    format: &str,
) -> Result<ArchiveStream> {
    tracing::debug!(remote, git_ref, path, format, "streaming content archive");
    let mut child = tokio::process::Command::new("git")
        .args([
            "archive",
            &format!("--format={}", format),
            &format!("--remote={}", remote),
            &format!("--prefix={}", ARCHIVE_PREFIX),
            &format!("{}:{}", git_ref, path),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| remote_unavailable(remote, &e.to_string()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| remote_unavailable(remote, "no stdout pipe from git archive"))?;

    Ok(ArchiveStream {
        remote: remote.to_string(),
        child,
        stdout,
    })
}

/// A streaming git archive: the stdout of a running `git archive`
///
/// Implements [`AsyncRead`]; keeps the child process alive for the
/// lifetime of the stream so dropping the consumer tears the
/// subprocess down with it.
#[derive(Debug)]
pub struct ArchiveStream {
    remote: String,
    child: Child,
    stdout: ChildStdout,
}

impl ArchiveStream {
    /// Wait for the subprocess after the stream has been consumed and
    /// surface a non-zero exit as `RemoteUnavailable`
    pub async fn finish(mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| remote_unavailable(&self.remote, &e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(remote_unavailable(
                &self.remote,
                &format!("git archive exited with {}", status),
            ))
        }
    }

    /// Adapt into a `Bytes` stream suitable for an HTTP response body
    pub fn into_byte_stream(self) -> ReaderStream<ArchiveStream> {
        ReaderStream::new(self)
    }
}

impl AsyncRead for ArchiveStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

// ============ Subprocess plumbing ============

fn spawn_git<'a>(
    remote: &str,
    args: impl IntoIterator<Item = &'a str>,
) -> Result<std::process::Child> {
    Command::new("git")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| remote_unavailable(remote, &e.to_string()))
}

/// Collect stderr and the exit status; non-zero exit is
/// `RemoteUnavailable`. With `empty_pathspec_ok`, a "pathspec did not
/// match" failure counts as success (the archive simply had zero
/// entries).
fn wait_checked(remote: &str, mut child: std::process::Child, empty_pathspec_ok: bool) -> Result<()> {
    let mut stderr = String::new();
    if let Some(err) = child.stderr.as_mut() {
        let _ = err.read_to_string(&mut stderr);
    }
    let status = child
        .wait()
        .map_err(|e| remote_unavailable(remote, &e.to_string()))?;
    if status.success() || (empty_pathspec_ok && is_pathspec_miss(&stderr)) {
        Ok(())
    } else {
        Err(remote_unavailable(remote, stderr.trim()))
    }
}

/// Does stderr indicate a pathspec that matched nothing (as opposed to
/// an unreachable remote or a bad ref)?
fn is_pathspec_miss(stderr: &str) -> bool {
    stderr.contains("did not match")
}

fn remote_unavailable(remote: &str, message: &str) -> RegistryError {
    RegistryError::RemoteUnavailable {
        remote: remote.to_string(),
        message: message.to_string(),
    }
}

fn parent_dir(entry_path: &str) -> String {
    match entry_path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}
