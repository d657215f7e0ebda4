//! Directory walker: mirror a tree through the file pipelines
//!
//! Traversal is depth-first in name order. Directories are created before any
//! file is processed; files then run sequentially or on a bounded rayon pool.
//! A failing entry is logged and recorded in the report. Only a failure to
//! read a directory aborts the walk.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bitcrypt_core::config::{DecryptConfig, WalkConfig};
use bitcrypt_core::{BitcryptError, BitcryptResult};
use bitcrypt_crypto::{CipherParams, KeySealer, KeyUnsealer};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::naming::{decrypted_file_path, encrypted_file_path};
use crate::pipeline::{decrypt_file, encrypt_file, is_staging_name, DecryptOptions, FileReport};
use crate::ProgressFn;

pub struct WalkOptions {
    /// 1 = sequential, 0 = one worker per CPU
    pub workers: usize,
    /// Path components that exclude an entry and its subtree
    pub skip_markers: Vec<String>,
    /// Glob patterns matched against entry names
    pub exclude_patterns: Vec<String>,
    pub restore_mtime: bool,
    pub cancel: Option<CancellationToken>,
    pub progress: Option<ProgressFn>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            skip_markers: vec![".git".into(), ".svn".into()],
            exclude_patterns: Vec::new(),
            restore_mtime: true,
            cancel: None,
            progress: None,
        }
    }
}

impl WalkOptions {
    pub fn from_config(walk: &WalkConfig, decrypt: &DecryptConfig) -> Self {
        Self {
            workers: walk.workers,
            skip_markers: walk.skip_markers.clone(),
            exclude_patterns: walk.exclude_patterns.clone(),
            restore_mtime: decrypt.restore_mtime,
            ..Default::default()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Outcome of a directory walk
#[derive(Debug, Default)]
pub struct WalkReport {
    pub processed: Vec<FileReport>,
    pub up_to_date: usize,
    /// Entries left out by markers, exclude patterns, staging leftovers or file type
    pub skipped: usize,
    pub dirs_created: usize,
    /// Directory and output-collision failures first, then file failures
    /// in traversal order
    pub failures: Vec<(PathBuf, BitcryptError)>,
    pub cancelled: bool,
}

impl WalkReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn bytes(&self) -> u64 {
        self.processed.iter().map(|r| r.bytes).sum()
    }
}

/// Encrypt every regular file under `source_dir` into `dest_dir`, appending
/// `.enc` to each file name.
pub fn walk_encrypt(
    source_dir: &Path,
    dest_dir: &Path,
    sealer: &dyn KeySealer,
    params: CipherParams,
    options: &WalkOptions,
) -> BitcryptResult<WalkReport> {
    info!(
        source = %source_dir.display(),
        dest = %dest_dir.display(),
        mode = params.mode.name(),
        key_size = params.key_size.bytes(),
        "encrypting tree"
    );
    walk(source_dir, dest_dir, options, encrypted_file_path, |src, dst| {
        encrypt_file(src, dst, sealer, params)
    })
}

/// Decrypt every regular file under `source_dir` into `dest_dir`, stripping
/// `.enc` where present. `dest_dir` may equal `source_dir`.
pub fn walk_decrypt(
    source_dir: &Path,
    dest_dir: &Path,
    unsealer: &dyn KeyUnsealer,
    options: &WalkOptions,
) -> BitcryptResult<WalkReport> {
    info!(
        source = %source_dir.display(),
        dest = %dest_dir.display(),
        "decrypting tree"
    );
    let decrypt_opts = DecryptOptions {
        restore_mtime: options.restore_mtime,
    };
    walk(source_dir, dest_dir, options, decrypted_file_path, |src, dst| {
        decrypt_file(src, dst, unsealer, &decrypt_opts)
    })
}

enum Entry {
    Dir { rel: PathBuf, source: PathBuf },
    File { rel: PathBuf, source: PathBuf },
}

enum Outcome {
    Done(FileReport),
    UpToDate,
    Failed(BitcryptError),
    NotStarted,
}

fn walk<N, F>(
    source_dir: &Path,
    dest_dir: &Path,
    options: &WalkOptions,
    rename: N,
    process: F,
) -> BitcryptResult<WalkReport>
where
    N: Fn(&Path) -> PathBuf,
    F: Fn(&Path, &Path) -> BitcryptResult<FileReport> + Sync,
{
    let mut report = WalkReport::default();

    create_mirror_dir(source_dir, dest_dir)?;
    let dest_canonical = std::fs::canonicalize(dest_dir).ok();

    let excludes: Vec<glob::Pattern> = options
        .exclude_patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = %p, "ignoring invalid exclude pattern: {e}");
                None
            }
        })
        .collect();
    let filter = Filter {
        markers: &options.skip_markers,
        excludes: &excludes,
        dest_canonical: dest_canonical.as_deref(),
    };

    let mut entries = Vec::new();
    collect_entries(source_dir, Path::new(""), &filter, &mut entries, &mut report.skipped)?;

    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
    // output path -> index into `files`
    let mut claimed: HashMap<PathBuf, usize> = HashMap::new();
    for entry in entries {
        match entry {
            Entry::Dir { rel, source } => match create_mirror_dir(&source, &dest_dir.join(&rel)) {
                Ok(true) => report.dirs_created += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %source.display(), "creating directory failed: {e}");
                    report.failures.push((source, e));
                }
            },
            Entry::File { rel, source } => {
                let dest = rename(&dest_dir.join(&rel));
                if let Some(&idx) = claimed.get(&dest) {
                    // a file decrypting onto itself yields to the suffixed container
                    let loser = if files[idx].0 == dest {
                        std::mem::replace(&mut files[idx].0, source)
                    } else {
                        source
                    };
                    warn!(
                        path = %loser.display(),
                        dest = %dest.display(),
                        "output path already claimed"
                    );
                    report.failures.push((loser, duplicate_dest(&dest)));
                    continue;
                }
                claimed.insert(dest.clone(), files.len());
                files.push((source, dest));
            }
        }
    }

    let total = files.len() as u64;
    let done = AtomicU64::new(0);
    let run = |(source, dest): &(PathBuf, PathBuf)| -> Outcome {
        if options.is_cancelled() {
            return Outcome::NotStarted;
        }
        let outcome = match process(source, dest) {
            Ok(file_report) => Outcome::Done(file_report),
            Err(e) if e.is_up_to_date() => Outcome::UpToDate,
            Err(e) => {
                warn!(path = %source.display(), "{e}");
                Outcome::Failed(e)
            }
        };
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(cb) = &options.progress {
            cb(n, total, &format!("[{n}/{total}] {}", source.display()));
        }
        outcome
    };

    let outcomes: Vec<Outcome> = if options.workers == 1 {
        files.iter().map(run).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .thread_name(|i| format!("bitcrypt-walk-{i}"))
            .build()
            .map_err(|e| BitcryptError::Other(e.into()))?;
        pool.install(|| files.par_iter().map(run).collect())
    };

    for ((source, _), outcome) in files.into_iter().zip(outcomes) {
        match outcome {
            Outcome::Done(file_report) => report.processed.push(file_report),
            Outcome::UpToDate => report.up_to_date += 1,
            Outcome::Failed(e) => report.failures.push((source, e)),
            Outcome::NotStarted => report.cancelled = true,
        }
    }
    if report.cancelled {
        warn!("walk cancelled before all entries were processed");
    }

    info!(
        processed = report.processed.len(),
        up_to_date = report.up_to_date,
        skipped = report.skipped,
        failed = report.failures.len(),
        bytes = report.bytes(),
        "walk complete"
    );
    Ok(report)
}

struct Filter<'a> {
    markers: &'a [String],
    excludes: &'a [glob::Pattern],
    dest_canonical: Option<&'a Path>,
}

impl Filter<'_> {
    fn has_marker(&self, rel: &Path) -> bool {
        rel.components().any(|c| match c {
            Component::Normal(name) => self.markers.iter().any(|m| name == m.as_str()),
            _ => false,
        })
    }

    fn excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|p| p.matches(name))
    }

    fn is_dest(&self, path: &Path) -> bool {
        match self.dest_canonical {
            Some(dest) => std::fs::canonicalize(path).is_ok_and(|p| p == dest),
            None => false,
        }
    }
}

fn collect_entries(
    dir: &Path,
    rel_dir: &Path,
    filter: &Filter<'_>,
    out: &mut Vec<Entry>,
    skipped: &mut usize,
) -> BitcryptResult<()> {
    let mut children = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let source = child.path();
        let rel = rel_dir.join(child.file_name());
        let file_type = child.file_type()?;

        if filter.has_marker(&rel) {
            debug!(path = %source.display(), "skip: version-control marker");
            *skipped += 1;
            continue;
        }
        let name = child.file_name();
        let name = name.to_string_lossy();
        if is_staging_name(&name) {
            debug!(path = %source.display(), "skip: leftover staging file");
            *skipped += 1;
            continue;
        }
        if filter.excluded(&name) {
            debug!(path = %source.display(), "skip: exclude pattern");
            *skipped += 1;
            continue;
        }

        if file_type.is_dir() {
            if filter.is_dest(&source) {
                debug!(path = %source.display(), "skip: destination tree");
                continue;
            }
            out.push(Entry::Dir {
                rel: rel.clone(),
                source: source.clone(),
            });
            collect_entries(&source, &rel, filter, out, skipped)?;
        } else if file_type.is_file() {
            out.push(Entry::File { rel, source });
        } else {
            debug!(path = %source.display(), "skip: not a regular file");
            *skipped += 1;
        }
    }
    Ok(())
}

fn duplicate_dest(dest: &Path) -> BitcryptError {
    BitcryptError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("output {} is produced by an earlier entry", dest.display()),
    ))
}

/// Create `dest` with the permission bits of `source`. Returns whether it
/// was newly created.
fn create_mirror_dir(source: &Path, dest: &Path) -> BitcryptResult<bool> {
    let mut builder = std::fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        builder.mode(std::fs::metadata(source)?.permissions().mode() & 0o7777);
    }
    #[cfg(not(unix))]
    let _ = source;

    match builder.create(dest) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dest.is_dir() => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            builder.recursive(true).create(dest)?;
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter<'a>(markers: &'a [String], excludes: &'a [glob::Pattern]) -> Filter<'a> {
        Filter {
            markers,
            excludes,
            dest_canonical: None,
        }
    }

    #[test]
    fn test_marker_matches_whole_components() {
        let markers = vec![".git".to_string(), ".svn".to_string()];
        let f = filter(&markers, &[]);

        assert!(f.has_marker(Path::new(".git")));
        assert!(f.has_marker(Path::new("src/.git/objects/ab")));
        assert!(f.has_marker(Path::new("vendor/.svn")));
        assert!(!f.has_marker(Path::new("src/.gitignore")));
        assert!(!f.has_marker(Path::new("my.git.notes")));
    }

    #[test]
    fn test_exclude_patterns_match_names() {
        let excludes = vec![
            glob::Pattern::new("*.tmp").unwrap(),
            glob::Pattern::new(".DS_Store").unwrap(),
        ];
        let f = filter(&[], &excludes);

        assert!(f.excluded("scratch.tmp"));
        assert!(f.excluded(".DS_Store"));
        assert!(!f.excluded("report.txt"));
    }

    #[test]
    fn test_collect_is_sorted_depth_first() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("b/inner")).unwrap();
        std::fs::write(root.join("c.txt"), b"c").unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("b/inner/z.txt"), b"z").unwrap();
        std::fs::write(root.join("b/y.txt"), b"y").unwrap();

        let markers = Vec::new();
        let mut entries = Vec::new();
        let mut skipped = 0;
        collect_entries(root, Path::new(""), &filter(&markers, &[]), &mut entries, &mut skipped)
            .unwrap();

        let order: Vec<String> = entries
            .iter()
            .map(|e| match e {
                Entry::Dir { rel, .. } => format!("{}/", rel.display()),
                Entry::File { rel, .. } => rel.display().to_string(),
            })
            .collect();
        assert_eq!(
            order,
            vec!["a.txt", "b/", "b/inner/", "b/inner/z.txt", "b/y.txt", "c.txt"]
        );
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_collect_skips_staging_leftovers() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        std::fs::write(tmp.path().join(".bitcrypt-Xy12Zw.tmp"), b"partial").unwrap();

        let mut entries = Vec::new();
        let mut skipped = 0;
        collect_entries(tmp.path(), Path::new(""), &filter(&[], &[]), &mut entries, &mut skipped)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_unreadable_root_fails_walk() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        let mut entries = Vec::new();
        let mut skipped = 0;
        let f = filter(&[], &[]);
        let err =
            collect_entries(&missing, Path::new(""), &f, &mut entries, &mut skipped).unwrap_err();
        assert!(matches!(err, BitcryptError::Io(_)));
    }

    #[test]
    fn test_mirror_dir_tolerates_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out");
        assert!(create_mirror_dir(tmp.path(), &dest).unwrap());
        assert!(!create_mirror_dir(tmp.path(), &dest).unwrap());
    }
}
