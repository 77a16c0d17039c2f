use crate::cli::CollisionPolicy;
use crate::grouping::{DateGroups, DateKey};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Move {
        source: PathBuf,
        destination: PathBuf,
        /// Destination name was replaced by the source path hash.
        renamed: bool,
    },
    Skip {
        source: PathBuf,
        existing: PathBuf,
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Collision,
    AlreadyInPlace,
}

/// Everything that will happen inside one date directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePlan {
    pub key: DateKey,
    pub dir: PathBuf,
    pub actions: Vec<PlannedAction>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub moved: usize,
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Name used for a file whose plain name is already taken: the sha1 of the
/// full source path followed by the original extension.
pub fn hashed_name(source: &Path) -> String {
    let digest = Sha1::digest(source.to_string_lossy().as_bytes());
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("{}{}", hex::encode(digest), ext)
}

/// Decide where every file goes without touching the filesystem.
///
/// A destination counts as taken if it exists on disk or an earlier action in
/// this plan already targets it, so a dry run reports what a live run does.
pub fn plan_moves(
    groups: &DateGroups,
    output_dir: &Path,
    policy: CollisionPolicy,
) -> Vec<DatePlan> {
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut plans = Vec::with_capacity(groups.len());

    for group in groups.iter() {
        let dir = output_dir.join(group.key.as_str());
        let mut actions = Vec::with_capacity(group.files.len());

        for source in &group.files {
            let file_name = source.file_name().unwrap_or_default();
            let dest = dir.join(file_name);

            let action = if !dest.exists() && !claimed.contains(&dest) {
                PlannedAction::Move {
                    source: source.clone(),
                    destination: dest,
                    renamed: false,
                }
            } else if is_same_file(source, &dest) {
                PlannedAction::Skip {
                    source: source.clone(),
                    existing: dest,
                    reason: SkipReason::AlreadyInPlace,
                }
            } else {
                match policy {
                    CollisionPolicy::Skip => PlannedAction::Skip {
                        source: source.clone(),
                        existing: dest,
                        reason: SkipReason::Collision,
                    },
                    CollisionPolicy::Rename => PlannedAction::Move {
                        source: source.clone(),
                        destination: dir.join(hashed_name(source)),
                        renamed: true,
                    },
                }
            };

            if let PlannedAction::Move { destination, .. } = &action {
                claimed.insert(destination.clone());
            }
            actions.push(action);
        }

        plans.push(DatePlan {
            key: group.key.clone(),
            dir,
            actions,
        });
    }

    plans
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Carry out (or in dry-run mode, print) a plan.
/// Failing to create a date directory aborts the run; a failed move is
/// logged, counted and skipped.
pub fn execute_plan(plans: &[DatePlan], dry_run: bool) -> Result<TransferSummary> {
    let total: usize = plans.iter().map(|p| p.actions.len()).sum();
    let pb = if dry_run {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Moving {pos}/{len} {wide_bar} {msg}")?
            .progress_chars("=> "),
    );

    let mut summary = TransferSummary::default();

    for plan in plans {
        if dry_run {
            println!("{}", plan.dir.display());
        } else {
            pb.suspend(|| tracing::debug!("+ mkdir {}", plan.dir.display()));
            fs::create_dir_all(&plan.dir)
                .with_context(|| format!("Failed to create directory {}", plan.dir.display()))?;
        }

        for action in &plan.actions {
            match action {
                PlannedAction::Skip {
                    source,
                    existing,
                    reason,
                } => {
                    pb.suspend(|| match reason {
                        SkipReason::Collision => tracing::info!(
                            "Name {} already exists, leaving {} in place",
                            existing.display(),
                            source.display()
                        ),
                        SkipReason::AlreadyInPlace => tracing::debug!(
                            "{} is already in {}",
                            source.display(),
                            plan.dir.display()
                        ),
                    });
                    summary.skipped += 1;
                }
                PlannedAction::Move {
                    source,
                    destination,
                    renamed,
                } => {
                    if *renamed {
                        pb.suspend(|| {
                            tracing::info!(
                                "Name {} already exists in {}, renaming",
                                source.file_name().unwrap_or_default().to_string_lossy(),
                                plan.dir.display()
                            )
                        });
                    }

                    if dry_run {
                        println!("Will move {} to {}", source.display(), destination.display());
                    } else {
                        pb.set_message(format!("{}", plan.key));
                        pb.suspend(|| {
                            tracing::debug!("+ mv {} {}", source.display(), destination.display())
                        });
                        if let Err(e) = move_file(source, destination) {
                            pb.suspend(|| {
                                tracing::error!(
                                    "Failed to move {} to {}: {}",
                                    source.display(),
                                    destination.display(),
                                    e
                                )
                            });
                            summary.failed += 1;
                            pb.inc(1);
                            continue;
                        }
                    }

                    summary.moved += 1;
                    if *renamed {
                        summary.renamed += 1;
                    }
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    Ok(summary)
}

/// Rename, or copy and delete when rename fails (e.g. across filesystems).
fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    copy_then_remove(src, dest, |p| fs::remove_file(p))
}

/// On any failure the source stays the only copy.
fn copy_then_remove<F>(src: &Path, dest: &Path, remove_source: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let source_size = fs::metadata(src)?.len();
    fs::copy(src, dest)?;

    let dest_size = fs::metadata(dest)?.len();
    if dest_size != source_size {
        discard_copy(dest);
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "copy verification failed: source {} bytes, destination {} bytes",
                source_size, dest_size
            ),
        ));
    }

    // Preserve modified time
    if let Ok(mtime) = fs::metadata(src).and_then(|m| m.modified()) {
        let _ = fs::OpenOptions::new()
            .write(true)
            .open(dest)
            .and_then(|f| f.set_modified(mtime));
    }

    if let Err(e) = remove_source(src) {
        discard_copy(dest);
        return Err(e);
    }
    Ok(())
}

fn discard_copy(dest: &Path) {
    if let Err(e) = fs::remove_file(dest) {
        tracing::warn!("Could not remove partial copy {}: {}", dest.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn groups_of(entries: &[(&str, &PathBuf)]) -> DateGroups {
        let mut groups = DateGroups::new();
        for (key, path) in entries {
            let date = chrono::NaiveDate::parse_from_str(key, "%Y-%m-%d").ok();
            groups.insert(DateKey::from(date), path.to_path_buf());
        }
        groups
    }

    fn all_actions(plans: &[DatePlan]) -> Vec<&PlannedAction> {
        plans.iter().flat_map(|p| &p.actions).collect()
    }

    /// Two cameras both produced IMG_0001.jpg on the same day.
    fn same_name_fixture() -> (TempDir, PathBuf, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let cam_a = tmp.path().join("src").join("a");
        let cam_b = tmp.path().join("src").join("b");
        fs::create_dir_all(&cam_a).unwrap();
        fs::create_dir_all(&cam_b).unwrap();
        let first = cam_a.join("IMG_0001.jpg");
        let second = cam_b.join("IMG_0001.jpg");
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();
        let out = tmp.path().join("out");
        (tmp, first, second, out)
    }

    #[test]
    fn test_hashed_name() {
        // sha1("abc")
        assert_eq!(
            hashed_name(Path::new("abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );

        let name = hashed_name(Path::new("/photos/cam/IMG_0001.JPG"));
        assert_eq!(name.len(), 40 + ".JPG".len());
        assert!(name.ends_with(".JPG"));
        assert_eq!(name, hashed_name(Path::new("/photos/cam/IMG_0001.JPG")));
        assert_ne!(name, hashed_name(Path::new("/photos/other/IMG_0001.JPG")));
    }

    #[test]
    fn test_plan_without_collisions() {
        let (_tmp, first, _, out) = same_name_fixture();
        let groups = groups_of(&[("2020-09-21", &first)]);

        let plans = plan_moves(&groups, &out, CollisionPolicy::Rename);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].dir, out.join("2020_9_21"));
        assert_eq!(
            plans[0].actions,
            [PlannedAction::Move {
                source: first.clone(),
                destination: out.join("2020_9_21").join("IMG_0001.jpg"),
                renamed: false,
            }]
        );
    }

    #[test]
    fn test_rename_on_collision_within_run() {
        let (_tmp, first, second, out) = same_name_fixture();
        let groups = groups_of(&[("2020-09-21", &first), ("2020-09-21", &second)]);

        let plans = plan_moves(&groups, &out, CollisionPolicy::Rename);
        let dir = out.join("2020_9_21");
        assert_eq!(
            plans[0].actions[1],
            PlannedAction::Move {
                source: second.clone(),
                destination: dir.join(hashed_name(&second)),
                renamed: true,
            }
        );

        let summary = execute_plan(&plans, false).unwrap();
        assert_eq!(
            summary,
            TransferSummary {
                moved: 2,
                renamed: 1,
                skipped: 0,
                failed: 0
            }
        );
        assert_eq!(fs::read(dir.join("IMG_0001.jpg")).unwrap(), b"first");
        assert_eq!(fs::read(dir.join(hashed_name(&second))).unwrap(), b"second");
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn test_skip_on_collision_with_existing_file() {
        let (_tmp, first, _, out) = same_name_fixture();
        let dir = out.join("2020_9_21");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("IMG_0001.jpg"), b"already here").unwrap();

        let groups = groups_of(&[("2020-09-21", &first)]);
        let plans = plan_moves(&groups, &out, CollisionPolicy::Skip);
        assert_eq!(
            plans[0].actions,
            [PlannedAction::Skip {
                source: first.clone(),
                existing: dir.join("IMG_0001.jpg"),
                reason: SkipReason::Collision,
            }]
        );

        let summary = execute_plan(&plans, false).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.moved, 0);
        assert_eq!(fs::read(&first).unwrap(), b"first");
        assert_eq!(fs::read(dir.join("IMG_0001.jpg")).unwrap(), b"already here");
    }

    #[test]
    fn test_dry_run_is_repeatable_and_mutates_nothing() {
        let (_tmp, first, second, out) = same_name_fixture();
        let groups = groups_of(&[("2020-09-21", &first), ("", &second)]);

        let plan_a = plan_moves(&groups, &out, CollisionPolicy::Rename);
        let summary = execute_plan(&plan_a, true).unwrap();
        let plan_b = plan_moves(&groups, &out, CollisionPolicy::Rename);
        execute_plan(&plan_b, true).unwrap();

        assert_eq!(plan_a, plan_b);
        assert_eq!(summary.moved, 2);
        assert!(!out.exists());
        assert!(first.exists());
        assert!(second.exists());
    }

    #[test]
    fn test_every_file_gets_one_action() {
        let (_tmp, first, second, out) = same_name_fixture();
        let groups = groups_of(&[("2020-09-21", &first), ("2020-09-21", &second)]);

        let plans = plan_moves(&groups, &out, CollisionPolicy::Skip);
        let actions = all_actions(&plans);
        assert_eq!(actions.len(), groups.file_count());
        assert!(matches!(actions[0], PlannedAction::Move { .. }));
        assert!(matches!(
            actions[1],
            PlannedAction::Skip {
                reason: SkipReason::Collision,
                ..
            }
        ));
    }

    #[test]
    fn test_file_already_in_place_is_not_renamed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("2020_9_21");
        fs::create_dir_all(&dir).unwrap();
        let placed = dir.join("IMG_0001.jpg");
        fs::write(&placed, b"x").unwrap();

        let groups = groups_of(&[("2020-09-21", &placed)]);
        let plans = plan_moves(&groups, tmp.path(), CollisionPolicy::Rename);
        assert!(matches!(
            plans[0].actions[0],
            PlannedAction::Skip {
                reason: SkipReason::AlreadyInPlace,
                ..
            }
        ));
    }

    #[test]
    fn test_directory_creation_failure_is_fatal() {
        let (tmp, first, _, _) = same_name_fixture();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, b"file").unwrap();

        let groups = groups_of(&[("2020-09-21", &first)]);
        let plans = plan_moves(&groups, &blocker, CollisionPolicy::Rename);
        assert!(execute_plan(&plans, false).is_err());
        assert!(first.exists());
    }

    #[test]
    fn test_copy_fallback_keeps_source_when_remove_fails() {
        let (_tmp, first, _, out) = same_name_fixture();
        fs::create_dir_all(&out).unwrap();
        let dest = out.join("IMG_0001.jpg");

        let result = copy_then_remove(&first, &dest, |_| {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Operation not permitted",
            ))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&first).unwrap(), b"first");
        assert!(!dest.exists());
    }

    #[test]
    fn test_copy_fallback_moves_file() {
        let (_tmp, first, _, out) = same_name_fixture();
        fs::create_dir_all(&out).unwrap();
        let dest = out.join("IMG_0001.jpg");

        copy_then_remove(&first, &dest, |p| fs::remove_file(p)).unwrap();

        assert!(!first.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"first");
    }

    #[test]
    fn test_failed_move_continues_with_rest() {
        let (_tmp, first, second, out) = same_name_fixture();
        let groups = groups_of(&[("2020-09-21", &first), ("2019-01-05", &second)]);
        let plans = plan_moves(&groups, &out, CollisionPolicy::Rename);

        fs::remove_file(&first).unwrap();
        let summary = execute_plan(&plans, false).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.moved, 1);
        assert!(out.join("2019_1_5").join("IMG_0001.jpg").exists());
    }
}
