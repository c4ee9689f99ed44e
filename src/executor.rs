// Reclaim - 清理执行器模块
// 严格按照调用方批准的删除集合删除备份文件，支持试运行

use crate::error::ErrorKind;
use crate::model::{BackupRecord, CleanupFailure, CleanupResult};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// 单个文件的处理结果，用于进度回调
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// 已删除（试运行时表示将被删除）
    Deleted,

    /// 删除失败
    Failed(ErrorKind),
}

/// 清理执行器
///
/// 执行器只处理传入的记录，不会自行从文件系统推断哪些文件是旧备份。
pub struct CleanupExecutor {
    /// 是否为试运行模式
    dry_run: bool,
}

impl CleanupExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// 删除给定的备份文件
    pub fn execute(&self, delete_set: &[BackupRecord]) -> CleanupResult {
        self.execute_with_progress(delete_set, |_, _| {})
    }

    /// 删除给定的备份文件，每处理一个文件调用一次 `on_item`
    ///
    /// 单个文件删除失败只会记录在 `failures` 中，其余文件照常处理。
    /// 试运行模式不触碰文件系统，只累计将要释放的空间。
    pub fn execute_with_progress<F>(&self, delete_set: &[BackupRecord], mut on_item: F) -> CleanupResult
    where
        F: FnMut(&BackupRecord, CleanupOutcome),
    {
        let mut result = CleanupResult::new(self.dry_run);
        let mut seen = HashSet::new();

        info!(
            "{} {} backup file(s)",
            if self.dry_run { "Previewing deletion of" } else { "Deleting" },
            delete_set.len()
        );

        for record in delete_set {
            if !seen.insert(record.path.as_path()) {
                debug!("Skipping duplicate entry {:?}", record.path);
                continue;
            }

            let outcome = match self.remove(&record.path) {
                Ok(()) => {
                    result.freed_bytes += record.size_bytes;
                    result.deleted_count += 1;
                    CleanupOutcome::Deleted
                }
                Err(kind) => {
                    warn!("Failed to delete {:?}: {}", record.path, kind);
                    result.failures.push(CleanupFailure {
                        path: record.path.clone(),
                        kind,
                    });
                    CleanupOutcome::Failed(kind)
                }
            };
            on_item(record, outcome);
        }

        info!(
            "Cleanup finished: {} deleted, {} failed, {} bytes freed",
            result.deleted_count,
            result.failures.len(),
            result.freed_bytes
        );
        result
    }

    fn remove(&self, path: &Path) -> Result<(), ErrorKind> {
        // 试运行模式不执行实际操作
        if self.dry_run {
            return Ok(());
        }
        fs::remove_file(path).map_err(|e| ErrorKind::from_io(&e))?;
        debug!("Deleted {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn record_for(path: PathBuf, size: u64) -> BackupRecord {
        BackupRecord {
            path,
            project_key: "song".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            size_bytes: size,
            root: PathBuf::from("/"),
        }
    }

    fn write_backups(dir: &TempDir, names: &[&str]) -> Vec<BackupRecord> {
        names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, b"0123456789").unwrap();
                record_for(path, 10)
            })
            .collect()
    }

    #[test]
    fn dry_run_leaves_files_in_place() {
        let dir = TempDir::new().unwrap();
        let records = write_backups(&dir, &["a.flp", "b.flp"]);

        let result = CleanupExecutor::new(true).execute(&records);

        assert!(result.dry_run);
        assert_eq!(result.freed_bytes, 20);
        assert_eq!(result.deleted_count, 2);
        assert!(records.iter().all(|r| r.path.exists()));
    }

    #[test]
    fn live_run_deletes_only_the_given_files() {
        let dir = TempDir::new().unwrap();
        let records = write_backups(&dir, &["a.flp", "b.flp", "keep.flp"]);

        let result = CleanupExecutor::new(false).execute(&records[..2]);

        assert_eq!(result.deleted_count, 2);
        assert_eq!(result.freed_bytes, 20);
        assert!(result.failures.is_empty());
        assert!(!records[0].path.exists());
        assert!(!records[1].path.exists());
        assert!(records[2].path.exists());
    }

    #[test]
    fn missing_file_is_recorded_and_others_still_deleted() {
        let dir = TempDir::new().unwrap();
        let mut records = write_backups(&dir, &["a.flp", "c.flp"]);
        records.insert(1, record_for(dir.path().join("gone.flp"), 10));

        let mut outcomes = Vec::new();
        let result = CleanupExecutor::new(false)
            .execute_with_progress(&records, |_, outcome| outcomes.push(outcome));

        assert_eq!(result.deleted_count, 2);
        assert_eq!(result.freed_bytes, 20);
        assert_eq!(
            result.failures,
            vec![CleanupFailure {
                path: dir.path().join("gone.flp"),
                kind: ErrorKind::FileAlreadyGone,
            }]
        );
        assert_eq!(result.attempted(), 3);
        assert_eq!(outcomes[1], CleanupOutcome::Failed(ErrorKind::FileAlreadyGone));
    }

    #[test]
    fn duplicate_entries_are_processed_once() {
        let dir = TempDir::new().unwrap();
        let records = write_backups(&dir, &["a.flp"]);
        let doubled = vec![records[0].clone(), records[0].clone()];

        let result = CleanupExecutor::new(false).execute(&doubled);

        assert_eq!(result.deleted_count, 1);
        assert!(result.failures.is_empty());
    }
}
