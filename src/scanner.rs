// Reclaim - 扫描协调模块
// 将扫描根目录拆分为工作单元，在固定大小的线程池中并行遍历，
// 由协调线程单线程合并各单元的结果并发布扫描报告

use crate::config::{Grouping, MatchMode, ValidatedConfig};
use crate::error::{EngineError, ErrorKind, Result};
use crate::model::{BackupRecord, ScanError, ScanReport, ScanStatus};
use crate::parser::{local_datetime, normalize_key};
use crate::utils::matches_exclude_pattern;
use crate::walker::{WalkEvent, WalkOptions, Walker};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::DirEntry;

/// 协作式取消令牌
///
/// 工作线程在每个目录边界检查一次，克隆后共享同一个标志。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 扫描进度快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    /// 已访问的目录数
    pub directories: u64,

    /// 已检查的文件数
    pub files_scanned: u64,

    /// 已匹配的备份文件数
    pub matched: u64,
}

#[derive(Debug, Default)]
struct ProgressCounters {
    directories: AtomicU64,
    files_scanned: AtomicU64,
    matched: AtomicU64,
}

impl ProgressCounters {
    fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            directories: self.directories.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::SeqCst),
        }
    }
}

/// 一个独立的遍历任务，完整地由一个工作线程处理
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// 所属的扫描根目录
    pub root: PathBuf,

    /// 遍历起点
    pub start: PathBuf,

    /// 相对于起点的最大深度
    pub max_depth: Option<usize>,

    /// 只处理起点目录中的文件，不计入子目录（子目录由其他单元处理）
    pub files_only: bool,
}

/// 单个工作单元的本地扫描结果
#[derive(Debug, Default)]
struct UnitFindings {
    records: Vec<BackupRecord>,
    errors: Vec<ScanError>,
    directories: u64,
}

/// 把扫描根目录拆分为工作单元
///
/// 根目录数量少于线程数时，把每个根目录拆为一个只处理顶层文件的单元
/// 加上每个顶层子目录各一个单元，以便大目录也能用满线程池。
pub fn plan_units(config: &ValidatedConfig) -> Vec<WorkUnit> {
    let split = config.roots.len() < config.threads && config.max_depth.map_or(true, |d| d >= 2);

    let mut units = Vec::new();
    for root in &config.roots {
        if split {
            if let Some(mut parts) = split_root(root, config) {
                units.append(&mut parts);
                continue;
            }
        }
        units.push(WorkUnit {
            root: root.clone(),
            start: root.clone(),
            max_depth: config.max_depth,
            files_only: false,
        });
    }
    units
}

fn split_root(root: &Path, config: &ValidatedConfig) -> Option<Vec<WorkUnit>> {
    let entries = fs::read_dir(root).ok()?;

    let mut subdirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| match entry.file_type() {
            Ok(ft) if ft.is_dir() => true,
            Ok(ft) if ft.is_symlink() => config.follow_symlinks && entry.path().is_dir(),
            _ => false,
        })
        .map(|entry| entry.path())
        .filter(|path| match path.strip_prefix(root) {
            Ok(rel) => !matches_exclude_pattern(rel, &config.exclude),
            Err(_) => true,
        })
        .collect();

    if subdirs.len() < 2 {
        return None;
    }
    subdirs.sort();

    let mut units = vec![WorkUnit {
        root: root.to_path_buf(),
        start: root.to_path_buf(),
        max_depth: Some(1),
        files_only: true,
    }];
    units.extend(subdirs.into_iter().map(|start| WorkUnit {
        root: root.to_path_buf(),
        start,
        max_depth: config.max_depth.map(|d| d - 1),
        files_only: false,
    }));
    Some(units)
}

/// 工作线程本地的备份文件匹配器
struct Matcher<'a> {
    config: &'a ValidatedConfig,

    /// 项目目录 -> 是否含有项目文件（仅 BackupFolderLoose 模式使用）
    project_dirs: HashMap<PathBuf, bool>,
}

impl<'a> Matcher<'a> {
    fn new(config: &'a ValidatedConfig) -> Self {
        Self {
            config,
            project_dirs: HashMap::new(),
        }
    }

    /// 判断文件是否为备份文件，是则生成备份记录
    fn match_entry(
        &mut self,
        entry: &DirEntry,
        root: &Path,
        errors: &mut Vec<ScanError>,
    ) -> Option<BackupRecord> {
        let config = self.config;
        let parser = &config.parser;
        let file_name = entry.file_name().to_str()?;
        if !parser.has_extension(file_name) {
            return None;
        }

        let parent = entry.path().parent()?;
        let in_backup_folder = parent
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case("backup"));

        let marked = parser.parse_name(file_name).is_some();
        let accepted = match config.match_mode {
            MatchMode::Marker => marked,
            MatchMode::BackupFolder => in_backup_folder && marked,
            MatchMode::BackupFolderLoose => {
                in_backup_folder
                    && parent
                        .parent()
                        .is_some_and(|project_dir| self.has_project_file(project_dir))
            }
        };
        if !accepted {
            return None;
        }

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                errors.push(ScanError {
                    path: entry.path().to_path_buf(),
                    kind: ErrorKind::from_walk(&err),
                });
                return None;
            }
        };
        let modified = match meta.modified() {
            Ok(time) => time,
            Err(err) => {
                errors.push(ScanError {
                    path: entry.path().to_path_buf(),
                    kind: ErrorKind::from_io(&err),
                });
                return None;
            }
        };

        let (name_key, timestamp) = match parser.parse(file_name, modified) {
            Some(parsed) => (parsed.project_key, parsed.timestamp),
            // 无标记的备份：文件名即项目名，修改时间即时间戳
            None => {
                let stem = parser.stem(file_name)?;
                let key = normalize_key(stem);
                if key.is_empty() {
                    return None;
                }
                (key, local_datetime(modified))
            }
        };

        let project_key = match config.grouping {
            Grouping::Name => name_key,
            Grouping::Folder => {
                let project_dir = if in_backup_folder {
                    parent.parent().unwrap_or(parent)
                } else {
                    parent
                };
                format!("{}#{}", project_dir.display(), name_key)
            }
        };

        // 跟随符号链接时同一文件可能经由不同路径到达，记录真实路径以便去重
        let path = if config.follow_symlinks {
            fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf())
        } else {
            entry.path().to_path_buf()
        };

        Some(BackupRecord {
            path,
            project_key,
            timestamp,
            size_bytes: meta.len(),
            root: root.to_path_buf(),
        })
    }

    fn has_project_file(&mut self, project_dir: &Path) -> bool {
        if let Some(&known) = self.project_dirs.get(project_dir) {
            return known;
        }
        let config = self.config;
        let parser = &config.parser;
        let found = fs::read_dir(project_dir)
            .map(|entries| {
                entries.filter_map(|e| e.ok()).any(|e| {
                    e.file_type().is_ok_and(|ft| ft.is_file())
                        && e.file_name().to_str().is_some_and(|n| parser.has_extension(n))
                })
            })
            .unwrap_or(false);
        self.project_dirs.insert(project_dir.to_path_buf(), found);
        found
    }
}

/// 在当前线程中处理一个工作单元
///
/// 单元开始时和每进入一个目录前调用 `cancelled`，返回真时立即结束并交回已收集的结果。
fn scan_unit<F>(
    unit: &WorkUnit,
    config: &ValidatedConfig,
    shared: &Shared,
    cancelled: F,
) -> UnitFindings
where
    F: Fn() -> bool,
{
    let mut findings = UnitFindings::default();
    if cancelled() {
        return findings;
    }
    let counters = &shared.counters;

    let options = WalkOptions {
        max_depth: unit.max_depth,
        follow_symlinks: config.follow_symlinks,
        exclude: config.exclude.clone(),
    };
    let walker = Walker::new(&unit.start, &unit.root, options);
    let mut matcher = Matcher::new(config);

    for event in walker.events() {
        match event {
            WalkEvent::Dir { depth, .. } => {
                if cancelled() {
                    debug!("Unit {:?} cancelled", unit.start);
                    break;
                }
                if unit.files_only && depth > 0 {
                    continue;
                }
                findings.directories += 1;
                counters.directories.fetch_add(1, Ordering::Relaxed);
            }
            WalkEvent::File(entry) => {
                counters.files_scanned.fetch_add(1, Ordering::Relaxed);
                let Some(record) = matcher.match_entry(&entry, &unit.root, &mut findings.errors)
                else {
                    continue;
                };
                // 同一文件可能经由符号链接被多个单元发现，只有第一个认领者计数
                if shared.claim(&record.path) {
                    findings.records.push(record);
                    counters.matched.fetch_add(1, Ordering::SeqCst);
                } else {
                    debug!("Already matched {:?}", record.path);
                }
            }
            WalkEvent::Error(err) => findings.errors.push(err),
        }
    }

    findings
}

/// 协调线程与调用方共享的状态
#[derive(Debug)]
struct Shared {
    cancel: CancelToken,
    counters: ProgressCounters,
    report: Mutex<ScanReport>,

    /// 已被某个单元认领的备份路径
    claimed: Mutex<HashSet<PathBuf>>,
}

impl Shared {
    fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            counters: ProgressCounters::default(),
            report: Mutex::new(ScanReport::new()),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// 首次认领该路径时返回真
    fn claim(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_path_buf())
    }

    fn lock_report(&self) -> MutexGuard<'_, ScanReport> {
        self.report.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 扫描句柄
///
/// 由 [`start`] 返回，用于观察进度、请求取消和获取报告。
#[derive(Debug)]
pub struct ScanHandle {
    shared: Arc<Shared>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl ScanHandle {
    /// 请求协作式取消
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    pub fn progress(&self) -> ScanProgress {
        self.shared.counters.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock_report().is_finished()
    }

    /// 当前报告的快照（扫描中为已合并的部分结果）
    pub fn report(&self) -> ScanReport {
        self.shared.lock_report().clone()
    }

    /// 阻塞等待扫描结束并返回最终报告
    pub fn wait(&self) -> ScanReport {
        let coordinator = self
            .coordinator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = coordinator {
            if handle.join().is_err() {
                error!("Scan coordinator panicked");
                let mut report = self.shared.lock_report();
                if report.status == ScanStatus::Running {
                    report.status = ScanStatus::Cancelled;
                }
            }
        }
        self.report()
    }
}

/// 启动一次扫描（非阻塞）
///
/// 线程池创建失败时返回 `PoolUnavailable`；其余错误都记录在报告中。
pub fn start(config: ValidatedConfig, cancel: CancelToken) -> Result<ScanHandle> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .thread_name(|i| format!("reclaim-scan-{}", i))
        .panic_handler(|_| error!("Scan worker panicked"))
        .build()
        .map_err(|e| EngineError::PoolUnavailable(e.to_string()))?;

    let units = plan_units(&config);
    info!(
        "Starting scan of {} root(s) with {} thread(s), {} work unit(s)",
        config.roots.len(),
        config.threads,
        units.len()
    );

    let shared = Arc::new(Shared::new(cancel));
    let config = Arc::new(config);
    let (tx, rx) = crossbeam_channel::unbounded::<(usize, UnitFindings)>();

    for (index, unit) in units.iter().cloned().enumerate() {
        let tx = tx.clone();
        let config = Arc::clone(&config);
        let shared = Arc::clone(&shared);
        pool.spawn(move || {
            debug!("Scanning unit {:?}", unit.start);
            let findings = scan_unit(&unit, &config, &shared, || shared.cancel.is_cancelled());
            // 接收端只会在所有单元结束后关闭
            let _ = tx.send((index, findings));
        });
    }
    drop(tx);

    let coordinator_shared = Arc::clone(&shared);
    let coordinator = thread::Builder::new()
        .name("reclaim-coordinator".to_string())
        .spawn(move || {
            let started = Instant::now();
            let mut finished = vec![false; units.len()];

            // 所有合并都发生在本线程，工作线程之间互不竞争
            for (index, findings) in rx {
                finished[index] = true;
                merge(&coordinator_shared, findings);
            }
            drop(pool);

            let mut report = coordinator_shared.lock_report();
            for (unit, done) in units.iter().zip(&finished) {
                if !done {
                    warn!("Work unit {:?} did not complete", unit.start);
                    report.errors.push(ScanError {
                        path: unit.start.clone(),
                        kind: ErrorKind::WorkerFailed,
                    });
                }
            }
            finalize(&mut report, coordinator_shared.cancel.is_cancelled());
            info!(
                "Scan {:?}: {} backup(s) in {} project(s), {} error(s) in {:.2}s",
                report.status,
                report.matched_file_count,
                report.groups.len(),
                report.errors.len(),
                started.elapsed().as_secs_f64()
            );
        })
        .map_err(|e| EngineError::PoolUnavailable(e.to_string()))?;

    Ok(ScanHandle {
        shared,
        coordinator: Mutex::new(Some(coordinator)),
    })
}

/// 把一个单元的结果并入共享报告
fn merge(shared: &Shared, findings: UnitFindings) {
    let mut report = shared.lock_report();
    report.scanned_directory_count += findings.directories;
    report.errors.extend(findings.errors);
    for record in findings.records {
        report.insert(record);
    }
}

/// 排序报告内容并设置最终状态，使结果与线程调度无关
fn finalize(report: &mut ScanReport, cancelled: bool) {
    report.errors.sort_by(|a, b| a.path.cmp(&b.path));
    for group in report.groups.values_mut() {
        group.records.sort_by(|a, b| a.path.cmp(&b.path));
    }
    report.status = if cancelled {
        ScanStatus::Cancelled
    } else {
        ScanStatus::Completed
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn validated(root: &Path, threads: usize) -> ValidatedConfig {
        let mut config = ScanConfig::new(vec![root.to_path_buf()]);
        config.threads = threads;
        config.validate().unwrap()
    }

    fn backup_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for project in ["Alpha", "Beta", "Gamma"] {
            let backup = dir.path().join(project).join("Backup");
            fs::create_dir_all(&backup).unwrap();
            fs::write(dir.path().join(project).join(format!("{}.flp", project)), b"p").unwrap();
            for time in ["10h00", "11h30"] {
                fs::write(
                    backup.join(format!("{} (overwritten at {}).flp", project, time)),
                    b"backup",
                )
                .unwrap();
            }
        }
        dir
    }

    #[test]
    fn large_roots_are_split_into_subdirectory_units() {
        let dir = backup_tree();
        let config = validated(dir.path(), 8);
        let units = plan_units(&config);

        assert_eq!(units.len(), 4);
        assert!(units[0].files_only);
        assert_eq!(units[0].max_depth, Some(1));
        assert!(units[1..].iter().all(|u| !u.files_only && u.root == config.roots[0]));
    }

    #[test]
    fn single_thread_keeps_one_unit_per_root() {
        let dir = backup_tree();
        let units = plan_units(&validated(dir.path(), 1));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].start, units[0].root);
    }

    #[test]
    fn split_and_unsplit_scans_agree() {
        let dir = backup_tree();

        let single = start(validated(dir.path(), 1), CancelToken::new())
            .unwrap()
            .wait();
        let parallel = start(validated(dir.path(), 4), CancelToken::new())
            .unwrap()
            .wait();

        assert_eq!(single.status, ScanStatus::Completed);
        assert_eq!(single.matched_file_count, 6);
        assert_eq!(single.groups, parallel.groups);
        assert_eq!(single.scanned_directory_count, parallel.scanned_directory_count);
        assert_eq!(single.scanned_directory_count, 7);
    }

    #[test]
    fn pre_cancelled_scan_reports_cancelled() {
        let dir = backup_tree();
        let token = CancelToken::new();
        token.cancel();

        let handle = start(validated(dir.path(), 2), token).unwrap();
        let report = handle.wait();

        assert_eq!(report.status, ScanStatus::Cancelled);
        assert_eq!(report.matched_file_count, handle.progress().matched);
    }

    #[test]
    fn cancelling_mid_unit_keeps_the_partial_findings() {
        let dir = backup_tree();
        let config = validated(dir.path(), 1);
        let unit = plan_units(&config).remove(0);
        let shared = Shared::new(CancelToken::new());

        // 检查点依次为：单元开始、根目录、Alpha、Alpha/Backup，第五次（Beta）时取消
        let checks = Cell::new(0);
        let findings = scan_unit(&unit, &config, &shared, || {
            checks.set(checks.get() + 1);
            checks.get() > 4
        });

        assert_eq!(findings.directories, 3);
        assert_eq!(findings.records.len(), 2);
        assert!(findings
            .records
            .iter()
            .all(|r| r.project_key == "alpha"));

        shared.cancel.cancel();
        merge(&shared, findings);
        let mut report = shared.lock_report();
        finalize(&mut report, shared.cancel.is_cancelled());

        assert_eq!(report.status, ScanStatus::Cancelled);
        assert_eq!(report.matched_file_count, 2);
        assert_eq!(report.scanned_directory_count, 3);
        let grouped: usize = report.groups.values().map(|g| g.records.len()).sum();
        assert_eq!(grouped, 2);
        assert_eq!(shared.counters.snapshot().matched, 2);
    }

    #[cfg(unix)]
    #[test]
    fn file_reached_through_a_symlink_is_counted_once() {
        let dir = TempDir::new().unwrap();
        let backup = dir.path().join("real").join("Backup");
        fs::create_dir_all(&backup).unwrap();
        fs::write(backup.join("Song (overwritten at 10h00).flp"), b"b").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        for threads in [1, 4] {
            let mut config = ScanConfig::new(vec![dir.path().to_path_buf()]);
            config.threads = threads;
            config.follow_symlinks = true;
            let handle = start(config.validate().unwrap(), CancelToken::new()).unwrap();
            let report = handle.wait();

            assert_eq!(report.matched_file_count, 1);
            assert_eq!(handle.progress().matched, 1);
            assert_eq!(report.groups["song"].records.len(), 1);
        }
    }

    #[test]
    fn backup_folder_mode_ignores_loose_marker_files() {
        let dir = backup_tree();
        fs::write(
            dir.path().join("Alpha").join("Alpha (overwritten at 09h00).flp"),
            b"x",
        )
        .unwrap();

        let mut config = ScanConfig::new(vec![dir.path().to_path_buf()]);
        config.threads = 2;
        let marker = start(config.validate().unwrap(), CancelToken::new())
            .unwrap()
            .wait();
        config.match_mode = MatchMode::BackupFolder;
        let folder = start(config.validate().unwrap(), CancelToken::new())
            .unwrap()
            .wait();

        assert_eq!(marker.matched_file_count, 7);
        assert_eq!(folder.matched_file_count, 6);
    }

    #[test]
    fn loose_mode_accepts_unmarked_files_next_to_a_project() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("Song");
        fs::create_dir_all(project.join("Backup")).unwrap();
        fs::write(project.join("Song.flp"), b"p").unwrap();
        fs::write(project.join("Backup").join("Song old.flp"), b"b").unwrap();
        fs::write(
            project.join("Backup").join("Song (overwritten at 08h15).flp"),
            b"b",
        )
        .unwrap();
        // 没有项目文件的 Backup 目录不参与
        fs::create_dir_all(dir.path().join("Other").join("Backup")).unwrap();
        fs::write(dir.path().join("Other").join("Backup").join("Other.flp"), b"b").unwrap();

        let mut config = ScanConfig::new(vec![dir.path().to_path_buf()]);
        config.threads = 1;
        config.match_mode = MatchMode::BackupFolderLoose;
        let report = start(config.validate().unwrap(), CancelToken::new())
            .unwrap()
            .wait();

        assert_eq!(report.matched_file_count, 2);
        assert!(report.groups.contains_key("song"));
        assert!(report.groups.contains_key("song old"));
    }

    #[test]
    fn folder_grouping_keeps_same_named_projects_apart() {
        let dir = TempDir::new().unwrap();
        for folder in ["One", "Two"] {
            let backup = dir.path().join(folder).join("Backup");
            fs::create_dir_all(&backup).unwrap();
            fs::write(backup.join("Demo (overwritten at 12h00).flp"), b"b").unwrap();
        }

        let mut config = ScanConfig::new(vec![dir.path().to_path_buf()]);
        config.threads = 2;
        let by_name = start(config.validate().unwrap(), CancelToken::new())
            .unwrap()
            .wait();
        config.grouping = Grouping::Folder;
        let by_folder = start(config.validate().unwrap(), CancelToken::new())
            .unwrap()
            .wait();

        assert_eq!(by_name.groups.len(), 1);
        assert_eq!(by_folder.groups.len(), 2);
        assert!(by_folder.groups.keys().all(|k| k.ends_with("#demo")));
    }
}
