// Reclaim - 数据模型定义
// 定义扫描、保留选择和清理过程中使用的数据结构

use crate::error::ErrorKind;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 单个被发现的备份文件
///
/// 由扫描过程创建，创建后不再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// 文件的绝对路径
    pub path: PathBuf,

    /// 规范化后的项目标识（同一项目的所有备份共享此键）
    pub project_key: String,

    /// 备份时间（标记中的时分 + 文件修改日期，解析失败时使用修改时间）
    pub timestamp: NaiveDateTime,

    /// 扫描时的文件大小（字节）
    pub size_bytes: u64,

    /// 产生此记录的扫描根目录
    pub root: PathBuf,
}

/// 同一项目的所有备份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGroup {
    pub project_key: String,
    pub records: Vec<BackupRecord>,
}

impl ProjectGroup {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            records: Vec::new(),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.size_bytes).sum()
    }
}

/// 一个项目的保留决策：保留一个，删除其余
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionDecision {
    /// 需要保留的最新备份
    pub keep: BackupRecord,

    /// 需要删除的其余备份（可能为空）
    pub delete: Vec<BackupRecord>,
}

impl RetentionDecision {
    /// 删除后可释放的字节数
    pub fn reclaimable_bytes(&self) -> u64 {
        self.delete.iter().map(|r| r.size_bytes).sum()
    }
}

/// 扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Running,
    Completed,
    Cancelled,
}

/// 扫描过程中遇到的单个错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub path: PathBuf,
    pub kind: ErrorKind,
}

/// 一次扫描的汇总结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// 按项目键分组的备份，使用有序映射保证遍历顺序确定
    pub groups: BTreeMap<String, ProjectGroup>,

    /// 已访问的目录数
    pub scanned_directory_count: u64,

    /// 匹配到的备份文件数
    pub matched_file_count: u64,

    /// 遍历中遇到的错误
    pub errors: Vec<ScanError>,

    pub status: ScanStatus,
}

impl ScanReport {
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
            scanned_directory_count: 0,
            matched_file_count: 0,
            errors: Vec::new(),
            status: ScanStatus::Running,
        }
    }

    /// 将一条记录加入对应的项目分组
    pub fn insert(&mut self, record: BackupRecord) {
        self.matched_file_count += 1;
        self.groups
            .entry(record.project_key.clone())
            .or_insert_with(|| ProjectGroup::new(record.project_key.clone()))
            .records
            .push(record);
    }

    pub fn project_count(&self) -> usize {
        self.groups.len()
    }

    /// 拥有多个备份（即有可清理内容）的项目数
    pub fn projects_with_multiple_backups(&self) -> usize {
        self.groups.values().filter(|g| g.records.len() > 1).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.groups.values().map(ProjectGroup::total_bytes).sum()
    }

    pub fn is_finished(&self) -> bool {
        self.status != ScanStatus::Running
    }
}

impl Default for ScanReport {
    fn default() -> Self {
        Self::new()
    }
}

/// 无法删除的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub kind: ErrorKind,
}

/// 清理操作的统计结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    /// 释放的字节数（试运行时为预计释放的字节数）
    pub freed_bytes: u64,

    /// 删除的文件数
    pub deleted_count: u64,

    /// 删除失败的文件
    pub failures: Vec<CleanupFailure>,

    /// 是否为试运行结果
    pub dry_run: bool,
}

impl CleanupResult {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// 尝试处理的文件总数
    pub fn attempted(&self) -> u64 {
        self.deleted_count + self.failures.len() as u64
    }
}
