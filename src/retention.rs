// Reclaim - 保留选择模块
// 为每个项目选出需要保留的最新备份，其余备份列入删除集合

use crate::model::{BackupRecord, ProjectGroup, RetentionDecision, ScanReport};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 备份的新旧顺序：越新越靠前
///
/// 依次比较时间戳（降序）、文件大小（降序）、路径（升序），
/// 保证相同输入总是得到相同顺序。
pub fn newest_first(a: &BackupRecord, b: &BackupRecord) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.size_bytes.cmp(&a.size_bytes))
        .then_with(|| a.path.cmp(&b.path))
}

/// 为单个项目分组计算保留决策
///
/// 空分组返回 `None`；只有一个备份的分组得到空的删除集合。
pub fn decide(group: &ProjectGroup) -> Option<RetentionDecision> {
    let mut records = group.records.clone();
    records.sort_by(newest_first);

    let mut records = records.into_iter();
    let keep = records.next()?;
    Some(RetentionDecision {
        keep,
        delete: records.collect(),
    })
}

/// 为扫描报告中的所有项目计算保留决策
///
/// 纯函数，不访问文件系统。
pub fn select(report: &ScanReport) -> BTreeMap<String, RetentionDecision> {
    report
        .groups
        .iter()
        .filter_map(|(key, group)| decide(group).map(|decision| (key.clone(), decision)))
        .collect()
}

/// 所有决策中需要删除的记录
pub fn delete_set(decisions: &BTreeMap<String, RetentionDecision>) -> Vec<BackupRecord> {
    decisions
        .values()
        .flat_map(|d| d.delete.iter().cloned())
        .collect()
}

/// 所有决策合计可释放的字节数
pub fn reclaimable_bytes(decisions: &BTreeMap<String, RetentionDecision>) -> u64 {
    decisions.values().map(RetentionDecision::reclaimable_bytes).sum()
}
