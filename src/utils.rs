// Reclaim - 工具函数模块
// 提供路径处理、模式匹配、格式化等辅助功能

use glob::Pattern;
use std::path::{Path, PathBuf};

/// 获取默认的扫描根目录
///
/// * Windows：所有存在的驱动器 `A:\` 到 `Z:\`
/// * 其他平台：文件系统根目录 `/`
pub fn default_roots() -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .filter(|path| path.exists())
            .collect()
    }

    #[cfg(not(windows))]
    {
        vec![PathBuf::from("/")]
    }
}

/// 移除 Windows 逐字路径前缀 `\\?\`
///
/// `fs::canonicalize` 在 Windows 上返回逐字路径，显示给用户前去掉前缀。
pub fn strip_verbatim_prefix(path: &Path) -> PathBuf {
    let p = path.to_string_lossy();
    match p.strip_prefix(r"\\?\") {
        Some(stripped) => PathBuf::from(stripped),
        None => path.to_path_buf(),
    }
}

/// 去除相互嵌套的根目录，只保留最外层的目录
///
/// 如果 `/a` 和 `/a/b` 同时出现，只保留 `/a`，避免同一文件被扫描两次。
/// 结果按路径排序且去重。
pub fn non_overlapping_roots(mut roots: Vec<PathBuf>) -> Vec<PathBuf> {
    roots.sort();
    roots.dedup();

    let mut result: Vec<PathBuf> = Vec::new();
    for root in roots {
        // 排序后父目录总是排在子目录之前
        if !result.iter().any(|kept| root.starts_with(kept)) {
            result.push(root);
        }
    }
    result
}

/// 检查相对路径是否匹配任一排除模式
///
/// 模式既与完整相对路径匹配，也与最后一个路径组件匹配，
/// 因此 `node_modules` 可以排除任意层级下的同名目录。
pub fn matches_exclude_pattern(rel_path: &Path, patterns: &[Pattern]) -> bool {
    let path_str = rel_path.to_string_lossy();
    let name = rel_path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    patterns
        .iter()
        .any(|pattern| pattern.matches(&path_str) || pattern.matches(&name))
}

/// 格式化字节数为人类可读的单位
///
/// # 示例
/// ```
/// use reclaim::utils::format_bytes;
/// assert_eq!(format_bytes(500), "500 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// 格式化秒数为 "Xh Ym Zs" / "Xm Ys" / "Xs"
pub fn format_duration(secs: u64) -> String {
    let (hours, mins, secs) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
