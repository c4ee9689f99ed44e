// Reclaim - 目录遍历模块
// 按深度限制递归遍历扫描根目录，产生目录、文件和错误事件

use crate::error::ErrorKind;
use crate::model::ScanError;
use crate::utils::matches_exclude_pattern;
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// 遍历选项
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// 最大递归深度（`None` 表示不限制）
    ///
    /// 深度 0 为起点目录本身，深度 1 为起点目录的直接子项。
    pub max_depth: Option<usize>,

    /// 是否跟随符号链接（跟随时会检测链接循环）
    pub follow_symlinks: bool,

    /// 排除模式（相对于扫描根目录匹配）
    pub exclude: Vec<Pattern>,
}

/// 遍历事件
#[derive(Debug)]
pub enum WalkEvent {
    /// 进入一个目录（在其内容之前产生）
    Dir { path: PathBuf, depth: usize },

    /// 一个普通文件
    File(DirEntry),

    /// 无法访问的条目，遍历会继续
    Error(ScanError),
}

/// 目录遍历器
///
/// 每一层的条目都按文件名排序，保证同一文件系统快照下的遍历顺序确定。
#[derive(Debug, Clone)]
pub struct Walker {
    /// 遍历起点
    start: PathBuf,

    /// 扫描根目录，排除模式相对于它匹配
    base: PathBuf,

    options: WalkOptions,
}

impl Walker {
    pub fn new(start: impl Into<PathBuf>, base: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            start: start.into(),
            base: base.into(),
            options,
        }
    }

    /// 返回惰性的遍历事件序列
    pub fn events(&self) -> impl Iterator<Item = WalkEvent> + '_ {
        let mut walk = WalkDir::new(&self.start)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = self.options.max_depth {
            walk = walk.max_depth(depth);
        }

        walk.into_iter()
            .filter_entry(move |e| !self.is_excluded(e))
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        Some(WalkEvent::Dir {
                            path: entry.path().to_path_buf(),
                            depth: entry.depth(),
                        })
                    } else if file_type.is_file() {
                        Some(WalkEvent::File(entry))
                    } else {
                        // 未跟随的符号链接和特殊文件不参与匹配
                        None
                    }
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.start.clone());
                    tracing::debug!("Skipping {:?}: {}", path, err);
                    Some(WalkEvent::Error(ScanError {
                        path,
                        kind: ErrorKind::from_walk(&err),
                    }))
                }
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if self.options.exclude.is_empty() || entry.depth() == 0 {
            return false;
        }
        match entry.path().strip_prefix(&self.base) {
            Ok(rel) => matches_exclude_pattern(rel, &self.options.exclude),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn file_names(walker: &Walker) -> Vec<String> {
        walker
            .events()
            .filter_map(|event| match event {
                WalkEvent::File(entry) => Some(entry.file_name().to_string_lossy().to_string()),
                _ => None,
            })
            .collect()
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b/deep/deeper")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("top.flp"), b"x").unwrap();
        fs::write(dir.path().join("b/two.flp"), b"x").unwrap();
        fs::write(dir.path().join("a/one.flp"), b"x").unwrap();
        fs::write(dir.path().join("b/deep/deeper/three.flp"), b"x").unwrap();
        dir
    }

    #[test]
    fn order_is_sorted_and_deterministic() {
        let dir = sample_tree();
        let walker = Walker::new(dir.path(), dir.path(), WalkOptions::default());

        let first = file_names(&walker);
        assert_eq!(first, vec!["one.flp", "three.flp", "two.flp", "top.flp"]);
        assert_eq!(first, file_names(&walker));
    }

    #[test]
    fn depth_limit_stops_descent() {
        let dir = sample_tree();
        let options = WalkOptions {
            max_depth: Some(2),
            ..WalkOptions::default()
        };
        let walker = Walker::new(dir.path(), dir.path(), options);

        assert_eq!(file_names(&walker), vec!["one.flp", "two.flp", "top.flp"]);
    }

    #[test]
    fn excluded_directories_are_not_descended() {
        let dir = sample_tree();
        let options = WalkOptions {
            exclude: vec![Pattern::new("b").unwrap()],
            ..WalkOptions::default()
        };
        let walker = Walker::new(dir.path(), dir.path(), options);

        assert_eq!(file_names(&walker), vec!["one.flp", "top.flp"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_are_reported_and_walk_terminates() {
        let dir = sample_tree();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("a/loop")).unwrap();

        let options = WalkOptions {
            follow_symlinks: true,
            ..WalkOptions::default()
        };
        let walker = Walker::new(dir.path(), dir.path(), options);
        let cycles = walker
            .events()
            .filter(|event| {
                matches!(
                    event,
                    WalkEvent::Error(ScanError {
                        kind: ErrorKind::SymlinkCycleDetected,
                        ..
                    })
                )
            })
            .count();

        assert_eq!(cycles, 1);
    }

    #[cfg(unix)]
    #[test]
    fn unfollowed_symlinks_are_ignored() {
        let dir = sample_tree();
        std::os::unix::fs::symlink(dir.path().join("top.flp"), dir.path().join("link.flp"))
            .unwrap();
        let walker = Walker::new(dir.path(), dir.path(), WalkOptions::default());

        assert!(!file_names(&walker).contains(&"link.flp".to_string()));
    }
}
