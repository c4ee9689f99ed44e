// Reclaim - 扫描配置模块
// 负责创建、校验单次扫描任务的配置

use crate::error::{EngineError, Result};
use crate::parser::{BackupNameParser, DEFAULT_EXTENSION};
use crate::store::Profile;
use crate::utils::non_overlapping_roots;
use clap::ValueEnum;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// 备份文件的识别方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// 任意位置上带有 "(overwritten at HHhMM)" 标记的项目文件
    #[default]
    Marker,

    /// 带标记且直接位于名为 "Backup" 的目录中
    BackupFolder,

    /// 位于 "Backup" 目录中（其父目录含有项目文件）的所有项目文件，
    /// 无标记的文件以文件名为项目键、以修改时间为时间戳
    BackupFolderLoose,
}

/// 项目分组范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Grouping {
    /// 只按项目名分组
    #[default]
    Name,

    /// 按项目目录 + 项目名分组，不同目录下的同名项目互不影响
    Folder,
}

/// 扫描配置
///
/// 所有参数都由调用方显式传入，引擎不读取任何全局状态。
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 扫描根目录（驱动器或用户选择的文件夹）
    pub roots: Vec<PathBuf>,

    /// 最大递归深度（`None` 表示不限制）
    pub max_depth: Option<usize>,

    /// 工作线程数量
    pub threads: usize,

    pub match_mode: MatchMode,

    pub grouping: Grouping,

    /// 项目文件扩展名（不带点）
    pub extension: String,

    /// 是否跟随符号链接
    pub follow_symlinks: bool,

    /// 排除模式列表（Glob 风格）
    pub exclude_patterns: Vec<String>,
}

impl ScanConfig {
    /// 使用默认参数为指定根目录创建扫描配置
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            max_depth: None,
            threads: default_threads(),
            match_mode: MatchMode::default(),
            grouping: Grouping::default(),
            extension: DEFAULT_EXTENSION.to_string(),
            follow_symlinks: false,
            exclude_patterns: Vec::new(),
        }
    }

    /// 从保存的配置文件（Profile）创建扫描配置
    pub fn from_profile(profile: &Profile) -> Self {
        let mut config = Self::new(profile.roots.clone());
        config.max_depth = profile.max_depth;
        if let Some(threads) = profile.threads {
            config.threads = threads;
        }
        config.match_mode = profile.match_mode;
        config.grouping = profile.grouping;
        config.exclude_patterns = profile.exclude.clone();
        config
    }

    /// 校验配置并准备扫描所需的编译结果
    ///
    /// 校验失败时返回 `InvalidConfiguration`，扫描不会启动。
    pub fn validate(&self) -> Result<ValidatedConfig> {
        if self.threads == 0 {
            return Err(EngineError::invalid("thread count must be at least 1"));
        }
        if self.roots.is_empty() {
            return Err(EngineError::invalid("no scan roots given"));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(EngineError::invalid("project file extension is empty"));
        }

        let mut roots = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let meta = fs::metadata(root).map_err(|e| {
                EngineError::invalid(format!("scan root {:?} is not readable: {}", root, e))
            })?;
            if !meta.is_dir() {
                return Err(EngineError::invalid(format!(
                    "scan root {:?} is not a directory",
                    root
                )));
            }
            fs::read_dir(root).map_err(|e| {
                EngineError::invalid(format!("scan root {:?} is not readable: {}", root, e))
            })?;
            let canonical = fs::canonicalize(root).map_err(|e| {
                EngineError::invalid(format!("scan root {:?} cannot be resolved: {}", root, e))
            })?;
            roots.push(canonical);
        }

        let exclude = self
            .exclude_patterns
            .iter()
            .map(|s| {
                Pattern::new(s).map_err(|e| {
                    EngineError::invalid(format!("invalid exclude pattern '{}': {}", s, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let parser = BackupNameParser::new(&self.extension).map_err(|e| {
            EngineError::invalid(format!("invalid extension '{}': {}", self.extension, e))
        })?;

        Ok(ValidatedConfig {
            roots: non_overlapping_roots(roots),
            max_depth: self.max_depth,
            threads: self.threads,
            match_mode: self.match_mode,
            grouping: self.grouping,
            follow_symlinks: self.follow_symlinks,
            exclude,
            parser,
        })
    }
}

/// 校验通过的扫描配置
///
/// 根目录已规范化且互不嵌套，排除模式和文件名解析器已编译。
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub roots: Vec<PathBuf>,
    pub max_depth: Option<usize>,
    pub threads: usize,
    pub match_mode: MatchMode,
    pub grouping: Grouping,
    pub follow_symlinks: bool,
    pub exclude: Vec<Pattern>,
    pub parser: BackupNameParser,
}

/// 默认线程数：可用的硬件并发数，至少为 1
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn zero_threads_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut config = ScanConfig::new(vec![dir.path().to_path_buf()]);
        config.threads = 0;

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn missing_root_is_refused() {
        let dir = TempDir::new().unwrap();
        let config = ScanConfig::new(vec![dir.path().join("missing")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_root_and_bad_pattern_are_refused() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("song.flp");
        fs::write(&file, b"x").unwrap();
        assert!(ScanConfig::new(vec![file]).validate().is_err());

        let mut config = ScanConfig::new(vec![dir.path().to_path_buf()]);
        config.exclude_patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_root_is_refused() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // root 用户不受权限位限制
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("skipped: permission bits are not enforced for this user");
            return;
        }

        let err = ScanConfig::new(vec![locked.clone()]).validate().unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert!(err.to_string().contains("is not readable"));
    }

    #[test]
    fn nested_roots_are_collapsed_after_canonicalising() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("inner");
        fs::create_dir(&inner).unwrap();

        let config = ScanConfig::new(vec![inner, dir.path().to_path_buf()]);
        let validated = config.validate().unwrap();

        assert_eq!(
            validated.roots,
            vec![fs::canonicalize(dir.path()).unwrap()]
        );
    }

    #[test]
    fn profile_values_are_carried_over() {
        let profile = Profile {
            roots: vec![PathBuf::from("/music")],
            max_depth: Some(6),
            threads: Some(3),
            match_mode: MatchMode::BackupFolder,
            grouping: Grouping::Folder,
            exclude: vec!["Samples".to_string()],
            auto_clean: true,
        };
        let config = ScanConfig::from_profile(&profile);

        assert_eq!(config.max_depth, Some(6));
        assert_eq!(config.threads, 3);
        assert_eq!(config.match_mode, MatchMode::BackupFolder);
        assert_eq!(config.grouping, Grouping::Folder);
        assert_eq!(config.exclude_patterns, vec!["Samples".to_string()]);
    }

    #[test]
    fn default_thread_count_is_positive() {
        assert!(default_threads() >= 1);
    }
}
