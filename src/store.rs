// Reclaim - 配置文件存储模块
// 负责管理用户扫描配置（Profile）的加载和保存

use crate::config::{Grouping, MatchMode};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 扫描配置文件（Profile）
///
/// 保存用户选择的驱动器/目录以及扫描和清理参数。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Profile {
    /// 要扫描的根目录
    pub roots: Vec<PathBuf>,

    /// 最大扫描深度
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// 工作线程数量（未设置时使用硬件并发数）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    #[serde(default)]
    pub match_mode: MatchMode,

    #[serde(default)]
    pub grouping: Grouping,

    /// 排除模式列表（Glob 风格）
    #[serde(default)]
    pub exclude: Vec<String>,

    /// 扫描完成后不经确认直接清理
    #[serde(default)]
    pub auto_clean: bool,
}

/// 应用程序全局配置
///
/// 包含所有用户定义的扫描配置文件，存储在系统标准配置目录中。
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// 配置文件集合，键为配置文件名称
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl AppConfig {
    /// 从默认位置加载应用配置，文件不存在时返回空配置
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// 保存配置到默认位置
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// 保存配置，如果配置目录不存在会自动创建
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).context("Failed to write config file")
    }

    /// 按名称排序的配置文件名列表
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    /// 获取配置文件的路径
    ///
    /// - Windows: `C:\Users\<用户>\AppData\Roaming\reclaim\config.toml`
    /// - macOS: `~/Library/Application Support/reclaim/config.toml`
    /// - Linux: `~/.config/reclaim/config.toml`
    fn get_config_path() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "reclaim").context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
