// Reclaim - 备份文件名解析模块
// 识别 "<项目名> (overwritten at HHhMM).flp" 形式的自动备份文件名

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use std::time::SystemTime;

/// FL Studio 项目文件的默认扩展名
pub const DEFAULT_EXTENSION: &str = "flp";

/// 从文件名中解析出的备份信息（不含日期）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupName {
    /// 原始项目名（已去除首尾空白）
    pub project_name: String,

    /// 规范化后的项目键
    pub project_key: String,

    pub hour: u32,
    pub minute: u32,
}

/// 文件名解析结果：项目键和完整时间戳
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBackup {
    pub project_key: String,
    pub timestamp: NaiveDateTime,
}

/// 备份文件名解析器
///
/// 解析器只依赖输入，可以在多个工作线程之间共享引用并发调用。
#[derive(Debug, Clone)]
pub struct BackupNameParser {
    pattern: Regex,
    extension: String,
}

impl BackupNameParser {
    /// 为指定的项目文件扩展名（不带点）创建解析器
    pub fn new(extension: &str) -> Result<Self, regex::Error> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        let pattern = Regex::new(&format!(
            r"(?i)^(.+?)\s*\(overwritten at ([0-9]{{1,2}})h([0-9]{{2}})\)\.{}$",
            regex::escape(&extension)
        ))?;
        Ok(Self { pattern, extension })
    }

    /// 解析文件名中的备份标记
    ///
    /// 标记缺失、项目名为空或时分越界（小时 > 23、分钟 > 59）时返回 `None`。
    pub fn parse_name(&self, file_name: &str) -> Option<BackupName> {
        let captures = self.pattern.captures(file_name)?;

        let project_name = captures.get(1)?.as_str().trim().to_string();
        let project_key = normalize_key(&project_name);
        if project_key.is_empty() {
            return None;
        }

        let hour: u32 = captures.get(2)?.as_str().parse().ok()?;
        let minute: u32 = captures.get(3)?.as_str().parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }

        Some(BackupName {
            project_name,
            project_key,
            hour,
            minute,
        })
    }

    /// 解析文件名并结合文件修改日期得到完整时间戳
    ///
    /// 标记只包含时分，日期取自文件自身的修改时间（本地时区）。
    pub fn parse(&self, file_name: &str, modified: SystemTime) -> Option<ParsedBackup> {
        let name = self.parse_name(file_name)?;
        let timestamp = local_datetime(modified)
            .date()
            .and_hms_opt(name.hour, name.minute, 0)?;

        Some(ParsedBackup {
            project_key: name.project_key,
            timestamp,
        })
    }

    /// 文件名是否带有项目文件扩展名（大小写不敏感）
    pub fn has_extension(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(&self.extension),
            None => false,
        }
    }

    /// 去掉扩展名后的文件名，用于无标记备份的项目键
    pub fn stem<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        if !self.has_extension(file_name) {
            return None;
        }
        file_name.rsplit_once('.').map(|(stem, _)| stem)
    }
}

/// 规范化项目名：去除首尾空白、合并内部连续空白、转为小写
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 将系统时间转换为本地时区的日期时间
pub fn local_datetime(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}
