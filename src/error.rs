// Reclaim - 错误类型模块
// 定义扫描和清理过程中的逐项错误分类，以及拒绝启动时返回的引擎错误

use std::fmt;
use std::io;
use thiserror::Error;

/// 逐项错误的分类
///
/// 扫描和清理过程中遇到的单个条目错误只会被记录，不会中断整个操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 没有权限访问目录或文件
    PermissionDenied,

    /// 其他 I/O 错误
    IoError,

    /// 跟随符号链接时检测到循环
    SymlinkCycleDetected,

    /// 文件在扫描之后已被外部删除
    FileAlreadyGone,

    /// 文件被其他进程占用
    FileLocked,

    /// 配置无效（线程数为 0、扫描根目录不可读等）
    InvalidConfiguration,

    /// 工作线程在处理某个扫描单元时崩溃
    WorkerFailed,
}

impl ErrorKind {
    /// 将 `std::io::Error` 映射为错误分类
    ///
    /// `NotFound` 只在清理阶段有意义（文件已被删除），扫描阶段同样归为此类。
    pub fn from_io(err: &io::Error) -> Self {
        if is_lock_violation(err) {
            return ErrorKind::FileLocked;
        }
        match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::FileAlreadyGone,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoError,
        }
    }

    /// 将 walkdir 的遍历错误映射为错误分类
    pub fn from_walk(err: &walkdir::Error) -> Self {
        if err.loop_ancestor().is_some() {
            return ErrorKind::SymlinkCycleDetected;
        }
        match err.io_error() {
            Some(io_err) => match io_err.kind() {
                io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                _ => ErrorKind::IoError,
            },
            None => ErrorKind::IoError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::IoError => "I/O error",
            ErrorKind::SymlinkCycleDetected => "symlink cycle detected",
            ErrorKind::FileAlreadyGone => "file already gone",
            ErrorKind::FileLocked => "file locked",
            ErrorKind::InvalidConfiguration => "invalid configuration",
            ErrorKind::WorkerFailed => "worker failed",
        };
        f.write_str(label)
    }
}

/// Windows 上文件被占用时返回共享冲突或锁冲突
#[cfg(windows)]
fn is_lock_violation(err: &io::Error) -> bool {
    use winapi::shared::winerror::{ERROR_LOCK_VIOLATION, ERROR_SHARING_VIOLATION};

    matches!(
        err.raw_os_error().map(|code| code as u32),
        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_lock_violation(_err: &io::Error) -> bool {
    false
}

/// 引擎拒绝启动某个操作时返回的错误
///
/// 只有操作开始前的校验失败才会以错误形式返回，
/// 运行过程中的逐项错误都记录在结果结构中。
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Worker pool unavailable: {0}")]
    PoolUnavailable(String),
}

impl EngineError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// 对应的错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            EngineError::PoolUnavailable(_) => ErrorKind::WorkerFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
