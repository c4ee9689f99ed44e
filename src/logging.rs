// Reclaim - 日志模块
// 为命令行程序安装 tracing 订阅器，库代码本身只产生日志事件

use tracing_subscriber::EnvFilter;

/// 控制日志级别的环境变量
pub const LOG_ENV: &str = "RECLAIM_LOG";

/// 初始化日志输出到标准错误
///
/// 日志级别从 `RECLAIM_LOG` 读取（例如 `debug`、`reclaim=trace`），
/// 默认为 `warn`，避免干扰进度条。`verbose` 为真时默认级别提升为 `debug`。
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    // 重复初始化（例如测试中）时忽略错误
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
