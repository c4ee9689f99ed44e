// Reclaim - 引擎接口模块
// 提供给图形界面、命令行等前端调用的扫描、保留选择和清理入口

use crate::config::ScanConfig;
use crate::error::Result;
use crate::executor::CleanupExecutor;
use crate::model::{CleanupResult, RetentionDecision, ScanReport};
use crate::retention;
use crate::scanner::{self, CancelToken, ScanHandle};
use std::collections::BTreeMap;

/// 项目键 -> 保留决策
pub type Decisions = BTreeMap<String, RetentionDecision>;

/// 校验配置并在后台启动扫描，立即返回扫描句柄
pub fn start_scan(config: &ScanConfig) -> Result<ScanHandle> {
    start_scan_with_token(config, CancelToken::new())
}

/// 与 [`start_scan`] 相同，但使用调用方提供的取消令牌
pub fn start_scan_with_token(config: &ScanConfig, cancel: CancelToken) -> Result<ScanHandle> {
    let validated = config.validate()?;
    scanner::start(validated, cancel)
}

/// 启动扫描并阻塞等待其结束
pub fn run_scan(config: &ScanConfig) -> Result<ScanReport> {
    Ok(start_scan(config)?.wait())
}

/// 请求协作式取消
pub fn cancel_scan(handle: &ScanHandle) {
    handle.cancel();
}

/// 当前或最终的扫描报告
pub fn get_report(handle: &ScanHandle) -> ScanReport {
    handle.report()
}

pub fn compute_retention(report: &ScanReport) -> Decisions {
    retention::select(report)
}

/// 试运行清理：计算可释放的空间，不修改文件系统
pub fn preview_cleanup(decisions: &Decisions) -> CleanupResult {
    CleanupExecutor::new(true).execute(&retention::delete_set(decisions))
}

/// 删除所有决策中的待删除文件
pub fn execute_cleanup(decisions: &Decisions) -> CleanupResult {
    CleanupExecutor::new(false).execute(&retention::delete_set(decisions))
}
