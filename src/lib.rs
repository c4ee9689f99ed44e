// Reclaim - FL Studio 项目备份清理工具
// 模块声明文件

/// 数据模型（备份记录、项目分组、扫描报告、清理结果）
pub mod model;

/// 错误分类和引擎错误
pub mod error;

/// 备份文件名解析模块
pub mod parser;

/// 目录遍历模块
pub mod walker;

/// 扫描协调模块（线程池、取消、进度）
pub mod scanner;

/// 保留选择模块（每个项目保留最新备份）
pub mod retention;

/// 清理执行器模块
pub mod executor;

/// 引擎对外接口
pub mod engine;

/// 扫描配置模块
pub mod config;

/// 配置文件存储模块
pub mod store;

/// 命令行交互界面模块
pub mod cli;

/// 日志初始化模块
pub mod logging;

/// 工具函数模块
pub mod utils;
