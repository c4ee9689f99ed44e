// Reclaim - FL Studio 项目备份清理工具
//
// 主程序入口，负责命令行参数解析和扫描/清理流程协调
//
// 功能特性：
// - 多线程扫描所有驱动器或指定目录中的自动备份文件
// - 按项目分组，每个项目只保留最新的备份
// - 试运行预览可释放的空间
// - 交互式配置管理：保存和管理扫描配置

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::{ProgressBar, ProgressStyle};
use reclaim::cli::{run_interactive_mode, SelectedProfile};
use reclaim::config::{Grouping, MatchMode, ScanConfig};
use reclaim::engine::{self, Decisions};
use reclaim::executor::{CleanupExecutor, CleanupOutcome};
use reclaim::logging;
use reclaim::model::{CleanupResult, ScanReport, ScanStatus};
use reclaim::retention;
use reclaim::store::AppConfig;
use reclaim::utils::{default_roots, format_bytes, format_duration, strip_verbatim_prefix};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// 子命令枚举
#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描并列出备份，不删除任何文件
    Scan(ScanArgs),

    /// 扫描后删除每个项目中除最新备份以外的所有备份
    Clean {
        #[command(flatten)]
        scan: ScanArgs,

        /// 不经确认直接删除
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

/// 扫描参数
#[derive(ClapArgs, Debug)]
struct ScanArgs {
    /// 要扫描的目录或驱动器（默认扫描所有驱动器）
    #[arg(value_name = "ROOT")]
    roots: Vec<PathBuf>,

    /// 使用已保存的配置文件
    #[arg(long, conflicts_with = "roots")]
    profile: Option<String>,

    /// 最大扫描深度
    #[arg(long)]
    max_depth: Option<usize>,

    /// 工作线程数量（默认为 CPU 核心数）
    #[arg(long)]
    threads: Option<usize>,

    /// 备份识别方式
    #[arg(long, value_enum)]
    mode: Option<MatchMode>,

    /// 按项目目录区分同名项目
    #[arg(long)]
    group_by_folder: bool,

    /// 排除模式（Glob 风格）
    #[arg(long)]
    exclude: Vec<String>,

    /// 跟随符号链接
    #[arg(long)]
    follow_symlinks: bool,

    /// 项目文件扩展名
    #[arg(long, default_value = "flp")]
    extension: String,
}

/// 命令行参数结构体
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 子命令（省略时进入交互模式）
    #[command(subcommand)]
    command: Option<Commands>,

    /// 试运行模式（只预览，不删除文件）
    #[arg(long, global = true)]
    dry_run: bool,

    /// 列出每个项目的全部备份并输出调试日志
    #[arg(long, short, global = true)]
    verbose: bool,
}

/// 程序入口
fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logger(args.verbose);

    match args.command {
        Some(Commands::Scan(ref scan)) => {
            let (config, _) = build_config(scan)?;
            let report = scan_with_progress(&config)?;
            let decisions = engine::compute_retention(&report);
            print_report(&report, &decisions, args.verbose);
        }
        Some(Commands::Clean { ref scan, yes }) => {
            let (config, auto_clean) = build_config(scan)?;
            run_clean(&config, yes || auto_clean, args.dry_run, args.verbose)?;
        }
        None => {
            if !Term::stdout().is_term() {
                anyhow::bail!("No command given; run `reclaim scan` or `reclaim clean`");
            }
            match run_interactive_mode()? {
                Some(SelectedProfile {
                    name,
                    config,
                    auto_clean,
                }) => {
                    println!("Using profile {}", style(&name).green());
                    run_clean(&config, auto_clean, args.dry_run, args.verbose)?;
                }
                None => return Ok(()),
            }
        }
    }
    Ok(())
}

/// 根据命令行参数（或已保存的配置文件）构建扫描配置
///
/// 返回扫描配置和配置文件中的自动清理开关。
fn build_config(args: &ScanArgs) -> Result<(ScanConfig, bool)> {
    let (mut config, auto_clean) = match &args.profile {
        Some(name) => {
            let app_config = AppConfig::load()?;
            let profile = app_config
                .profiles
                .get(name)
                .with_context(|| format!("Profile '{}' not found", name))?;
            (ScanConfig::from_profile(profile), profile.auto_clean)
        }
        None => {
            let roots = if args.roots.is_empty() {
                default_roots()
            } else {
                args.roots.clone()
            };
            (ScanConfig::new(roots), false)
        }
    };

    // 命令行参数覆盖配置文件中的值
    if args.max_depth.is_some() {
        config.max_depth = args.max_depth;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(mode) = args.mode {
        config.match_mode = mode;
    }
    if args.group_by_folder {
        config.grouping = Grouping::Folder;
    }
    config.exclude_patterns.extend(args.exclude.iter().cloned());
    config.follow_symlinks = args.follow_symlinks;
    config.extension = args.extension.clone();

    Ok((config, auto_clean))
}

/// 启动扫描并显示实时进度
fn scan_with_progress(config: &ScanConfig) -> Result<ScanReport> {
    println!(
        "{}",
        style(format!("Reclaim Backup Cleaner v{}", env!("CARGO_PKG_VERSION")))
            .cyan()
            .bold()
    );
    for root in &config.roots {
        println!("Root:   {:?}", style(root).blue());
    }
    println!("{}", style("----------------------------------------").dim());

    let start_time = Instant::now();
    let handle = engine::start_scan(config).context("Failed to start scan")?;

    // 第一次 Ctrl-C 取消扫描并保留已找到的结果，再按一次直接退出
    let token = handle.cancel_token();
    let handler_token = token.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        handler_token.cancel();
    }) {
        warn!("Could not install Ctrl-C handler: {}", err);
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    while !handle.is_finished() {
        let progress = handle.progress();
        spinner.set_message(format!(
            "{} folders, {} files checked, {} backups found",
            progress.directories, progress.files_scanned, progress.matched
        ));
        thread::sleep(Duration::from_millis(100));
    }
    let report = handle.wait();
    spinner.finish_and_clear();
    // 扫描结束后再按 Ctrl-C 直接退出
    token.cancel();

    println!(
        "Scan {} in {}",
        match report.status {
            ScanStatus::Completed => style("completed").green(),
            ScanStatus::Cancelled => style("cancelled").yellow(),
            ScanStatus::Running => style("running").dim(),
        },
        style(format_duration(start_time.elapsed().as_secs())).bold()
    );
    Ok(report)
}

/// 扫描、预览，经确认后删除旧备份
fn run_clean(config: &ScanConfig, skip_confirm: bool, dry_run: bool, verbose: bool) -> Result<()> {
    let report = scan_with_progress(config)?;
    let decisions = engine::compute_retention(&report);
    print_report(&report, &decisions, verbose);

    if report.status == ScanStatus::Cancelled {
        println!(
            "{} Scan was interrupted, no files were deleted.",
            style("Cancelled:").yellow()
        );
        return Ok(());
    }

    let preview = engine::preview_cleanup(&decisions);
    if preview.deleted_count == 0 {
        println!("{}", style("Nothing to clean.").green());
        return Ok(());
    }
    println!(
        "{} old backup(s) can be removed, freeing {}",
        style(preview.deleted_count).yellow(),
        style(format_bytes(preview.freed_bytes)).cyan()
    );

    if dry_run {
        println!("{} No files were deleted.", style("Dry run:").yellow());
        return Ok(());
    }

    if !skip_confirm
        && !Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Delete these backups? The newest backup of every project is kept.")
            .default(false)
            .interact()?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    let result = delete_with_progress(&decisions)?;
    print_cleanup(&result);
    Ok(())
}

fn delete_with_progress(decisions: &Decisions) -> Result<CleanupResult> {
    let delete_set = retention::delete_set(decisions);

    let bar = ProgressBar::new(delete_set.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let result = CleanupExecutor::new(false).execute_with_progress(&delete_set, |record, outcome| {
        if let CleanupOutcome::Failed(kind) = outcome {
            bar.println(format!(
                "{} {:?} - {}",
                style("Failed:").red(),
                strip_verbatim_prefix(&record.path),
                kind
            ));
        }
        bar.inc(1);
    });
    bar.finish_and_clear();
    Ok(result)
}

fn print_report(report: &ScanReport, decisions: &Decisions, verbose: bool) {
    println!("{}", style("----------------------------------------").dim());
    println!("Folders scanned:   {}", report.scanned_directory_count);
    println!("Backups found:     {}", report.matched_file_count);
    println!(
        "Backup size:       {}",
        format_bytes(report.total_bytes())
    );
    println!("Projects:          {}", report.project_count());
    println!(
        "With old backups:  {}",
        style(report.projects_with_multiple_backups()).yellow()
    );
    println!(
        "Reclaimable:       {}",
        style(format_bytes(retention::reclaimable_bytes(decisions))).cyan()
    );

    if !report.errors.is_empty() {
        println!(
            "Skipped entries:   {}",
            style(report.errors.len()).red()
        );
        let shown = if verbose { report.errors.len() } else { 10 };
        for err in report.errors.iter().take(shown) {
            println!(
                "  {} {:?} ({})",
                style("!").red(),
                strip_verbatim_prefix(&err.path),
                err.kind
            );
        }
        if report.errors.len() > shown {
            println!("  ... and {} more", report.errors.len() - shown);
        }
    }

    for (key, decision) in decisions {
        if decision.delete.is_empty() && !verbose {
            continue;
        }
        println!();
        println!(
            "{} {} ({} backup(s))",
            style("Project:").bold(),
            key,
            decision.delete.len() + 1
        );
        println!(
            "  {} {:?}",
            style("keep  ").green(),
            strip_verbatim_prefix(&decision.keep.path)
        );
        if verbose {
            for record in &decision.delete {
                println!(
                    "  {} {:?} ({})",
                    style("delete").red(),
                    strip_verbatim_prefix(&record.path),
                    format_bytes(record.size_bytes)
                );
            }
        } else if !decision.delete.is_empty() {
            println!(
                "  {} {} older backup(s), {}",
                style("delete").red(),
                decision.delete.len(),
                format_bytes(decision.reclaimable_bytes())
            );
        }
    }
}

fn print_cleanup(result: &CleanupResult) {
    println!("{}", style("----------------------------------------").dim());
    if result.failures.is_empty() {
        println!("{}", style("Cleanup Completed Successfully!").green().bold());
    } else {
        println!("{}", style("Cleanup finished with errors").yellow().bold());
    }
    println!("Deleted:           {}", style(result.deleted_count).green());
    println!("Failed:            {}", style(result.failures.len()).red().bold());
    println!(
        "Space freed:       {}",
        style(format_bytes(result.freed_bytes)).cyan()
    );
}
