// Reclaim - 命令行交互界面模块
// 提供交互式命令行界面，用于选择和管理扫描配置文件

use anyhow::{Context, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::path::PathBuf;

use crate::config::{default_threads, Grouping, MatchMode, ScanConfig};
use crate::store::{AppConfig, Profile};
use crate::utils::default_roots;

/// 交互模式中选定的扫描任务
#[derive(Debug, Clone)]
pub struct SelectedProfile {
    pub name: String,
    pub config: ScanConfig,
    pub auto_clean: bool,
}

/// 运行交互式模式
///
/// 用户可以选择已保存的配置文件、创建新配置文件或删除配置文件。
/// 用户选择退出时返回 `Ok(None)`。
pub fn run_interactive_mode() -> Result<Option<SelectedProfile>> {
    let mut app_config = AppConfig::load()?;
    let theme = ColorfulTheme::default();

    println!(
        "{}",
        style(format!("Reclaim Backup Cleaner v{}", env!("CARGO_PKG_VERSION")))
            .cyan()
            .bold()
    );
    println!("{}", style("----------------------------------------").dim());

    loop {
        let profiles = app_config.profile_names();

        // 菜单中显示每个配置文件的扫描根目录和模式
        let mut choices: Vec<String> = profiles
            .iter()
            .map(|name| match app_config.profiles.get(name) {
                Some(profile) => format!(
                    "{} ({}) [{:?}{}]",
                    name,
                    describe_roots(&profile.roots),
                    profile.match_mode,
                    if profile.auto_clean { ", auto-clean" } else { "" }
                ),
                None => name.clone(),
            })
            .collect();

        let create_idx = choices.len();
        choices.push(">> Create New Profile".to_string());
        let delete_idx = if profiles.is_empty() {
            None
        } else {
            choices.push(">> Delete Profile".to_string());
            Some(choices.len() - 1)
        };
        choices.push(">> Exit".to_string());
        let exit_idx = choices.len() - 1;

        let selection = Select::with_theme(&theme)
            .with_prompt("Select a scan profile")
            .default(0)
            .items(&choices)
            .interact()?;

        if selection == exit_idx {
            return Ok(None);
        } else if selection == create_idx {
            create_new_profile(&mut app_config)?;
        } else if Some(selection) == delete_idx {
            delete_profile(&mut app_config)?;
        } else {
            // 前 profiles.len() 个选项与配置文件一一对应
            let name = &profiles[selection];
            let profile = app_config
                .profiles
                .get(name)
                .context("Selected profile no longer exists")?;

            return Ok(Some(SelectedProfile {
                name: name.clone(),
                config: ScanConfig::from_profile(profile),
                auto_clean: profile.auto_clean,
            }));
        }
    }
}

/// 引导用户输入参数创建新的配置文件并保存
fn create_new_profile(config: &mut AppConfig) -> Result<()> {
    let theme = ColorfulTheme::default();

    let name: String = Input::with_theme(&theme)
        .with_prompt("Profile Name")
        .interact_text()?;

    let suggested = default_roots()
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(";");
    let roots: String = Input::with_theme(&theme)
        .with_prompt("Folders or drives to scan (separated by ';')")
        .default(suggested)
        .interact_text()?;
    let roots: Vec<PathBuf> = roots
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();

    let depth: String = Input::with_theme(&theme)
        .with_prompt("Maximum scan depth (empty for unlimited)")
        .allow_empty(true)
        .interact_text()?;
    let max_depth = match depth.trim() {
        "" => None,
        value => Some(value.parse::<usize>().context("Depth must be a number")?),
    };

    let threads: usize = Input::with_theme(&theme)
        .with_prompt("Worker threads")
        .default(default_threads())
        .interact_text()?;

    let modes = [
        "Marker names anywhere",
        "Marker names inside 'Backup' folders",
        "Any project file inside 'Backup' folders",
    ];
    let mode = Select::with_theme(&theme)
        .with_prompt("Backup matching mode")
        .default(0)
        .items(&modes)
        .interact()?;
    let match_mode = match mode {
        1 => MatchMode::BackupFolder,
        2 => MatchMode::BackupFolderLoose,
        _ => MatchMode::Marker,
    };

    let by_folder = Confirm::with_theme(&theme)
        .with_prompt("Keep same-named projects in different folders apart?")
        .default(false)
        .interact()?;

    let auto_clean = Confirm::with_theme(&theme)
        .with_prompt("Delete old backups without asking after each scan?")
        .default(false)
        .interact()?;

    let profile = Profile {
        roots,
        max_depth,
        threads: Some(threads),
        match_mode,
        grouping: if by_folder {
            Grouping::Folder
        } else {
            Grouping::Name
        },
        exclude: vec![],
        auto_clean,
    };

    config.profiles.insert(name, profile);
    config.save()?;
    println!("Profile saved successfully!");
    Ok(())
}

/// 选择并删除一个配置文件
fn delete_profile(config: &mut AppConfig) -> Result<()> {
    let profiles = config.profile_names();
    if profiles.is_empty() {
        println!("{}", style("No profiles available to delete.").yellow());
        return Ok(());
    }

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a profile to DELETE")
        .items(&profiles)
        .interact()?;
    let profile_name = &profiles[selection];

    if Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Are you sure you want to delete profile '{}'?",
            style(profile_name).red().bold()
        ))
        .default(false)
        .interact()?
    {
        config.profiles.remove(profile_name);
        config.save()?;
        println!(
            "{} '{}' has been deleted.",
            style("Success:").green(),
            profile_name
        );
    } else {
        println!("Operation cancelled.");
    }

    Ok(())
}

/// 菜单中显示的根目录摘要
fn describe_roots(roots: &[PathBuf]) -> String {
    match roots {
        [] => "no folders".to_string(),
        [only] => only.to_string_lossy().to_string(),
        [first, rest @ ..] => format!("{} +{} more", first.to_string_lossy(), rest.len()),
    }
}
