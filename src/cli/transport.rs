use std::path::Path;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use codium::{fs::Workspace, sync::Synchronizer, CodiumError};

use super::{api::RemoteApi, config::Session};

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.bold.green}    {wide_msg}") {
        pb.set_style(style.tick_chars("* "));
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb.set_message(message);
    pb
}

pub async fn push(pwd: &Path, session: &Session) -> Result<(), CodiumError> {
    let workspace = Workspace::try_open(pwd).await?;
    let config = workspace.read_config().await?;
    let token = session.token()?;
    let store = session.open_store().await?;
    let api = RemoteApi::new(&session.api_url)?;
    println!(
        "{} {}",
        "[+]".bright_green(),
        format!("Pushing to repository {}...", config.repository_id).bold()
    );
    let pb = spinner("Uploading pending commits...");
    let report = Synchronizer::new(&workspace, &store, &api)
        .push(&config.repository_id, Some(token))
        .await;
    pb.finish_and_clear();
    let report = report?;
    println!("{} {}", "[*]".bright_blue(), "Summary:".bold());
    for commit_id in &report.pushed {
        println!("  {} {}", ">>".bright_blue(), commit_id.dimmed());
    }
    println!(
        "Uploaded {} file(s), registered commit {} ({})",
        report.uploaded_files,
        report.registered.commit_id.green().bold(),
        report.registered.message
    );
    Ok(())
}

pub async fn pull(pwd: &Path, session: &Session) -> Result<(), CodiumError> {
    let workspace = Workspace::try_open(pwd).await?;
    let config = workspace.read_config().await?;
    let store = session.open_store().await?;
    let api = RemoteApi::new(&session.api_url)?;
    println!(
        "{} {}",
        "[+]".bright_green(),
        format!("Pulling from repository {}...", config.repository_id).bold()
    );
    let pb = spinner("Downloading remote commits...");
    let report = Synchronizer::new(&workspace, &store, &api)
        .pull(&config.repository_id)
        .await;
    pb.finish_and_clear();
    let report = report?;
    println!("{} {}", "[*]".bright_blue(), "Summary:".bold());
    for commit_id in &report.new_commits {
        println!("  {} {}", "<<".bright_yellow(), commit_id.dimmed());
    }
    println!(
        "Downloaded {} file(s), {} already up to date.",
        report.downloaded_files, report.up_to_date_files
    );
    if report.skipped_keys > 0 {
        println!(
            "{}",
            format!("Skipped {} unexpected object key(s).", report.skipped_keys).yellow()
        );
    }
    println!(
        "Pulled commits live in {}, use `codium revert <commitId>` to restore one.",
        workspace.commits_dir().display()
    );
    Ok(())
}
