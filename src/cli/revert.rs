use std::path::Path;

use colored::Colorize;
use codium::{fs::Workspace, CodiumError};

pub async fn revert(pwd: &Path, commit_id: String) -> Result<(), CodiumError> {
    let workspace = Workspace::try_open(pwd).await?;
    let restored = workspace.revert(&commit_id).await?;
    for file in &restored {
        println!("  {} {}", "<<".bright_yellow(), file);
    }
    println!(
        "Reverted to commit {}, {} file(s) restored.",
        commit_id.green().bold(),
        restored.len()
    );
    Ok(())
}
