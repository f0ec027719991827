use std::path::Path;

use colored::Colorize;
use codium::{fs::Workspace, CodiumError};

pub async fn logs(
    pwd: &Path,
    skip: Option<usize>,
    limit: Option<usize>,
) -> Result<(), CodiumError> {
    let workspace = Workspace::try_open(pwd).await?;
    let skip = skip.unwrap_or(0);
    let limit = limit.unwrap_or(10);
    let ledger = workspace.read_ledger().await?;
    let mut ids = workspace.commit_ids().await?;
    ids.reverse();
    let latest = ids.first().cloned().unwrap_or_default();
    for id in ids.iter().skip(skip).take(limit) {
        let meta = workspace.read_commit_meta(id).await?;
        let cursor = format!(
            "{}{}",
            if &latest == id {
                "[LATEST]".bright_blue().bold()
            } else {
                "".clear()
            },
            if ledger.contains(id) {
                "[PUSHED]".bright_green().bold()
            } else {
                "".clear()
            }
        );
        let (date, message, files) = match meta {
            Some(meta) => (
                meta.timestamp.naive_local().to_string(),
                meta.message,
                meta.files.len(),
            ),
            None => ("unknown".to_owned(), String::new(), 0),
        };
        println!(
            "Commit {} ({}) {}\nAt: {} Files: {}\nMessage: {}\n",
            &id[id.len().saturating_sub(9)..].bold(),
            id.dimmed(),
            cursor,
            date.yellow(),
            files,
            message
        );
    }
    Ok(())
}
