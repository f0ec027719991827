use std::path::Path;

use colored::Colorize;
use codium::{fs::Workspace, CodiumError};

pub async fn add(pwd: &Path, file: String) -> Result<(), CodiumError> {
    let workspace = Workspace::try_open(pwd).await?;
    let name = workspace.stage(pwd.join(&file)).await?;
    println!("File {} added to staging area.", name.green());
    Ok(())
}

pub async fn commit(pwd: &Path, message: String) -> Result<(), CodiumError> {
    let workspace = Workspace::try_open(pwd).await?;
    let meta = workspace.commit(&message).await?;
    println!(
        "Committed {} file(s): {} ({})",
        meta.files.len(),
        meta.id[meta.id.len() - 9..].green().bold(),
        meta.id
    );
    Ok(())
}
