use std::path::Path;

use colored::Colorize;
use codium::{
    fs::{CodiumFsError, Workspace, REPO_DIR},
    model::{LocalConfig, NewRepository},
    CodiumError,
};
use dialoguer::{Input, Password};

use super::{
    api::RemoteApi,
    config::{get_global_config, global_config_path, set_global_config, Session},
};

fn prompt_error(err: dialoguer::Error) -> CodiumError {
    CodiumError::BadUsage(format!("could not read from the terminal: {}", err))
}

fn prompt_username() -> Result<String, CodiumError> {
    Input::<String>::new()
        .with_prompt("Enter your username")
        .interact_text()
        .map(|name| name.trim().to_owned())
        .map_err(prompt_error)
}

/// Reads the password from the terminal without echoing it.
fn prompt_password() -> Result<String, CodiumError> {
    Password::new()
        .with_prompt("Enter your password")
        .interact()
        .map_err(prompt_error)
}

pub async fn login(
    session: &Session,
    username: Option<String>,
    password: Option<String>,
    api_url: Option<String>,
) -> Result<(), CodiumError> {
    let username = match username {
        Some(username) => username,
        None => prompt_username()?,
    };
    let password = match password.or_else(|| std::env::var("CODIUM_PASSWORD").ok()) {
        Some(password) => password,
        None => prompt_password()?,
    };
    let api_url = api_url.unwrap_or_else(|| session.api_url.clone());
    println!("{} {}", "[+]".bright_green(), "Attempting to log in...".bold());
    let response = RemoteApi::new(&api_url)?
        .login(&username, &password)
        .await?;

    let mut config = get_global_config().await?;
    config.token = Some(response.token);
    config.api_url = Some(api_url);
    set_global_config(&config).await?;
    println!(
        "Logged in as {} ({}), token saved to {}",
        username.bright_blue(),
        response.user_id.dimmed(),
        global_config_path()?.display()
    );
    Ok(())
}

/// Creates the repository on the server first, so a failed request leaves no
/// local `.codiumGit` behind.
pub async fn init(pwd: &Path, session: &Session) -> Result<(), CodiumError> {
    if Workspace::is_workspace(pwd) {
        return Err(CodiumError::BadUsage(format!(
            "{} is already a codium repository",
            pwd.display()
        )));
    }
    let token = session.token()?;
    let name = pwd
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CodiumFsError::UnknownPath(pwd.display().to_string()))?
        .to_owned();
    println!(
        "{} {}",
        "[+]".bright_green(),
        format!("Creating repository {}...", name).bold()
    );
    let created = RemoteApi::new(&session.api_url)?
        .create_repository(
            token,
            &NewRepository {
                name,
                description: "Initialized from the command line".to_owned(),
                visibility: true,
            },
        )
        .await?;
    Workspace::create(
        pwd,
        &LocalConfig {
            repository_id: created.repository_id.clone(),
        },
    )
    .await?;
    println!(
        "Initialized empty codium repository in {} (repository {})",
        pwd.join(REPO_DIR).display(),
        created.repository_id.green().bold()
    );
    Ok(())
}
