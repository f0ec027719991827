use clap::{command, Parser};
use codium::{fs::CodiumFsError, CodiumError};

mod api;
mod commit;
mod config;
mod init;
mod logs;
mod revert;
mod transport;

use config::Session;

/// codium is a snapshot based version control client.
#[derive(Parser)]
#[command(name = "codium")]
#[command(bin_name = "codium")]
enum CodiumCli {
    /// log in to a codium server, the token is kept in ~/.codiumrc.
    #[command(name = "login")]
    Login {
        /// account name, prompted when omitted
        #[clap(short, long)]
        username: Option<String>,
        /// account password, prompted when omitted
        #[clap(short, long)]
        password: Option<String>,
        /// api url to log in to and remember
        #[clap(long)]
        api_url: Option<String>,
    },
    /// init a repo in current dir and create it on the server.
    #[command(name = "init")]
    Init,
    /// add a file to the staging area.
    #[command(name = "add")]
    Add {
        /// the file to stage
        file: String,
    },
    /// record the staged files as a new commit.
    #[command(name = "commit")]
    Commit {
        /// commit message
        message: String,
    },
    /// upload local commits to object storage.
    #[command(name = "push")]
    Push,
    /// download remote commits into the local commit store.
    #[command(name = "pull")]
    Pull,
    /// restore the files of a local commit into the working directory.
    #[command(name = "revert")]
    Revert {
        /// the full commit id
        commit_id: String,
    },
    /// show local commits
    #[command(name = "log")]
    Log {
        /// skip commits
        #[clap(short, long)]
        skip: Option<usize>,
        /// limit commits that are shown
        #[clap(short, long)]
        limit: Option<usize>,
    },
}

pub async fn run() -> Result<(), CodiumError> {
    let cli = CodiumCli::parse();
    let session = Session::load().await?;
    let pwd = std::env::current_dir().map_err(CodiumFsError::Os)?;
    match cli {
        CodiumCli::Login {
            username,
            password,
            api_url,
        } => init::login(&session, username, password, api_url).await,
        CodiumCli::Init => init::init(&pwd, &session).await,
        CodiumCli::Add { file } => commit::add(&pwd, file).await,
        CodiumCli::Commit { message } => commit::commit(&pwd, message).await,
        CodiumCli::Push => transport::push(&pwd, &session).await,
        CodiumCli::Pull => transport::pull(&pwd, &session).await,
        CodiumCli::Revert { commit_id } => revert::revert(&pwd, commit_id).await,
        CodiumCli::Log { skip, limit } => logs::logs(&pwd, skip, limit).await,
    }
}
