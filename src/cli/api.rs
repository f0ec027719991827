use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use codium::{
    model::{
        CommitRecord, CreateRepositoryResponse, LoginRequest, LoginResponse, NewRepository,
        Repository,
    },
    sync::MetadataClient,
    CodiumError,
};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the codium API.
pub struct RemoteApi {
    client: Client,
    base_url: String,
}

impl RemoteApi {
    pub fn new(base_url: &str) -> Result<Self, CodiumError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CodiumError::RemoteFailure(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Turns non 2xx responses into errors, keeping the server's message.
    async fn check(response: Response) -> Result<Response, CodiumError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(CodiumError::NotAuthenticated);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Err(match status {
            StatusCode::BAD_REQUEST => CodiumError::Validation(message),
            StatusCode::FORBIDDEN => CodiumError::PermissionDenied(message),
            StatusCode::NOT_FOUND => CodiumError::RepositoryNotFound(message),
            _ => CodiumError::RemoteFailure(format!("{}: {}", status, message)),
        })
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, CodiumError> {
        let response = self
            .client
            .post(self.url("login"))
            .json(&LoginRequest {
                username: username.to_owned(),
                password: password.to_owned(),
            })
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(CodiumError::Validation(
                "invalid username or password".to_owned(),
            ));
        }
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn create_repository(
        &self,
        token: &str,
        new: &NewRepository,
    ) -> Result<CreateRepositoryResponse, CodiumError> {
        let response = self
            .client
            .post(self.url("repo/create"))
            .bearer_auth(token)
            .json(new)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl MetadataClient for RemoteApi {
    async fn register_commit(
        &self,
        token: &str,
        repository_id: &str,
        record: &CommitRecord,
    ) -> Result<CommitRecord, CodiumError> {
        let response = self
            .client
            .post(self.url(&format!("repo/{}/commit", repository_id)))
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn fetch_repository(&self, repository_id: &str) -> Result<Repository, CodiumError> {
        let response = self
            .client
            .get(self.url(&format!("repo/{}", repository_id)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
