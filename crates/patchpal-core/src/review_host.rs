use anyhow::Result;
use async_trait::async_trait;
use patchpal_github::{GithubApiClient, PullRequest};

#[async_trait]
/// Source-control operations the dispatcher depends on.
pub trait ReviewHost: Send + Sync {
    async fn get_pull_request(&self, org: &str, repo: &str, number: u64) -> Result<PullRequest>;

    async fn get_pull_request_patch(&self, org: &str, repo: &str, number: u64) -> Result<Vec<u8>>;

    async fn create_comment(&self, org: &str, repo: &str, number: u64, body: &str) -> Result<()>;
}

#[async_trait]
impl ReviewHost for GithubApiClient {
    async fn get_pull_request(&self, org: &str, repo: &str, number: u64) -> Result<PullRequest> {
        GithubApiClient::get_pull_request(self, org, repo, number).await
    }

    async fn get_pull_request_patch(&self, org: &str, repo: &str, number: u64) -> Result<Vec<u8>> {
        GithubApiClient::get_pull_request_patch(self, org, repo, number).await
    }

    async fn create_comment(&self, org: &str, repo: &str, number: u64, body: &str) -> Result<()> {
        self.create_issue_comment(org, repo, number, body).await?;
        Ok(())
    }
}
