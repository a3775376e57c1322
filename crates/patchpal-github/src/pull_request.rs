use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
/// Public struct `GithubUser` used across patchpal components.
pub struct GithubUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct GithubLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
/// Base or head branch of a pull request.
pub struct PullRequestBranch {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
/// The subset of a GitHub pull request the dispatcher reads.
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: GithubUser,
    #[serde(default)]
    pub base: PullRequestBranch,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    #[serde(default)]
    pub draft: bool,
    /// `None` while GitHub is still computing mergeability.
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl PullRequest {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|label| label.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
/// Public struct `GithubIssueComment` used across patchpal components.
pub struct GithubIssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub user: GithubUser,
    #[serde(default)]
    pub html_url: String,
}
