use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;
use crate::review_host::ReviewHost;

pub const DEFAULT_PATCH_RETRY_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_PATCH_RETRY_MAX_ATTEMPTS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Retry policy for patches that are not materialized yet.
pub struct ArtifactFetchPolicy {
    pub backoff: Duration,
    pub max_attempts: u32,
}

impl Default for ArtifactFetchPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(DEFAULT_PATCH_RETRY_BACKOFF_MS),
            max_attempts: DEFAULT_PATCH_RETRY_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactFetcher {
    policy: ArtifactFetchPolicy,
}

impl ArtifactFetcher {
    pub fn new(policy: ArtifactFetchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ArtifactFetchPolicy {
        self.policy
    }

    /// Fetch the pull request patch, retrying while the host answers with JSON.
    ///
    /// Right after a pull request is opened the patch endpoint can return the
    /// pull request document instead of the diff. A response whose first byte
    /// is `{` is treated as "not ready yet".
    pub async fn fetch(
        &self,
        host: &dyn ReviewHost,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);
            let patch = host
                .get_pull_request_patch(org, repo, number)
                .await
                .map_err(FetchError::Host)?;
            if patch.first() != Some(&b'{') {
                return Ok(patch);
            }
            if attempt >= max_attempts {
                return Err(FetchError::NotReady { attempts: attempt });
            }
            debug!(
                org,
                repo,
                number,
                attempt,
                backoff_ms = self.policy.backoff.as_millis() as u64,
                "pull request patch not ready; retrying"
            );
            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use patchpal_github::PullRequest;
    use tokio::sync::Mutex as AsyncMutex;

    use super::{ArtifactFetchPolicy, ArtifactFetcher};
    use crate::error::FetchError;
    use crate::review_host::ReviewHost;

    struct ScriptedPatchHost {
        patches: AsyncMutex<VecDeque<Result<Vec<u8>>>>,
        calls: AsyncMutex<usize>,
    }

    impl ScriptedPatchHost {
        fn new(patches: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                patches: AsyncMutex::new(patches.into()),
                calls: AsyncMutex::new(0),
            }
        }

        async fn calls(&self) -> usize {
            *self.calls.lock().await
        }
    }

    #[async_trait]
    impl ReviewHost for ScriptedPatchHost {
        async fn get_pull_request(&self, _: &str, _: &str, _: u64) -> Result<PullRequest> {
            Err(anyhow!("not scripted"))
        }

        async fn get_pull_request_patch(&self, _: &str, _: &str, _: u64) -> Result<Vec<u8>> {
            *self.calls.lock().await += 1;
            self.patches
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(b"{\"number\":1}".to_vec()))
        }

        async fn create_comment(&self, _: &str, _: &str, _: u64, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn fast_fetcher(max_attempts: u32) -> ArtifactFetcher {
        ArtifactFetcher::new(ArtifactFetchPolicy {
            backoff: Duration::from_millis(1),
            max_attempts,
        })
    }

    #[test]
    fn unit_default_policy_uses_five_second_backoff() {
        let policy = ArtifactFetchPolicy::default();
        assert_eq!(policy.backoff, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 12);
    }

    #[tokio::test]
    async fn functional_fetch_retries_while_payload_is_json() {
        let host = ScriptedPatchHost::new(vec![
            Ok(b"{\"number\":1}".to_vec()),
            Ok(b"{}".to_vec()),
            Ok(b"diff --git a/x b/x\n".to_vec()),
        ]);
        let patch = fast_fetcher(5)
            .fetch(&host, "acme", "widget", 1)
            .await
            .expect("patch");
        assert_eq!(patch, b"diff --git a/x b/x\n".to_vec());
        assert_eq!(host.calls().await, 3);
    }

    #[tokio::test]
    async fn functional_fetch_returns_first_non_json_payload_unchanged() {
        let host = ScriptedPatchHost::new(vec![Ok(b" {leading space}".to_vec())]);
        let patch = fast_fetcher(5)
            .fetch(&host, "acme", "widget", 1)
            .await
            .expect("patch");
        assert_eq!(patch, b" {leading space}".to_vec());
        assert_eq!(host.calls().await, 1);
    }

    #[tokio::test]
    async fn regression_fetch_gives_up_after_max_attempts() {
        let host = ScriptedPatchHost::new(Vec::new());
        let error = fast_fetcher(3)
            .fetch(&host, "acme", "widget", 1)
            .await
            .expect_err("never ready");
        assert!(matches!(error, FetchError::NotReady { attempts: 3 }));
        assert_eq!(host.calls().await, 3);
    }

    #[tokio::test]
    async fn regression_fetch_surfaces_host_failures_without_retry() {
        let host = ScriptedPatchHost::new(vec![Err(anyhow!("502 bad gateway"))]);
        let error = fast_fetcher(3)
            .fetch(&host, "acme", "widget", 1)
            .await
            .expect_err("host failure");
        assert!(matches!(error, FetchError::Host(_)));
        assert_eq!(host.calls().await, 1);
    }
}
