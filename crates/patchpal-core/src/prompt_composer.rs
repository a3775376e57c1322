use crate::tasks::TaskConfig;

pub const DEFAULT_MAX_PATCH_BYTES: usize = 64 * 1024;
const EXTERNAL_CONTEXTS_HEADER: &str = "Here are some context contents:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reasons composition stops before the backend is called.
pub enum ComposeSkip {
    ArtifactTooLarge { artifact_bytes: usize, limit_bytes: usize },
}

impl ComposeSkip {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ArtifactTooLarge { .. } => "task_skipped_patch_too_large",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptComposer {
    max_artifact_bytes: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PATCH_BYTES)
    }
}

impl PromptComposer {
    pub fn new(max_artifact_bytes: usize) -> Self {
        Self { max_artifact_bytes }
    }

    pub fn max_artifact_bytes(&self) -> usize {
        self.max_artifact_bytes
    }

    pub fn check_artifact(&self, artifact: &[u8]) -> Result<(), ComposeSkip> {
        if artifact.len() > self.max_artifact_bytes {
            return Err(ComposeSkip::ArtifactTooLarge {
                artifact_bytes: artifact.len(),
                limit_bytes: self.max_artifact_bytes,
            });
        }
        Ok(())
    }

    /// Build the user message for `task`.
    ///
    /// Sections, in order: the task prompt, resolved external contexts, the
    /// pull request title and description, the patch introduction and the
    /// patch itself in a `diff` fence.
    pub fn compose(
        &self,
        task: &TaskConfig,
        title: &str,
        body: &str,
        artifact: &[u8],
        external_contexts: &[String],
    ) -> Result<String, ComposeSkip> {
        self.check_artifact(artifact)?;

        let mut lines = vec![task.user_prompt.clone(), String::new()];
        if !external_contexts.is_empty() {
            lines.push(EXTERNAL_CONTEXTS_HEADER.to_string());
            lines.extend(external_contexts.iter().map(|context| format!("- {context}")));
            lines.push(String::new());
        }
        lines.push("This is the pull request title:".to_string());
        lines.push(fenced("", title));
        lines.push(String::new());
        lines.push("This is the pull request description:".to_string());
        lines.push(fenced("", body));
        lines.push(String::new());
        lines.push(task.patch_introduce_prompt.clone());
        lines.push(fenced("diff", &String::from_utf8_lossy(artifact)));
        Ok(lines.join("\n"))
    }
}

fn fenced(language: &str, content: &str) -> String {
    format!("```{language}\n{}\n```", content.trim_end_matches('\n'))
}
