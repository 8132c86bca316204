//! Prompt 存储：按名称读取 `<prompts_dir>/<name>.md`，缺失时回退到编译期内置版本

use std::path::{Path, PathBuf};

use crate::core::AgentError;

const BUILTIN: [(&str, &str); 4] = [
    (
        "orchestrator_system",
        include_str!("../../config/prompts/orchestrator_system.md"),
    ),
    (
        "math_operator_system",
        include_str!("../../config/prompts/math_operator_system.md"),
    ),
    (
        "weather_operator_system",
        include_str!("../../config/prompts/weather_operator_system.md"),
    ),
    (
        "datetime_operator_system",
        include_str!("../../config/prompts/datetime_operator_system.md"),
    ),
];

#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "Prompts directory does not exist, using built-in prompts");
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 读取 Prompt；名称可带或不带 `.md`
    pub fn get(&self, name: &str) -> Result<String, AgentError> {
        let name = name.strip_suffix(".md").unwrap_or(name);
        let path = self.dir.join(format!("{name}.md"));
        if path.is_file() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                AgentError::PromptError(format!("reading {}: {}", path.display(), e))
            })?;
            tracing::debug!(prompt = name, path = %path.display(), "Loaded prompt from disk");
            return Ok(content.trim().to_string());
        }
        BUILTIN
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, text)| text.trim().to_string())
            .ok_or_else(|| AgentError::PromptError(format!("prompt not found: {}", path.display())))
    }

    /// 磁盘上可用的 Prompt 名称（不含扩展名，已排序）
    pub fn list_available(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("math_operator_system.md"), "  custom math\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = PromptStore::new(dir.path());
        assert_eq!(store.get("math_operator_system").unwrap(), "custom math");
        assert_eq!(store.get("math_operator_system.md").unwrap(), "custom math");
        assert!(store
            .get("orchestrator_system")
            .unwrap()
            .contains("ONE entity"));
        assert_eq!(store.list_available(), vec!["math_operator_system".to_string()]);
    }

    #[test]
    fn test_missing_prompt_is_error() {
        let store = PromptStore::new("/nonexistent/prompts");
        assert!(matches!(store.get("nope"), Err(AgentError::PromptError(_))));
        assert!(store.list_available().is_empty());
        assert!(store.get("weather_operator_system").is_ok());
    }
}
