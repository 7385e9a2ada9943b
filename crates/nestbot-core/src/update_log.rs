use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::{fs, sync::Mutex};

use crate::{update::Update, Result};

/// Markdown journal of inbound updates, newest first.
///
/// Each entry is a `# <update_id> (<time>)` heading followed by the update as
/// pretty JSON. With a limit set, only the newest `limit` entries are kept.
pub struct UpdateLog {
    path: PathBuf,
    limit: Option<usize>,
    write_lock: Mutex<()>,
}

impl UpdateLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Keep at most `limit` entries; `0` means unbounded.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, update: &Update) -> Result<()> {
        let body = serde_json::to_string_pretty(update)?;
        let entry = format!(
            "# {} ({})\n\n{}\n\n",
            update.update_id,
            Utc::now().to_rfc3339(),
            body
        );

        let _guard = self.write_lock.lock().await;
        let existing = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let kept = match self.limit {
            Some(limit) => newest_entries(&existing, limit - 1),
            None => existing.as_str(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, entry + kept).await?;
        Ok(())
    }
}

/// Prefix of `log` holding its first `count` entries. Pretty JSON never puts
/// `#` in the first column, so every such line is a heading.
fn newest_entries(log: &str, count: usize) -> &str {
    let mut seen = 0;
    let mut offset = 0;
    for line in log.split_inclusive('\n') {
        if line.starts_with("# ") {
            if seen == count {
                return &log[..offset];
            }
            seen += 1;
        }
        offset += line.len();
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::fixtures::text_update;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_path() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir()
            .join(format!("nestbot-update-log-{}-{nanos}", std::process::id()))
            .join("logs.md")
    }

    #[tokio::test]
    async fn newest_entry_comes_first() {
        let log = UpdateLog::new(scratch_path());
        log.record(&text_update(1, 7, "first")).await.unwrap();
        log.record(&text_update(2, 7, "second")).await.unwrap();

        let contents = fs::read_to_string(log.path()).await.unwrap();
        let second = contents.find("# 2 (").unwrap();
        let first = contents.find("# 1 (").unwrap();
        assert!(second < first);
        assert!(contents.contains("\"text\": \"second\""));
        assert!(!contents.contains("```"));

        if let Some(dir) = log.path().parent() {
            let _ = fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn limit_drops_the_oldest_entries() {
        let log = UpdateLog::new(scratch_path()).with_limit(2);
        for id in 1..=4 {
            log.record(&text_update(id, 7, "hi")).await.unwrap();
        }

        let contents = fs::read_to_string(log.path()).await.unwrap();
        let headings: Vec<&str> = contents
            .lines()
            .filter(|l| l.starts_with("# "))
            .map(|l| l.split(' ').nth(1).unwrap_or_default())
            .collect();
        assert_eq!(headings, vec!["4", "3"]);

        if let Some(dir) = log.path().parent() {
            let _ = fs::remove_dir_all(dir).await;
        }
    }

    #[test]
    fn newest_entries_cuts_at_a_heading() {
        let log = "# 3 (t)\n\n{}\n\n# 2 (t)\n\n{}\n\n# 1 (t)\n\n{}\n\n";
        assert_eq!(newest_entries(log, 1), "# 3 (t)\n\n{}\n\n");
        assert_eq!(newest_entries(log, 0), "");
        assert_eq!(newest_entries(log, 5), log);
    }
}
