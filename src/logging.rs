//! Rotating, gzip-archiving debug logger, gated by the `-debug` flag
//! rather than an env var. Adapted from the teacher's
//! `RotatingLogger`/`EnhancedDebugLogger`, trimmed to the events this
//! engine actually emits.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use fs2::FileExt;
use regex::Regex;
use uuid::Uuid;

const LOG_ROTATION_SIZE_MB: u64 = 8;
const MAX_ARCHIVES: u32 = 5;
const ROTATION_CHECK_INTERVAL: u32 = 200;

struct RotatingLogger {
    log_path: PathBuf,
    write_count: AtomicU32,
}

impl RotatingLogger {
    fn new(log_path: PathBuf) -> Self {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self {
            log_path,
            write_count: AtomicU32::new(0),
        }
    }

    fn write_with_rotation(&self, line: &str) -> std::io::Result<()> {
        if self.write_count.fetch_add(1, Ordering::Relaxed) % ROTATION_CHECK_INTERVAL == 0 {
            let _ = self.rotate_if_needed();
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        writeln!(file, "{line}")
    }

    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.needs_rotation()? {
            return Ok(());
        }

        let lock_path = self.log_path.with_extension("lock");
        let lock_file = OpenOptions::new().create(true).write(true).truncate(true).open(&lock_path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                if self.needs_rotation()? {
                    self.perform_rotation()?;
                }
                let _ = std::fs::remove_file(&lock_path);
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    fn needs_rotation(&self) -> std::io::Result<bool> {
        if !self.log_path.exists() {
            return Ok(false);
        }
        let metadata = std::fs::metadata(&self.log_path)?;
        Ok(metadata.len() >= LOG_ROTATION_SIZE_MB * 1024 * 1024)
    }

    fn perform_rotation(&self) -> std::io::Result<()> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = self.log_path.file_name().unwrap().to_str().unwrap();
        let archive_name = format!("{filename}.{timestamp}.gz");
        let archive_path = self.log_path.parent().unwrap().join(archive_name);

        let temp_path = self.log_path.with_extension("rotating");
        std::fs::rename(&self.log_path, &temp_path)?;

        let source_file = File::open(&temp_path)?;
        let target_file = File::create(&archive_path)?;
        let mut encoder = GzEncoder::new(target_file, Compression::default());
        std::io::copy(&mut BufReader::new(source_file), &mut encoder)?;
        encoder.finish()?;

        std::fs::remove_file(&temp_path)?;
        let _ = self.cleanup_old_archives();
        Ok(())
    }

    fn cleanup_old_archives(&self) -> std::io::Result<()> {
        let log_dir = self.log_path.parent().unwrap();
        let filename = self.log_path.file_name().unwrap().to_str().unwrap();

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(log_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&format!("{filename}.")) && name.ends_with(".gz") {
                archives.push((entry.path(), entry.metadata()?.modified()?));
            }
        }

        archives.sort_by_key(|(_, modified)| *modified);
        if archives.len() > MAX_ARCHIVES as usize {
            let drop_count = archives.len() - MAX_ARCHIVES as usize;
            for (path, _) in archives.iter().take(drop_count) {
                let _ = std::fs::remove_file(path);
            }
        }
        Ok(())
    }
}

/// Verbose-progress logger for the run, on only when `-debug` is passed.
#[derive(Clone)]
pub struct DebugLogger {
    enabled: bool,
    inner: Option<Arc<Mutex<RotatingLogger>>>,
    session_id: String,
    redaction_patterns: Vec<Regex>,
}

impl DebugLogger {
    pub fn new(enabled: bool, log_path: PathBuf) -> Self {
        let inner = enabled.then(|| Arc::new(Mutex::new(RotatingLogger::new(log_path))));
        Self {
            enabled,
            inner,
            session_id: Uuid::new_v4().to_string()[..8].to_string(),
            redaction_patterns: Self::compile_redaction_patterns(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, PathBuf::new())
    }

    fn compile_redaction_patterns() -> Vec<Regex> {
        let patterns = [
            r"(?i)authorization[:\s]+[^\s\n]+",
            r"(?i)bearer[:\s]+[^\s\n]+",
            r"(?i)token[:\s]+[^\s\n]+",
            r"(?i)api[_-]?key[:\s]+[^\s\n]+",
            r"(?i)secret[:\s]+[^\s\n]+",
        ];
        patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
    }

    fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for pattern in &self.redaction_patterns {
            redacted = pattern.replace_all(&redacted, "[REDACTED]").to_string();
        }
        redacted
    }

    fn log(&self, level: &str, component: &str, message: &str, fields: HashMap<&str, String>) {
        if !self.enabled {
            return;
        }
        let Some(logger) = &self.inner else { return };

        let timestamp = Local::now().to_rfc3339();
        let redacted = self.redact(message);
        let mut line = format!("{timestamp} [{level}] [{}] {} ({})", component, redacted, self.session_id);
        if !fields.is_empty() {
            let pairs: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
            line.push_str(&format!(" [{}]", pairs.join(" ")));
        }

        if let Ok(logger) = logger.lock() {
            let _ = logger.write_with_rotation(&line);
        }
    }

    pub fn saturation_progress(&self, direction: &str, flows: usize, bytes_per_sec: f64) {
        let mut fields = HashMap::new();
        fields.insert("flows", flows.to_string());
        fields.insert("bytes_per_sec", format!("{bytes_per_sec:.1}"));
        self.log("DEBUG", "FlowGroup", &format!("{direction} throughput sample"), fields);
    }

    pub fn saturation_declared(&self, direction: &str, fully_complete: bool) {
        let mut fields = HashMap::new();
        fields.insert("fully_complete", fully_complete.to_string());
        self.log("DEBUG", "FlowGroup", &format!("{direction} saturation declared"), fields);
    }

    pub fn flow_error(&self, direction: &str, error: &str) {
        self.log("ERROR", "LoadGeneratingConnection", &format!("{direction} flow failed: {error}"), HashMap::new());
    }

    pub fn stage(&self, stage: &str) {
        self.log("DEBUG", "RPMController", stage, HashMap::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let logger = DebugLogger::new(false, path.clone());
        logger.stage("stage 1");
        assert!(!path.exists());
    }

    #[test]
    fn enabled_logger_writes_and_redacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let logger = DebugLogger::new(true, path.clone());
        logger.flow_error("download", "rejected with bearer sometoken123");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[REDACTED]"));
        assert!(!contents.contains("sometoken123"));
    }
}
