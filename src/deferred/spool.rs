//! 文件 spool Runner - 本地 JSONL 文件
//!
//! 进程即将退出（或根本没在运行）时，任务先追加到 spool 文件；下一次唤醒时
//! 用 `peek` 读出、执行完后 `acknowledge` 移除已处理的前缀，期间追加的任务保留。
//! 写入都持有独占文件锁。

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::task::{DeferredTaskRunner, HandoffError, TaskDescriptor};
use crate::error::Result;

/// spool 中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolRecord {
    /// 提交时间
    pub ts: DateTime<Utc>,
    pub task: TaskDescriptor,
}

/// 一次读出的待执行任务
#[derive(Debug, Clone, Default)]
pub struct SpoolBatch {
    pub tasks: Vec<TaskDescriptor>,
    /// 读取时文件的字节长度，确认时移除这一前缀
    pub consumed: u64,
}

pub struct SpoolRunner {
    path: PathBuf,
}

impl SpoolRunner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条任务（带文件锁）
    pub fn append(&self, task: TaskDescriptor) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let record = SpoolRecord { ts: Utc::now(), task };
        let line = serde_json::to_string(&record).map_err(std::io::Error::from)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        let written = writeln!(file, "{}", line);
        file.unlock()?;
        written?;
        Ok(())
    }

    /// 取出全部待执行任务并清空文件，按提交顺序返回
    pub fn drain(&self) -> Result<Vec<TaskDescriptor>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.lock_exclusive()?;

        let records = read_records(&file);
        let truncated = file.set_len(0);
        file.unlock()?;
        truncated?;

        info!(path = %self.path.display(), count = records.len(), "Spool drained");
        Ok(records.into_iter().map(|r| r.task).collect())
    }

    /// 读出全部待执行任务，不修改文件
    pub fn peek(&self) -> Result<SpoolBatch> {
        if !self.path.exists() {
            return Ok(SpoolBatch::default());
        }
        let file = File::open(&self.path)?;
        file.lock_shared()?;
        let consumed = file.metadata().map(|m| m.len());
        let records = read_records(&file);
        file.unlock()?;

        Ok(SpoolBatch {
            tasks: records.into_iter().map(|r| r.task).collect(),
            consumed: consumed?,
        })
    }

    /// 移除已处理的前 `consumed` 字节，保留之后追加的任务
    pub fn acknowledge(&self, consumed: u64) -> Result<()> {
        if consumed == 0 || !self.path.exists() {
            return Ok(());
        }
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.lock_exclusive()?;
        let rewritten = remove_prefix(&mut file, consumed);
        file.unlock()?;
        let remaining = rewritten?;

        info!(path = %self.path.display(), consumed, remaining, "Spool acknowledged");
        Ok(())
    }

    /// 待执行任务数（不清空）
    pub fn pending(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let file = File::open(&self.path)?;
        file.lock_shared()?;
        let count = read_records(&file).len();
        file.unlock()?;
        Ok(count)
    }
}

fn remove_prefix(file: &mut File, consumed: u64) -> std::io::Result<u64> {
    let mut data = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut data)?;

    let start = usize::try_from(consumed).map_or(data.len(), |n| n.min(data.len()));
    let rest = &data[start..];
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(rest)?;
    Ok(rest.len() as u64)
}

/// 逐行解析，无法解析的行（包括非 UTF-8）跳过
fn read_records(file: &File) -> Vec<SpoolRecord> {
    BufReader::new(file)
        .split(b'\n')
        .map_while(|line| {
            line.map_err(|e| warn!(error = %e, "Failed to read spool"))
                .ok()
        })
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .filter_map(|line| match serde_json::from_slice::<SpoolRecord>(&line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping corrupt spool line");
                None
            }
        })
        .collect()
}

impl DeferredTaskRunner for SpoolRunner {
    fn name(&self) -> &str {
        "spool"
    }

    fn submit(&self, task: TaskDescriptor) -> std::result::Result<(), HandoffError> {
        let task_key = task.task_key.clone();
        self.append(task)
            .map_err(|e| HandoffError::Unavailable(e.to_string()))?;
        debug!(task_key = %task_key, path = %self.path.display(), "Task spooled");
        Ok(())
    }
}
