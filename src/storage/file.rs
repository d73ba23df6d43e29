//! Append-only JSON-lines storage backend
//!
//! One JSON object per line. Lookups are full scans; deletion rewrites the
//! whole file through a temp file + rename. Every operation holds one mutex.
//! Undecodable data found on open is cut off (after a backup) so appends
//! never land behind it.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{NewUrl, Storage, StorageStats, UrlRecord, UrlToDelete, ensure_unique_within_batch};
use crate::errors::{Result, ShortenerError};

/// 文件中的单行记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub short_url: String,
    pub original_url: String,
    pub created_by: i64,
    pub is_deleted: bool,
    // 旧文件没有该字段
    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,
}

fn default_created_at() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl From<FileRecord> for UrlRecord {
    fn from(record: FileRecord) -> Self {
        UrlRecord {
            id: record.id,
            short_code: record.short_url,
            original_url: record.original_url,
            created_by: record.created_by,
            created_at: record.created_at,
            is_deleted: record.is_deleted,
        }
    }
}

impl From<&UrlRecord> for FileRecord {
    fn from(record: &UrlRecord) -> Self {
        FileRecord {
            id: record.id,
            short_url: record.short_code.clone(),
            original_url: record.original_url.clone(),
            created_by: record.created_by,
            is_deleted: record.is_deleted,
            created_at: record.created_at,
        }
    }
}

pub struct FileStorage {
    path: PathBuf,
    /// 保护文件读写，值为最后分配的记录 ID
    last_id: Mutex<i64>,
    user_seq: AtomicI64,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ShortenerError::file_operation(format!(
                    "无法创建目录 {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let (records, broken_tail) = scan_with_tail(&path)?;
        if let Some(valid_len) = broken_tail {
            repair_tail(&path, valid_len)?;
        }
        let last_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        let max_user = records.iter().map(|r| r.created_by).max().unwrap_or(0);

        info!(
            "File storage initialized: {} ({} records)",
            path.display(),
            records.len()
        );

        Ok(Self {
            path,
            last_id: Mutex::new(last_id),
            user_seq: AtomicI64::new(max_user.max(0) + 1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn observe_user(&self, created_by: i64) {
        if created_by > 0 {
            self.user_seq.fetch_max(created_by + 1, Ordering::SeqCst);
        }
    }

    fn append(&self, records: &[UrlRecord]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, &FileRecord::from(record))?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // 单次写入，避免半行
        file.write_all(&buf)?;
        file.flush()?;
        Ok(())
    }

    fn rewrite(&self, records: &[FileRecord]) -> Result<()> {
        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut file = File::create(&tmp_path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// 顺序读取所有记录，遇到无法解析的行时停止
fn scan(path: &Path) -> Result<Vec<FileRecord>> {
    scan_with_tail(path).map(|(records, _)| records)
}

/// 同 `scan`，并在解析中断时返回最后一条有效记录之后的字节偏移
fn scan_with_tail(path: &Path) -> Result<(Vec<FileRecord>, Option<u64>)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), None)),
        Err(e) => {
            return Err(ShortenerError::file_operation(format!(
                "无法打开 {}: {}",
                path.display(),
                e
            )));
        }
    };

    let mut records = Vec::new();
    let mut stream =
        serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<FileRecord>();
    let mut valid_len = 0u64;
    loop {
        match stream.next() {
            Some(Ok(record)) => {
                records.push(record);
                valid_len = stream.byte_offset() as u64;
            }
            Some(Err(e)) => {
                warn!(
                    "Stopped reading {} after {} records: {}",
                    path.display(),
                    records.len(),
                    e
                );
                return Ok((records, Some(valid_len)));
            }
            None => return Ok((records, None)),
        }
    }
}

/// 将文件截断到最后一条有效记录，原文件备份为 `<path>.corrupt`
fn repair_tail(path: &Path, valid_len: u64) -> Result<()> {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".corrupt");
    let backup = PathBuf::from(backup);
    fs::copy(path, &backup).map_err(|e| {
        ShortenerError::file_operation(format!("无法备份 {}: {}", path.display(), e))
    })?;

    let mut file = OpenOptions::new().write(true).open(path)?;
    file.set_len(valid_len)?;
    if valid_len > 0 {
        // 新记录必须从新行开始
        file.seek(SeekFrom::End(0))?;
        file.write_all(b"\n")?;
    }
    file.sync_all()?;

    warn!(
        "Truncated {} to {} bytes after undecodable data; original kept at {}",
        path.display(),
        valid_len,
        backup.display()
    );
    Ok(())
}

fn conflict_for(records: &[FileRecord], url: &NewUrl) -> Option<ShortenerError> {
    if let Some(existing) = records.iter().find(|r| r.original_url == url.original_url) {
        return Some(ShortenerError::already_exists(existing.short_url.clone()));
    }
    if records.iter().any(|r| r.short_url == url.short_code) {
        return Some(ShortenerError::code_collision(url.short_code.clone()));
    }
    None
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, url: NewUrl) -> Result<UrlRecord> {
        let mut last_id = self.last_id.lock();
        let records = scan(&self.path)?;
        if let Some(err) = conflict_for(&records, &url) {
            return Err(err);
        }

        let record = UrlRecord {
            id: *last_id + 1,
            short_code: url.short_code,
            original_url: url.original_url,
            created_by: url.created_by,
            created_at: Utc::now(),
            is_deleted: false,
        };
        self.append(std::slice::from_ref(&record))?;
        *last_id = record.id;
        drop(last_id);

        self.observe_user(record.created_by);
        debug!("Saved {} -> {}", record.short_code, record.original_url);
        Ok(record)
    }

    async fn save_batch(&self, urls: Vec<NewUrl>) -> Result<Vec<UrlRecord>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        ensure_unique_within_batch(&urls)?;

        let mut last_id = self.last_id.lock();
        let records = scan(&self.path)?;
        if let Some(err) = urls.iter().find_map(|url| conflict_for(&records, url)) {
            return Err(err);
        }

        let now = Utc::now();
        let created: Vec<UrlRecord> = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| UrlRecord {
                id: *last_id + 1 + i as i64,
                short_code: url.short_code,
                original_url: url.original_url,
                created_by: url.created_by,
                created_at: now,
                is_deleted: false,
            })
            .collect();
        self.append(&created)?;
        *last_id += created.len() as i64;
        drop(last_id);

        for record in &created {
            self.observe_user(record.created_by);
        }
        debug!("Saved batch of {} urls", created.len());
        Ok(created)
    }

    async fn find_by_short_url(&self, code: &str) -> Result<UrlRecord> {
        let _guard = self.last_id.lock();
        scan(&self.path)?
            .into_iter()
            .find(|r| r.short_url == code)
            .map(UrlRecord::from)
            .ok_or_else(|| ShortenerError::not_found(format!("短链接不存在: {}", code)))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<UrlRecord>> {
        let records: Vec<UrlRecord> = if user_id == 0 {
            Vec::new()
        } else {
            let _guard = self.last_id.lock();
            scan(&self.path)?
                .into_iter()
                .filter(|r| r.created_by == user_id)
                .map(UrlRecord::from)
                .collect()
        };

        if records.is_empty() {
            return Err(ShortenerError::not_found(format!(
                "用户 {} 没有短链接",
                user_id
            )));
        }
        Ok(records)
    }

    async fn is_short_url_exists(&self, code: &str) -> Result<bool> {
        let _guard = self.last_id.lock();
        Ok(scan(&self.path)?.iter().any(|r| r.short_url == code))
    }

    async fn delete_urls(&self, urls: &[UrlToDelete]) -> Result<usize> {
        if urls.is_empty() {
            return Ok(0);
        }

        let _guard = self.last_id.lock();
        let mut records = scan(&self.path)?;
        let mut marked = 0;
        for record in records.iter_mut() {
            if record.is_deleted || record.created_by == 0 {
                continue;
            }
            if urls
                .iter()
                .any(|u| u.short_code == record.short_url && u.user_id == record.created_by)
            {
                record.is_deleted = true;
                marked += 1;
            }
        }

        if marked > 0 {
            self.rewrite(&records)?;
        }
        debug!("Marked {} of {} urls as deleted", marked, urls.len());
        Ok(marked)
    }

    fn next_user_id(&self) -> i64 {
        self.user_seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn ping(&self) -> bool {
        let _guard = self.last_id.lock();
        match fs::metadata(&self.path) {
            Ok(meta) => meta.is_file(),
            Err(e) => e.kind() == ErrorKind::NotFound,
        }
    }

    async fn get_stats(&self) -> Result<StorageStats> {
        let _guard = self.last_id.lock();
        let records = scan(&self.path)?;
        let mut users: Vec<i64> = records
            .iter()
            .map(|r| r.created_by)
            .filter(|&id| id != 0)
            .collect();
        users.sort_unstable();
        users.dedup();

        Ok(StorageStats {
            urls: records.iter().filter(|r| !r.is_deleted).count(),
            users: users.len(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
