//! 结果存储 - 基础设施层
//!
//! 持有 SQLite 连接这一稀缺资源，只暴露 `exists` / `put` / `count` 三个能力。
//!
//! 写路径由一个容量为 1 的信号量在整个进程范围内串行化，避免并发
//! handler 交错写坏底层文件；`exists` / `count` 是幂等查询，只经过
//! 连接锁。单条 REPLACE 是事务性的：put 之间崩溃最多丢失在途那一条，
//! 已提交条目不会损坏。

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::StoreError;
use crate::models::entry::ResultEntry;

/// 建表 DDL（幂等，首次使用时执行）
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS result (
    id INTEGER PRIMARY KEY,
    content TEXT,
    source TEXT,
    reasoning TEXT
);
";

/// 结果存储
///
/// 以记录索引为主键的结果表，REPLACE 语义保证每个索引至多一行
pub struct ResultStore {
    conn: Mutex<Connection>,
    write_gate: Semaphore,
}

impl ResultStore {
    /// 打开或创建结果数据库
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            write_gate: Semaphore::new(1),
        })
    }

    /// 创建内存数据库（测试用）
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            write_gate: Semaphore::new(1),
        })
    }

    /// 获取连接锁
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// 查询指定索引是否已提交结果
    ///
    /// 与其他索引的并发写入互不干扰，可随时调用
    pub fn exists(&self, index: usize) -> Result<bool, StoreError> {
        let conn = self.lock_conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM result WHERE id = ?1",
                params![index as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// 按索引插入或替换结果条目
    ///
    /// 进程内所有 `put` 调用经由写闸门串行执行；同一索引的调用
    /// 由上层（每索引恰好一次提交）保证不并发
    pub async fn put(&self, entry: &ResultEntry) -> Result<(), StoreError> {
        let content = serde_json::to_string(&entry.content)?;
        let source = serde_json::to_string(&entry.source)?;

        let _permit = self
            .write_gate
            .acquire()
            .await
            .map_err(|_| StoreError::LockPoisoned)?;

        let conn = self.lock_conn()?;
        conn.execute(
            "REPLACE INTO result (id, content, source, reasoning) VALUES (?1, ?2, ?3, ?4)",
            params![entry.index as i64, content, source, entry.reasoning],
        )?;
        Ok(())
    }

    /// 已提交条目总数（用于进度 / 覆盖率报告）
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM result", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 读取指定索引的条目（运维检查 / 测试用）
    pub fn get(&self, index: usize) -> Result<Option<ResultEntry>, StoreError> {
        let conn = self.lock_conn()?;
        let row: Option<(String, String, Option<String>)> = conn
            .query_row(
                "SELECT content, source, reasoning FROM result WHERE id = ?1",
                params![index as i64],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((content, source, reasoning)) => {
                let content: Value = serde_json::from_str(&content)?;
                let source: Value = serde_json::from_str(&source)?;
                Ok(Some(ResultEntry {
                    index,
                    content,
                    source,
                    reasoning,
                }))
            }
        }
    }
}
