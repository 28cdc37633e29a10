use std::path::PathBuf;

use abenteuer_contracts::{PlanReport, ReportReason};
use abenteuer_kernel::ReportSink;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One `{timestamp_utc, plan_hash, reason}` object per line.
pub struct JsonlReportSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlReportSink {
    pub async fn new(path: &str) -> Result<Self, String> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| format!("open {path}: {e}"))?;
        Ok(Self {
            path: PathBuf::from(path),
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl ReportSink for JsonlReportSink {
    async fn append(&self, report: &PlanReport) -> Result<(), String> {
        let mut line = serde_json::to_string(report).map_err(|e| e.to_string())?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| e.to_string())?;
        file.flush().await.map_err(|e| e.to_string())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PlanReport>, String> {
        let _guard = self.file.lock().await;
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.to_string()),
        };
        Ok(text
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str::<PlanReport>(line).ok())
            .take(limit)
            .collect())
    }
}

pub struct SqliteReportSink {
    conn: Mutex<Connection>,
}

impl SqliteReportSink {
    pub fn new(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS plan_reports (
                timestamp_utc TEXT NOT NULL,
                plan_hash TEXT NOT NULL,
                reason TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn reason_code(reason: ReportReason) -> Result<String, String> {
    match serde_json::to_value(reason).map_err(|e| e.to_string())? {
        serde_json::Value::String(code) => Ok(code),
        other => Err(format!("unexpected reason encoding: {other}")),
    }
}

#[async_trait]
impl ReportSink for SqliteReportSink {
    async fn append(&self, report: &PlanReport) -> Result<(), String> {
        let reason = reason_code(report.reason)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO plan_reports(timestamp_utc, plan_hash, reason) VALUES (?1, ?2, ?3)",
            params![report.timestamp_utc, report.plan_hash, reason],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PlanReport>, String> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp_utc, plan_hash, reason FROM plan_reports ORDER BY rowid DESC LIMIT ?1",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| e.to_string())?;

        let mut out = Vec::new();
        for row in rows {
            let (timestamp_utc, plan_hash, reason) = row.map_err(|e| e.to_string())?;
            let reason: ReportReason = serde_json::from_value(serde_json::Value::String(reason))
                .map_err(|e| e.to_string())?;
            out.push(PlanReport {
                timestamp_utc,
                plan_hash,
                reason,
            });
        }
        Ok(out)
    }
}
