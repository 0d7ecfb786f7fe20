//! Question-side commands: `ask` and `history`.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use condo_rag_core::models::{AnswerResult, SearchMode};
use condo_rag_core::namespace::resolve;
use condo_rag_core::pipeline::RagPipeline;

use crate::audit::SqliteAudit;

pub async fn run_ask(
    pipeline: &RagPipeline,
    question: &str,
    tenant_id: u64,
    sub_tenant_id: u64,
    mode: SearchMode,
    json: bool,
) -> Result<()> {
    let result = pipeline
        .query(question, resolve(tenant_id, sub_tenant_id), mode)
        .await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_answer(&result);
    }
    Ok(())
}

fn print_answer(result: &AnswerResult) {
    println!("{}", result.answer);
    if !result.success {
        return;
    }
    println!();
    println!("confidence: {:.2}", result.confidence);
    if !result.sources.is_empty() {
        println!("sources:");
        for source in &result.sources {
            println!("  - {}", source);
        }
    }
}

pub async fn run_history(
    audit: &SqliteAudit,
    tenant_id: u64,
    sub_tenant_id: u64,
    limit: i64,
) -> Result<()> {
    let ns = resolve(tenant_id, sub_tenant_id);
    let rows = audit.recent_queries(&ns, limit).await?;
    if rows.is_empty() {
        println!("No questions recorded for {}.", ns);
        return Ok(());
    }
    for row in rows {
        let when = Utc
            .timestamp_opt(row.asked_at, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| row.asked_at.to_string());
        let status = if row.success { "answered" } else { "unanswered" };
        println!(
            "{}  [{} / {} / {}] {}",
            when, row.mode, row.query_class, status, row.question
        );
        if row.success {
            println!("    confidence {:.2}; sources: {}", row.confidence, row.sources.join(", "));
        }
    }
    Ok(())
}
