//! REPL/flag command handlers: `open`, `combats`, `overview`, `help`, `quit`
//! (spec.md §6). Grounded on the teacher's `commands.rs` plain-`println!`
//! table style (no TUI framework).

use crate::context::{CliContext, Session};
use logfathom_core::config;
use logfathom_core::orchestrator::Orchestrator;
use std::path::Path;

pub async fn open(path: &str, ctx: &CliContext) -> Result<String, String> {
    let path = Path::new(path);
    let settings = config::load();
    let mut orchestrator = Orchestrator::new(settings, 4).map_err(|e| e.to_string())?;
    let summaries = orchestrator.analyze(path).map_err(|e| e.to_string())?;

    let message = format!("Opened {}: {} combat(s) found", path.display(), summaries.len());
    ctx.set_session(Session { path: path.to_path_buf(), orchestrator, summaries }).await;
    Ok(message)
}

pub async fn combats(ctx: &CliContext, n: usize) -> Result<String, String> {
    let Some(rows) = ctx
        .with_session(|session| {
            session
                .summaries
                .iter()
                .take(n)
                .enumerate()
                .map(|(i, summary)| {
                    format!(
                        "{:>3}  {:<5}  {:<20}  {:<20}  {:>8.1}s  {:<24}  {:<10}  {:>6}",
                        i + 1,
                        summary.id,
                        summary.start_time.format("%Y-%m-%d %H:%M:%S"),
                        summary.end_time.format("%Y-%m-%d %H:%M:%S"),
                        (summary.end_time - summary.start_time).num_milliseconds() as f64 / 1000.0,
                        summary.map.clone().unwrap_or_else(|| "-".to_string()),
                        summary
                            .difficulty
                            .map(|d| format!("{d:?}"))
                            .unwrap_or_else(|| "-".to_string()),
                        summary.line_count,
                    )
                })
                .collect::<Vec<_>>()
        })
        .await
    else {
        return Err("no log open; use `open <path>` first".to_string());
    };

    let header = format!(
        "{:^3}  {:^5}  {:^20}  {:^20}  {:^9}  {:^24}  {:^10}  {:^6}",
        "#", "id", "start", "end", "duration", "map", "difficulty", "lines"
    );
    let mut out = vec![header, "-".repeat(110)];
    out.extend(rows);
    Ok(out.join("\n"))
}

pub async fn overview(ctx: &CliContext, n: usize) -> Result<String, String> {
    let combat_id = ctx
        .with_session(|session| session.summaries.get(n.saturating_sub(1)).map(|s| s.id))
        .await
        .flatten();
    let Some(combat_id) = combat_id else {
        return Err(format!("no combat #{n}; use `combats` to list available combats"));
    };
    let combat = ctx
        .with_session(|session| session.orchestrator.cached_combat(combat_id))
        .await
        .flatten();
    let Some(combat) = combat else {
        return Err(format!("combat #{n} (id {combat_id}) is not cached"));
    };

    let header = format!(
        "{:^20}  {:^8}  {:>10}  {:>8}  {:>10}  {:>8}  {:>6}  {:>5}",
        "player", "handle", "dps", "damage%", "heal", "debuff%", "kills", "misses"
    );
    let mut out = vec![header, "-".repeat(90)];
    for row in &combat.overview {
        out.push(format!(
            "{:<20}  {:<8}  {:>10.1}  {:>7.1}%  {:>10.1}  {:>7.1}%  {:>6}  {:>5}",
            truncate(&row.name, 20),
            row.handle,
            row.dps,
            row.damage_share * 100.0,
            row.total_heal,
            row.debuff * 100.0,
            row.kills,
            row.misses,
        ));
    }
    Ok(out.join("\n"))
}

pub fn help() -> &'static str {
    "Verbs: open|o <path>, combats|c [N], overview|ov [N], help|h, quit|q"
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max.saturating_sub(1)).collect::<String>() + "…"
    } else {
        s.to_string()
    }
}
