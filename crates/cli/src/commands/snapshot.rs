// `inkstone snapshot`: manage chapter snapshots.

use anyhow::Context;
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use inkstone_common::types::{ChapterId, Snapshot, SnapshotId};
use inkstone_engine::Backend;

use crate::context::AppContext;
use crate::exit_code::UsageError;
use crate::output;

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Chapter ID.
    #[arg(long, global = true)]
    chapter: Option<ChapterId>,

    #[command(subcommand)]
    action: SnapshotAction,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotAction {
    /// Save the chapter and snapshot it
    Create {
        /// Label for the snapshot. Defaults to a timestamped one.
        #[arg(long)]
        label: Option<String>,
    },
    /// List snapshots, newest first
    List,
    /// Print one snapshot with its content
    Show {
        #[arg(long)]
        id: SnapshotId,
    },
    /// Restore the chapter to a snapshot
    Rollback {
        #[arg(long)]
        id: SnapshotId,
    },
    /// Delete a snapshot
    Delete {
        #[arg(long)]
        id: SnapshotId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SnapshotResult {
    Created { snapshot: Snapshot },
    List { chapter_id: ChapterId, snapshots: Vec<Snapshot> },
    Show { snapshot: Snapshot },
    RolledBack { chapter_id: ChapterId, snapshot_id: SnapshotId, char_count: usize },
    Deleted { snapshot_id: SnapshotId },
}

pub async fn run(args: SnapshotArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let result = match args.action {
        SnapshotAction::Create { label } => {
            let chapter_id = require_chapter(args.chapter)?;
            let label = label.filter(|text| !text.trim().is_empty());
            let session = ctx.open(chapter_id).await?;
            let created = session.create_snapshot(label).await;
            session.close().await;
            SnapshotResult::Created {
                snapshot: created.context("failed to create snapshot")?,
            }
        }
        SnapshotAction::List => {
            let chapter_id = require_chapter(args.chapter)?;
            let session = ctx.open(chapter_id).await?;
            let listed = session.list_snapshots().await;
            session.close().await;
            SnapshotResult::List { chapter_id, snapshots: listed? }
        }
        SnapshotAction::Show { id } => {
            let snapshot = ctx
                .backend()?
                .get_snapshot(id)
                .await
                .with_context(|| format!("failed to load snapshot {id}"))?;
            SnapshotResult::Show { snapshot }
        }
        SnapshotAction::Rollback { id } => {
            let chapter_id = require_chapter(args.chapter)?;
            let session = ctx.open(chapter_id).await?;
            let restored = session.rollback(id).await;
            let char_count = session.view().char_count;
            session.close().await;
            restored.with_context(|| format!("failed to roll back to snapshot {id}"))?;
            SnapshotResult::RolledBack { chapter_id, snapshot_id: id, char_count }
        }
        SnapshotAction::Delete { id } => {
            ctx.backend()?
                .delete_snapshot(id)
                .await
                .with_context(|| format!("failed to delete snapshot {id}"))?;
            SnapshotResult::Deleted { snapshot_id: id }
        }
    };

    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn require_chapter(chapter: Option<ChapterId>) -> Result<ChapterId, UsageError> {
    chapter.ok_or_else(|| UsageError("--chapter is required".into()))
}

fn describe(snapshot: &Snapshot) -> String {
    let created = snapshot.created_at.with_timezone(&chrono::Local).format(LOCAL_TIME_FORMAT);
    format!(
        "{:>6}  {created}  {:>6} words  {}",
        snapshot.id,
        snapshot.word_count,
        snapshot.label.as_deref().unwrap_or("(unlabelled)")
    )
}

fn format_human(result: &SnapshotResult) -> String {
    match result {
        SnapshotResult::Created { snapshot } => format!("Created snapshot\n{}", describe(snapshot)),
        SnapshotResult::List { chapter_id, snapshots } if snapshots.is_empty() => {
            format!("Chapter {chapter_id} has no snapshots")
        }
        SnapshotResult::List { snapshots, .. } => {
            snapshots.iter().map(describe).collect::<Vec<_>>().join("\n")
        }
        SnapshotResult::Show { snapshot } => {
            format!("{}\n\n{}", describe(snapshot), snapshot.content.as_deref().unwrap_or_default())
        }
        SnapshotResult::RolledBack { chapter_id, snapshot_id, char_count } => {
            format!("Chapter {chapter_id} restored to snapshot {snapshot_id} ({char_count} chars)")
        }
        SnapshotResult::Deleted { snapshot_id } => format!("Deleted snapshot {snapshot_id}"),
    }
}
