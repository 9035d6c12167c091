// `inkstone show`: print a chapter.

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};

use inkstone_common::text::char_count;
use inkstone_common::types::{Chapter, ChapterId};
use inkstone_engine::Backend;

use crate::context::AppContext;
use crate::output;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Chapter ID.
    #[arg(long)]
    chapter: ChapterId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowResult {
    pub chapter_id: ChapterId,
    pub title: String,
    pub status: String,
    pub chars: usize,
    pub content: String,
}

impl From<Chapter> for ShowResult {
    fn from(chapter: Chapter) -> Self {
        let content = chapter.content.unwrap_or_default();
        Self {
            chapter_id: chapter.id,
            title: chapter.title,
            status: chapter.status,
            chars: char_count(&content),
            content,
        }
    }
}

pub async fn run(args: ShowArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let chapter = ctx
        .backend()?
        .get_chapter(args.chapter)
        .await
        .with_context(|| format!("failed to load chapter {}", args.chapter))?;
    output::print_output(ctx.format, &ShowResult::from(chapter), format_human)?;
    Ok(())
}

fn format_human(result: &ShowResult) -> String {
    format!(
        "{} [{}] {} chars\n\n{}",
        result.title, result.status, result.chars, result.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    fn sample_chapter() -> Chapter {
        Chapter {
            id: 7,
            project_id: 1,
            volume_id: 2,
            title: "The Stone Talisman".into(),
            order_no: 3,
            status: "draft".into(),
            content: Some("林动睁开眼。".into()),
            word_count: 6,
        }
    }

    #[test]
    fn result_counts_characters() {
        let result = ShowResult::from(sample_chapter());
        assert_eq!(result.chars, 6);
        assert_eq!(result.chapter_id, 7);
    }

    #[test]
    fn missing_content_is_empty() {
        let result = ShowResult::from(Chapter { content: None, ..sample_chapter() });
        assert_eq!(result.content, "");
        assert_eq!(result.chars, 0);
    }

    #[test]
    fn human_format_shows_header_and_body() {
        let output = format_human(&ShowResult::from(sample_chapter()));
        assert!(output.starts_with("The Stone Talisman [draft] 6 chars"));
        assert!(output.ends_with("林动睁开眼。"));
    }

    #[test]
    fn json_format_roundtrips() {
        let result = ShowResult::from(sample_chapter());
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &result, format_human)
            .expect("json output should serialize");

        let parsed: ShowResult =
            serde_json::from_slice(&buf).expect("json output should deserialize");
        assert_eq!(parsed.title, result.title);
        assert_eq!(parsed.content, result.content);
    }
}
