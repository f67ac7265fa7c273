//! Tools that push a sample media item into the client's output panel.

use anyhow::bail;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sonicdesk_core::{Tool, ToolOutput};

const SAMPLE_IMAGE_URL: &str = "https://placekitten.com/800/400";
const SAMPLE_PDF_URL: &str =
    "https://www.adobe.com/support/products/enterprise/knowledgecenter/media/c4611_sample_explain.pdf";
const DEFAULT_VIDEO_ID: &str = "a9__D53WsUs";

static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id regex"));

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

pub struct SampleImageTool;

#[async_trait]
impl Tool for SampleImageTool {
    fn name(&self) -> &str {
        "showSampleImageTool"
    }

    fn description(&self) -> &str {
        "Display a sample image in the tool output panel"
    }

    fn short_description(&self) -> &str {
        "Showing a sample image"
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, _content: Value) -> anyhow::Result<ToolOutput> {
        Ok(ToolOutput::new(
            json!({
                "type": "image",
                "url": SAMPLE_IMAGE_URL,
                "description": "A sample image of a kitten"
            }),
            json!({
                "type": "image",
                "content": {
                    "title": "Sample Image",
                    "url": SAMPLE_IMAGE_URL,
                    "description": "A sample image of a kitten"
                }
            }),
        ))
    }
}

pub struct SamplePdfTool;

#[async_trait]
impl Tool for SamplePdfTool {
    fn name(&self) -> &str {
        "showSamplePdfTool"
    }

    fn description(&self) -> &str {
        "Display a sample PDF document in the tool output panel"
    }

    fn short_description(&self) -> &str {
        "Showing a sample PDF"
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, _content: Value) -> anyhow::Result<ToolOutput> {
        Ok(ToolOutput::new(
            json!({
                "type": "text",
                "text": "Showing sample PDF in the left pane"
            }),
            json!({
                "type": "pdf",
                "content": {
                    "title": "Sample PDF Document",
                    "url": SAMPLE_PDF_URL,
                    "description": "This is a sample PDF document showing various PDF features."
                }
            }),
        ))
    }
}

/// Embeds a YouTube video. Falls back to a default video when no id is given.
pub struct SampleVideoTool;

#[async_trait]
impl Tool for SampleVideoTool {
    fn name(&self) -> &str {
        "showSampleVideoTool"
    }

    fn description(&self) -> &str {
        "Display a YouTube video in the tool output panel. Use this tool when you need to show a video demonstration, tutorial, or any YouTube content. The tool will embed the video directly in the conversation."
    }

    fn short_description(&self) -> &str {
        "Show a YouTube video"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "videoId": {
                    "type": "string",
                    "description": "Optional: YouTube video ID to display. If not provided, will show a default video.",
                    "pattern": "^[A-Za-z0-9_-]{11}$"
                },
                "showControls": {
                    "type": "boolean",
                    "description": "Optional: Whether to show video controls. Defaults to true."
                }
            }
        })
    }

    async fn execute(&self, content: Value) -> anyhow::Result<ToolOutput> {
        let video_id = content["videoId"].as_str().unwrap_or(DEFAULT_VIDEO_ID);
        if !VIDEO_ID.is_match(video_id) {
            bail!("Failed to load video: invalid video id '{video_id}'");
        }
        let show_controls = content["showControls"].as_bool().unwrap_or(true);

        let mut url = format!("https://www.youtube-nocookie.com/embed/{video_id}?rel=0&modestbranding=1");
        if !show_controls {
            url.push_str("&controls=0");
        }

        Ok(ToolOutput::new(
            json!({
                "type": "video",
                "videoId": video_id,
                "url": url,
                "showControls": show_controls
            }),
            json!({
                "type": "video",
                "content": {
                    "title": "YouTube Video",
                    "url": url,
                    "description": "Embedded YouTube video player"
                }
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn video_defaults_and_controls() {
        let out = SampleVideoTool.execute(json!({})).await.unwrap();
        assert_eq!(out.model_result["videoId"], DEFAULT_VIDEO_ID);
        assert_eq!(out.model_result["showControls"], true);
        assert!(!out.model_result["url"].as_str().unwrap().contains("controls=0"));

        let out = SampleVideoTool
            .execute(json!({"videoId": "dQw4w9WgXcQ", "showControls": false}))
            .await
            .unwrap();
        assert!(out.model_result["url"].as_str().unwrap().ends_with("&controls=0"));
        assert_eq!(out.ui_result.unwrap()["type"], "video");
    }

    #[tokio::test]
    async fn video_rejects_bad_id() {
        let err = SampleVideoTool
            .execute(json!({"videoId": "../../etc"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid video id"));
    }

    #[tokio::test]
    async fn image_and_pdf_carry_ui_payloads() {
        let image = SampleImageTool.execute(json!({})).await.unwrap();
        assert_eq!(image.ui_result.unwrap()["content"]["url"], SAMPLE_IMAGE_URL);
        let pdf = SamplePdfTool.execute(Value::Null).await.unwrap();
        assert_eq!(pdf.ui_result.unwrap()["type"], "pdf");
    }
}
