use crate::batch::FetchResult;
use crate::error::Error;
use crate::metrics::{CLEAN_FORMAT, Entry, Metrics};
use crate::utils;
use crate::window::TimeWindow;
use console::style;
use lettre::Message;
use lettre::message::header::{ContentDisposition, ContentId, ContentType};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use prettytable::{Cell, Row, Table};
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// region: RunContext
/// Everything the report mail is assembled from. Built up explicitly while
/// the run progresses and handed to [`build_message`] per recipient.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub sender: Mailbox,
    pub subject: String,
    intro: String,
    images: Vec<String>,
    missing: Vec<String>,
}

impl RunContext {
    pub fn new(sender: Mailbox, subject: impl Into<String>, intro: impl Into<String>) -> Self {
        Self {
            sender,
            subject: subject.into(),
            intro: intro.into(),
            images: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// References an inline image by its Content-ID.
    pub fn add_image(&mut self, content_id: &str) {
        self.images.push(content_id.to_string());
    }

    /// Notes a panel that could not be rendered.
    pub fn add_missing(&mut self, description: impl Into<String>) {
        self.missing.push(description.into());
    }

    /// Adds every fetch result: images for successes, a note for failures.
    pub fn add_results(&mut self, results: &[FetchResult]) {
        for result in results {
            match result.error() {
                None => self.add_image(&result.stem),
                Some(e) => self.add_missing(format!("{}: {}", result.request, e)),
            }
        }
    }

    pub fn text(&self) -> String {
        let mut text = self.intro.clone();
        if !self.missing.is_empty() {
            text.push_str("\n\nThe following panels could not be rendered:\n");
            for line in &self.missing {
                text.push_str(&format!("  - {}\n", line));
            }
        }
        text
    }

    pub fn html(&self) -> String {
        let mut html = format!("<h3>{}</h3>\n", html_escape(&self.subject));
        for line in self.intro.lines() {
            html.push_str(&html_escape(line));
            html.push_str("<br />\n");
        }
        for content_id in &self.images {
            html.push_str(&format!("<img src=\"cid:{}\"><br>\n", content_id));
        }
        if !self.missing.is_empty() {
            html.push_str("<p>The following panels could not be rendered:</p>\n<ul>\n");
            for line in &self.missing {
                html.push_str(&format!("<li>{}</li>\n", html_escape(line)));
            }
            html.push_str("</ul>\n");
        }
        html
    }
}
// endregion

// region: Message
/// A rendered panel, loaded into memory for attaching.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub content_id: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn load(content_id: &str, path: &Path) -> Result<Self, Error> {
        Ok(Self {
            content_id: content_id.to_string(),
            data: std::fs::read(path)?,
        })
    }

    /// Loads the image of every successful result, in input order.
    pub fn load_all(results: &[FetchResult]) -> Result<Vec<Self>, Error> {
        results
            .iter()
            .filter_map(|r| r.local_path().map(|path| Self::load(&r.stem, path)))
            .collect()
    }

    fn to_part(&self) -> Result<SinglePart, Error> {
        let filename = format!("{}.{}", self.content_id, crate::storage::IMAGE_EXTENSION);
        let content_type = ContentType::parse("image/png")
            .map_err(|e| Error::invalid(format!("bad image content type: {e}")))?;
        Ok(SinglePart::builder()
            .header(content_type)
            .header(ContentId::from(format!("<{}>", self.content_id)))
            .header(ContentDisposition::attachment(&filename))
            .body(self.data.clone()))
    }
}

/// Builds the `multipart/related` report for one recipient: a text/HTML
/// alternative followed by the images, each addressable via `cid:` and
/// carried as a named attachment so clients that ignore `cid:` still show
/// them.
pub fn build_message(
    context: &RunContext,
    recipient: &Mailbox,
    images: &[InlineImage],
) -> Result<Message, Error> {
    let mut body = MultiPart::related().multipart(MultiPart::alternative_plain_html(
        context.text(),
        context.html(),
    ));
    for image in images {
        body = body.singlepart(image.to_part()?);
    }

    Message::builder()
        .from(context.sender.clone())
        .to(recipient.clone())
        .subject(context.subject.as_str())
        .date_now()
        .message_id(Some(utils::generate_message_id(context.sender.email.domain())))
        .multipart(body)
        .map_err(|e| Error::invalid(format!("could not build report message: {e}")))
}
// endregion

// region: Report
#[derive(Debug, Clone)]
pub struct PanelStatus {
    pub panel: String,
    pub content_id: String,
    pub size: Option<u64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl PanelStatus {
    fn from_result(result: &FetchResult) -> Self {
        Self {
            panel: result.request.to_string(),
            content_id: result.stem.clone(),
            size: result
                .local_path()
                .and_then(|p| std::fs::metadata(p).ok())
                .map(|m| m.len()),
            status_code: match result.error() {
                None => Some(200),
                Some(e) => e.status().map(|s| s.as_u16()),
            },
            error: result.error().map(|e| e.to_string()),
        }
    }
}

/// Summary of one batch, for the terminal or as JSON.
#[derive(Debug)]
pub struct Report {
    pub window: TimeWindow,
    pub concurrency_limit: Option<usize>,
    pub total_time: Duration,
    pub panels: Vec<PanelStatus>,
}

impl Report {
    pub fn new(
        results: &[FetchResult],
        window: TimeWindow,
        concurrency_limit: Option<usize>,
        total_time: Duration,
    ) -> Self {
        Self {
            window,
            concurrency_limit,
            total_time,
            panels: results.iter().map(PanelStatus::from_result).collect(),
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &PanelStatus> {
        self.panels.iter().filter(|p| p.error.is_some())
    }

    pub fn success_count(&self) -> usize {
        self.panels.len() - self.failed().count()
    }

    fn summary(&self) -> Metrics {
        let total = self.panels.len();
        let success = self.success_count();
        let size: u64 = self.panels.iter().filter_map(|p| p.size).sum();
        Metrics(vec![
            Entry {
                label: "Time Window",
                value: self.window.to_string(),
                json_label: "window",
                json_value: json!({
                    "from": self.window.start_millis(),
                    "to": self.window.end_millis(),
                }),
            },
            Entry {
                label: "Concurrency Limit",
                value: match self.concurrency_limit {
                    Some(limit) => limit.to_string(),
                    None => "All at once".to_string(),
                },
                json_label: "concurrencyLimit",
                json_value: json!(self.concurrency_limit),
            },
            Entry {
                label: "Elapsed Time",
                value: utils::ms(self.total_time),
                json_label: "elapsedTimeMs",
                json_value: json!(self.total_time.as_millis()),
            },
            Entry {
                label: "Panels Rendered",
                value: format!(
                    "{}/{} ({})",
                    success,
                    total,
                    utils::percent(success as f64 / total.max(1) as f64 * 100.0)
                ),
                json_label: "rendered",
                json_value: json!(success),
            },
            Entry {
                label: "Panels Missing",
                value: (total - success).to_string(),
                json_label: "missing",
                json_value: json!(total - success),
            },
            Entry {
                label: "Image Size",
                value: utils::kb(size as usize),
                json_label: "imageBytes",
                json_value: json!(size),
            },
        ])
    }

    pub fn show_text_report(&self) {
        eprintln!("\n{}\n", style("Render Statistics:").bold());

        let mut table = Table::new();
        table.set_format(*CLEAN_FORMAT);
        table.add_row(Row::new(vec![Cell::new(self.summary().build_table().as_str())]));
        eprintln!("{}", table);

        if self.failed().count() > 0 {
            eprintln!("{}\n", style("Failed Panels:").bold());
            for panel in self.failed() {
                let status = match panel.status_code {
                    Some(code) => format!("{}:", code),
                    None => "---:".to_string(),
                };
                eprintln!(
                    "{} {} {}",
                    style(status).bold().white().on_red(),
                    panel.panel,
                    style(panel.error.as_deref().unwrap_or_default()).dim()
                );
            }
            eprintln!();
        }
    }

    fn build_json_data(&self) -> serde_json::Value {
        json!({
            "summary": self.summary(),
            "panels": self.panels.iter().map(|p| {
                json!({
                    "panel": p.panel,
                    "contentId": p.content_id,
                    "size": p.size,
                    "statusCode": p.status_code,
                    "error": p.error,
                })
            }).collect::<Vec<serde_json::Value>>(),
        })
    }

    /// Returns the JSON report as a pretty-printed string.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.build_json_data())
    }

    /// Rejects batches that should not be mailed: nothing rendered at all, or
    /// anything missing when `strict` is set.
    pub fn ensure_deliverable(&self, strict: bool) -> Result<(), Error> {
        let failed: Vec<&PanelStatus> = self.failed().collect();
        let nothing_rendered = failed.len() == self.panels.len();
        match failed.first() {
            Some(first) if strict || nothing_rendered => Err(Error::FetchFailed {
                failed: failed.len(),
                total: self.panels.len(),
                first: format!(
                    "{}: {}",
                    first.panel,
                    first.error.as_deref().unwrap_or_default()
                ),
            }),
            _ => Ok(()),
        }
    }

    /// `0` when every panel made it into the report, `2` when the report was
    /// sent with panels missing.
    pub fn exit_code(&self) -> ExitCode {
        if self.failed().count() > 0 {
            ExitCode::from(2)
        } else {
            ExitCode::SUCCESS
        }
    }
}
// endregion
