use crate::model::{CheckStatus, Target, Timestamp};
use crate::probe::ProbeResult;
use chrono::SecondsFormat;
use std::fmt::Write;

const FOOTER: &str = "This alert was sent by MonitorScope API Health Monitoring System.";

const STYLE: &str = "\
body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
.container { max-width: 600px; margin: 0 auto; padding: 20px; }
.header { background: #f8f9fa; padding: 20px; border-radius: 8px; margin-bottom: 20px; }
.status { display: inline-block; padding: 8px 16px; border-radius: 4px; color: white; font-weight: bold; }
.status.up { background-color: #10B981; }
.status.down { background-color: #EF4444; }
.details { background: #f8f9fa; padding: 20px; border-radius: 8px; }
.detail-row { margin-bottom: 10px; }
.detail-label { font-weight: bold; color: #666; }
.footer { margin-top: 20px; padding-top: 20px; border-top: 1px solid #eee; font-size: 12px; color: #666; }";

/// Everything an alert email talks about
#[derive(Debug, Clone, PartialEq)]
pub struct AlertContent {
    pub target_name: String,
    pub target_url: String,
    pub status: CheckStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub timestamp: Timestamp,
}

impl AlertContent {
    /// Content describing one check of `target`
    pub fn from_check(target: &Target, result: &ProbeResult, timestamp: Timestamp) -> Self {
        Self {
            target_name: target.name.clone(),
            target_url: target.url.clone(),
            status: result.status,
            response_time_ms: Some(result.response_time_ms),
            error_message: result.error_message.clone(),
            timestamp,
        }
    }

    /// Fixed content used by the configuration test email
    pub fn sample(timestamp: Timestamp) -> Self {
        Self {
            target_name: "Test API".to_string(),
            target_url: "https://api.example.com/test".to_string(),
            status: CheckStatus::Down,
            response_time_ms: Some(5000),
            error_message: Some("This is a test alert email".to_string()),
            timestamp,
        }
    }
}

/// Subject and both bodies of an alert email
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn status_icon(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Up => "✅",
        CheckStatus::Down => "❌",
    }
}

/// Render the subject and the HTML and plain-text bodies
pub fn render(content: &AlertContent) -> RenderedEmail {
    RenderedEmail {
        subject: format!("API Alert: {} - {}", content.target_name, content.status),
        html: render_html(content),
        text: render_text(content),
    }
}

fn iso_timestamp(content: &AlertContent) -> String {
    content.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn render_text(content: &AlertContent) -> String {
    let mut lines = vec![
        format!("API Health Alert - {}", content.target_name),
        String::new(),
        format!(
            "{} Status: {}",
            status_icon(content.status),
            content.status
        ),
        format!("URL: {}", content.target_url),
    ];
    if let Some(ms) = content.response_time_ms {
        lines.push(format!("Response Time: {}ms", ms));
    }
    if let Some(error) = &content.error_message {
        lines.push(format!("Error: {}", error));
    }
    lines.push(format!("Timestamp: {}", iso_timestamp(content)));
    lines.push(String::new());
    lines.push(FOOTER.to_string());
    lines.join("\n")
}

fn render_html(content: &AlertContent) -> String {
    let name = escape_html(&content.target_name);
    let mut html = String::with_capacity(2048);

    // Writing to a String cannot fail
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>API Alert - {name}</title>\n<style>\n{style}\n</style>\n</head>\n<body>\n\
         <div class=\"container\">\n<div class=\"header\">\n\
         <h1>{icon} API Health Alert</h1>\n\
         <p>MonitorScope has detected a change in your API status</p>\n</div>\n\
         <div class=\"details\">\n",
        name = name,
        style = STYLE,
        icon = status_icon(content.status),
    );
    detail_row(&mut html, "API Name:", &name);
    detail_row(&mut html, "URL:", &escape_html(&content.target_url));
    detail_row(
        &mut html,
        "Status:",
        &format!(
            "<span class=\"status {}\">{}</span>",
            content.status.as_str().to_lowercase(),
            content.status
        ),
    );
    if let Some(ms) = content.response_time_ms {
        detail_row(&mut html, "Response Time:", &format!("{}ms", ms));
    }
    if let Some(error) = &content.error_message {
        detail_row(&mut html, "Error Message:", &escape_html(error));
    }
    detail_row(&mut html, "Timestamp:", &iso_timestamp(content));
    let _ = write!(
        html,
        "</div>\n<div class=\"footer\">\n<p>{}</p>\n</div>\n</div>\n</body>\n</html>\n",
        FOOTER
    );
    html
}

fn detail_row(html: &mut String, label: &str, value: &str) {
    let _ = writeln!(
        html,
        "<div class=\"detail-row\"><span class=\"detail-label\">{}</span> {}</div>",
        label, value
    );
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
