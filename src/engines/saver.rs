use std::path::Path;

use async_channel::Receiver;
use log::{info, warn};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    context::{Classification, Outcome, OutputFormat},
    error::ScanError,
};

/// 消费结果通道，每个结果到达时立刻输出进度，通道关闭后返回全部结果
pub async fn saver(rx: Receiver<Outcome>) -> Vec<Outcome> {
    info!("saver engine start.");
    let mut outcomes = vec![];

    while let Ok(outcome) = rx.recv().await {
        match outcome.classification {
            Classification::Error => warn!("{}", text_line(&outcome)),
            _ => info!("{}", text_line(&outcome)),
        }
        outcomes.push(outcome);
    }

    info!("saver engine finished, {} outcomes.", outcomes.len());
    outcomes
}

/// 把结果渲染成指定格式
pub fn render(outcomes: &[Outcome], format: OutputFormat) -> Result<Vec<u8>, serde_json::Error> {
    match format {
        OutputFormat::Text => {
            let mut buf = String::new();
            for outcome in outcomes {
                buf.push_str(&text_line(outcome));
                buf.push('\n');
            }
            Ok(buf.into_bytes())
        }
        OutputFormat::Json => serde_json::to_vec_pretty(outcomes),
        OutputFormat::Xml => Ok(render_xml(outcomes).into_bytes()),
    }
}

pub async fn write_report(
    outcomes: &[Outcome],
    format: OutputFormat,
    output: &Path,
) -> Result<(), ScanError> {
    let output_error = |reason: String| ScanError::Output {
        path: output.to_path_buf(),
        reason,
    };

    let bytes = render(outcomes, format).map_err(|e| output_error(e.to_string()))?;
    let mut output_file = File::create(output)
        .await
        .map_err(|e| output_error(e.to_string()))?;
    output_file
        .write_all(&bytes)
        .await
        .map_err(|e| output_error(e.to_string()))?;
    output_file
        .flush()
        .await
        .map_err(|e| output_error(e.to_string()))?;

    info!("Saved results to {:?}", output);
    Ok(())
}

fn text_line(outcome: &Outcome) -> String {
    match &outcome.error_message {
        Some(message) => message.clone(),
        None => format!(
            "URL: {}, Status: {}, HTTP Status Code: {}",
            outcome.url,
            outcome.classification,
            outcome.status_code.unwrap_or(0)
        ),
    }
}

fn render_xml(outcomes: &[Outcome]) -> String {
    let mut buf = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<results>\n");
    for outcome in outcomes {
        buf.push_str("  <result>\n");
        buf.push_str(&format!("    <url>{}</url>\n", escape_xml(&outcome.url)));
        if let Some(code) = outcome.status_code {
            buf.push_str(&format!("    <status_code>{}</status_code>\n", code));
        }
        buf.push_str(&format!(
            "    <status>{}</status>\n",
            escape_xml(&outcome.classification.to_string())
        ));
        if let Some(message) = &outcome.error_message {
            buf.push_str(&format!(
                "    <error_message>{}</error_message>\n",
                escape_xml(message)
            ));
        }
        buf.push_str("  </result>\n");
    }
    buf.push_str("</results>\n");
    buf
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
