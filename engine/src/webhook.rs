use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{error::Result, provider::check_status};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a run, as posted to the webhook and written to the sidecar file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub success: bool,
    pub image_url: Option<String>,
    pub local_filename: Option<String>,
    pub original_prompt: String,
    pub revised_prompt: Option<String>,
    /// seconds
    pub generation_time: f64,
    pub model: String,
    pub size: Option<String>,
    pub quality: Option<String>,
}

pub async fn notify(client: &reqwest::Client, url: &str, report: &GenerationReport) -> Result<()> {
    let resp = client
        .post(url)
        .timeout(WEBHOOK_TIMEOUT)
        .json(report)
        .send()
        .await?;
    check_status(resp).await?;
    info!("Posted result to webhook (success: {})", report.success);
    Ok(())
}
