use bytes::Bytes;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GenerationError, Result},
    job::{JobId, JobStatus, StatusReport, Submission},
    request::{Capability, GenerationRequest, MAX_VIDEO_DURATION},
};

use super::{
    Provider, ProviderFuture, ProviderKind, STATUS_TIMEOUT, SUBMIT_TIMEOUT, check_status,
    ensure_supported, fetch_bytes, require_key, shorten,
};

pub const DEFAULT_BASE_URL: &str = "https://api.dev.runwayml.com";
const API_VERSION: &str = "2024-11-06";

/// RunwayML task API (image/video to video)
#[derive(Clone)]
pub struct Runway {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl Runway {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn key(&self) -> Result<String> {
        require_key(self.api_key.as_deref(), "RUNWAYML_API_KEY")
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum TaskBody<'a> {
    ImageToVideo(ImageToVideoBody<'a>),
    VideoToVideo(VideoToVideoBody<'a>),
}

impl TaskBody<'_> {
    fn endpoint(&self) -> &'static str {
        match self {
            TaskBody::ImageToVideo(_) => "image_to_video",
            TaskBody::VideoToVideo(_) => "video_to_video",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageToVideoBody<'a> {
    prompt_image: &'a str,
    prompt_text: &'a str,
    model: &'a str,
    aspect_ratio: &'a str,
    duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    watermark: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    interpolate: Option<bool>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    looping: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    camera_motion: Option<CameraMotion>,
    motion_brush: MotionBrush,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoToVideoBody<'a> {
    video_uri: &'a str,
    prompt_text: &'a str,
    model: &'a str,
    aspect_ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CameraMotion {
    #[serde(rename = "type")]
    kind: &'static str,
    strength: u32,
}

#[derive(Debug, Serialize)]
struct MotionBrush {
    strength: u32,
    guidance: u32,
}

fn task_body(request: &GenerationRequest) -> Result<TaskBody<'_>> {
    let params = request.params();
    let reference = params.reference.as_ref().ok_or_else(|| {
        GenerationError::configuration(format!(
            "{} needs reference media",
            request.capability()
        ))
    })?;

    Ok(match request.capability() {
        Capability::VideoToVideo => TaskBody::VideoToVideo(VideoToVideoBody {
            video_uri: reference.as_str(),
            prompt_text: request.prompt(),
            model: &params.model,
            aspect_ratio: &params.aspect_ratio,
            seed: params.seed,
        }),
        _ => TaskBody::ImageToVideo(ImageToVideoBody {
            prompt_image: reference.as_str(),
            prompt_text: request.prompt(),
            model: &params.model,
            aspect_ratio: &params.aspect_ratio,
            duration: params.duration.min(MAX_VIDEO_DURATION),
            seed: params.seed,
            watermark: params.watermark,
            interpolate: params.interpolate,
            looping: params.looping,
            negative_prompt: params.negative_prompt.as_deref(),
            camera_motion: params.static_camera.then_some(CameraMotion {
                kind: "static",
                strength: 0,
            }),
            motion_brush: MotionBrush {
                strength: params.motion_strength,
                guidance: params.motion_guidance,
            },
        }),
    })
}

#[derive(Debug, Deserialize)]
struct TaskCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResponse {
    status: String,
    progress: Option<f64>,
    output: Option<Vec<String>>,
    failure: Option<String>,
    failure_code: Option<String>,
}

fn map_status(status: &str) -> JobStatus {
    match status {
        "PENDING" | "THROTTLED" => JobStatus::Pending,
        "RUNNING" => JobStatus::Running,
        "SUCCEEDED" => JobStatus::Succeeded,
        "FAILED" | "CANCELLED" => JobStatus::Failed,
        other => {
            debug!("Unknown task status {other}, treating it as running");
            JobStatus::Running
        }
    }
}

impl From<TaskResponse> for StatusReport {
    fn from(task: TaskResponse) -> Self {
        let details = match (task.failure, task.failure_code) {
            (Some(f), Some(code)) => Some(format!("{f} ({code})")),
            (f, code) => f.or(code),
        };
        StatusReport {
            status: map_status(&task.status),
            progress: task.progress,
            output: task.output.unwrap_or_default(),
            details,
        }
    }
}

impl Provider for Runway {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Runway
    }

    fn submit<'a>(&'a self, request: &'a GenerationRequest) -> ProviderFuture<'a, Submission> {
        Box::pin(async move {
            let key = self.key()?;
            ensure_supported(self.kind(), request)?;
            let body = task_body(request)?;
            let url = format!("{}/v1/{}", self.base_url, body.endpoint());
            info!(
                "Submitting {} task: model={}, duration={}s, prompt={}",
                request.capability(),
                request.params().model,
                request.params().duration.min(MAX_VIDEO_DURATION),
                shorten(request.prompt())
            );

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&key)
                .header("X-Runway-Version", API_VERSION)
                .timeout(SUBMIT_TIMEOUT)
                .json(&body)
                .send()
                .await?;
            let text = check_status(resp).await?.text().await?;
            let created: TaskCreated = serde_json::from_str(&text)?;
            if created.id.is_empty() {
                return Err(GenerationError::Protocol(format!(
                    "Task creation returned an empty id:\n{text}"
                )));
            }

            info!("Task {} accepted", created.id);
            Ok(Submission::Queued(JobId::new(created.id)))
        })
    }

    fn check<'a>(&'a self, job: &'a JobId) -> ProviderFuture<'a, StatusReport> {
        Box::pin(async move {
            let key = self.key()?;
            let resp = self
                .client
                .get(format!("{}/v1/tasks/{job}", self.base_url))
                .bearer_auth(&key)
                .header("X-Runway-Version", API_VERSION)
                .timeout(STATUS_TIMEOUT)
                .send()
                .await?;
            let text = check_status(resp).await?.text().await?;
            let task: TaskResponse = serde_json::from_str(&text)?;
            Ok(task.into())
        })
    }

    fn download<'a>(&'a self, url: &'a str) -> ProviderFuture<'a, Bytes> {
        Box::pin(fetch_bytes(&self.client, url))
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::request::{GenerationParams, ReferenceMedia};

    fn request(capability: Capability, params: GenerationParams) -> GenerationRequest {
        GenerationRequest::new("Deuce dances".into(), capability, params)
    }

    #[test]
    fn image_to_video_body() {
        let params = GenerationParams {
            seed: Some(42),
            negative_prompt: Some("blurry".into()),
            reference: Some(ReferenceMedia::Url("https://x/a.png".into())),
            ..Default::default()
        };
        let req = request(Capability::ImageToVideo, params);
        let body = task_body(&req).unwrap();

        assert_eq!(body.endpoint(), "image_to_video");
        let expect = expect![[r#"{"promptImage":"https://x/a.png","promptText":"Deuce dances","model":"gen3a","aspectRatio":"9:16","duration":10,"seed":42,"watermark":false,"interpolate":true,"loop":false,"negativePrompt":"blurry","cameraMotion":{"type":"static","strength":0},"motionBrush":{"strength":6,"guidance":12}}"#]];
        expect.assert_eq(&serde_json::to_string(&body).unwrap());
    }

    #[test]
    fn fallback_body_is_narrow() {
        let params = GenerationParams {
            duration: 30,
            seed: Some(42),
            negative_prompt: Some("blurry".into()),
            reference: Some(ReferenceMedia::Url("https://x/a.png".into())),
            ..Default::default()
        };
        let req = request(Capability::ImageToVideo, params).narrowed("short".into(), "gen3a_turbo");
        let body = task_body(&req).unwrap();

        let expect = expect![[r#"{"promptImage":"https://x/a.png","promptText":"short","model":"gen3a_turbo","aspectRatio":"9:16","duration":5,"watermark":false,"motionBrush":{"strength":5,"guidance":10}}"#]];
        expect.assert_eq(&serde_json::to_string(&body).unwrap());
    }

    #[test]
    fn duration_is_capped() {
        let params = GenerationParams {
            duration: 30,
            reference: Some(ReferenceMedia::Url("https://x/a.png".into())),
            ..Default::default()
        };
        let req = request(Capability::ImageToVideo, params);
        let TaskBody::ImageToVideo(body) = task_body(&req).unwrap() else {
            panic!("expected an image to video body");
        };
        assert_eq!(body.duration, MAX_VIDEO_DURATION);
    }

    #[test]
    fn video_to_video_body() {
        let params = GenerationParams {
            model: "gen4_aleph".into(),
            reference: Some(ReferenceMedia::Url("https://x/in.mp4".into())),
            ..Default::default()
        };
        let req = request(Capability::VideoToVideo, params);
        let body = task_body(&req).unwrap();

        assert_eq!(body.endpoint(), "video_to_video");
        let expect = expect![[r#"{"videoUri":"https://x/in.mp4","promptText":"Deuce dances","model":"gen4_aleph","aspectRatio":"9:16"}"#]];
        expect.assert_eq(&serde_json::to_string(&body).unwrap());
    }

    #[test]
    fn reference_is_required() {
        let req = request(Capability::ImageToVideo, GenerationParams::default());
        assert!(matches!(
            task_body(&req),
            Err(GenerationError::Configuration(_))
        ));
    }

    #[test]
    fn task_status_mapping() {
        let task: TaskResponse = serde_json::from_str(
            r#"{"id":"job123","status":"FAILED","failure":"Content moderated","failureCode":"SAFETY"}"#,
        )
        .unwrap();
        let report = StatusReport::from(task);
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.details.as_deref(), Some("Content moderated (SAFETY)"));

        let task: TaskResponse = serde_json::from_str(
            r#"{"id":"job123","status":"SUCCEEDED","output":["http://x/a.mp4"]}"#,
        )
        .unwrap();
        let report = StatusReport::from(task);
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(report.output, vec!["http://x/a.mp4".to_string()]);

        assert_eq!(map_status("THROTTLED"), JobStatus::Pending);
        assert_eq!(map_status("SOMETHING_NEW"), JobStatus::Running);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        // nothing listens on the discard port; a request would surface as a transport error
        let runway = Runway::new(None, "http://127.0.0.1:9");
        let params = GenerationParams {
            reference: Some(ReferenceMedia::Url("https://x/a.png".into())),
            ..Default::default()
        };
        let err = runway
            .submit(&request(Capability::ImageToVideo, params))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }
}
