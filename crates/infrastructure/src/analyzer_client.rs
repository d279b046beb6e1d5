use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tracker_core::{AnalyzerConfig, ExternalError, ReportAnalyzer, ReportPeriod, ReportScore};

/// 评分上限
pub const MAX_SCORE: u8 = 10;

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    period: ReportPeriod,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    score: Option<i64>,
    feedback: Option<String>,
}

/// 通过 HTTP 调用外部评分服务
///
/// 只负责单次调用与错误分类，超时/重试/熔断由容错管道处理。
#[derive(Debug, Clone)]
pub struct HttpReportAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpReportAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn classify_network(err: &reqwest::Error) -> ExternalError {
        if err.is_decode() {
            ExternalError::MalformedResponse(err.to_string())
        } else if err.is_builder() {
            ExternalError::Permanent(err.to_string())
        } else {
            ExternalError::Transient(err.to_string())
        }
    }
}

/// 按 HTTP 状态码分类失败：408、429 与 5xx 可重试，其余视为永久失败
pub fn classify_status(status: u16, body: &str) -> ExternalError {
    let message = format!("HTTP {status}: {}", truncate(body, 200));
    match status {
        408 | 429 | 500..=599 => ExternalError::Transient(message),
        _ => ExternalError::Permanent(message),
    }
}

/// 解析评分服务响应，缺字段、类型错误或分数越界都视为格式错误
pub fn parse_response(body: &str) -> Result<ReportScore, ExternalError> {
    let parsed: AnalyzeResponse = serde_json::from_str(body)
        .map_err(|e| ExternalError::MalformedResponse(format!("无效的JSON: {e}")))?;

    let score = parsed
        .score
        .ok_or_else(|| ExternalError::MalformedResponse("缺少 score 字段".to_string()))?;
    let score = u8::try_from(score)
        .ok()
        .filter(|s| *s <= MAX_SCORE)
        .ok_or_else(|| ExternalError::MalformedResponse(format!("分数越界: {score}")))?;

    Ok(ReportScore {
        score,
        feedback: parsed.feedback.unwrap_or_default(),
    })
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[async_trait]
impl ReportAnalyzer for HttpReportAnalyzer {
    async fn analyze(
        &self,
        period: ReportPeriod,
        text: &str,
    ) -> Result<ReportScore, ExternalError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest { period, text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!("评分服务请求失败: {}", e);
            Self::classify_network(&e)
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify_network(&e))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        debug!("评分服务响应: {} 字节", body.len());
        parse_response(&body)
    }
}
