//! HTTP client for the letter prediction service.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

use super::{RecognitionConfig, RecognitionResult, Recognizer, RequestEncoding};
use crate::normalizer::NormalizedImage;

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Default, Deserialize)]
struct PredictResponse {
    success: Option<bool>,
    letter: Option<String>,
    predicted_letter: Option<String>,
    confidence: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LettersResponse {
    letters: Vec<String>,
}

pub struct HttpRecognizer {
    endpoint: Url,
    letters_endpoint: Url,
    encoding: RequestEncoding,
    agent: ureq::Agent,
}

impl HttpRecognizer {
    pub fn new(config: &RecognitionConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .with_context(|| format!("invalid recognition endpoint {}", config.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!(
                "recognition endpoint must be http(s), got {}",
                endpoint
            ));
        }
        let letters_endpoint = match &config.letters_endpoint {
            Some(raw) => {
                Url::parse(raw).with_context(|| format!("invalid letters endpoint {}", raw))?
            }
            None => endpoint
                .join("../letters/")
                .context("derive letters endpoint")?,
        };
        if config.timeout_ms == 0 {
            return Err(anyhow!("recognition timeout must be positive"));
        }
        Ok(Self {
            endpoint,
            letters_endpoint,
            encoding: config.encoding,
            agent: ureq::AgentBuilder::new()
                .timeout(config.timeout())
                .build(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn letters_endpoint(&self) -> &Url {
        &self.letters_endpoint
    }

    /// Alphabet the service can answer with.
    pub fn letters(&self) -> Result<Vec<char>> {
        let response = self
            .agent
            .get(self.letters_endpoint.as_str())
            .call()
            .with_context(|| format!("fetch letters from {}", self.letters_endpoint))?;
        let body = response.into_string().context("read letters response")?;
        let parsed: LettersResponse =
            serde_json::from_str(&body).context("parse letters response")?;
        parsed
            .letters
            .iter()
            .map(|raw| parse_letter(raw).map_err(|e| anyhow!(e)))
            .collect()
    }

    fn send(&self, image: &NormalizedImage) -> Result<(u16, String), String> {
        let data_url = image.to_data_url();
        let request = self.agent.post(self.endpoint.as_str());
        let outcome = match self.encoding {
            RequestEncoding::Json => {
                let body = serde_json::json!({ "image": data_url }).to_string();
                request
                    .set("Content-Type", "application/json")
                    .send_string(&body)
            }
            RequestEncoding::Form => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("image", &data_url)
                    .finish();
                request
                    .set("Content-Type", "application/x-www-form-urlencoded")
                    .send_string(&body)
            }
        };
        match outcome {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|e| format!("read response: {}", e))?;
                Ok((status, body))
            }
            Err(ureq::Error::Status(status, response)) => {
                Ok((status, response.into_string().unwrap_or_default()))
            }
            Err(ureq::Error::Transport(err)) => Err(format!("transport error: {}", err)),
        }
    }
}

impl Recognizer for HttpRecognizer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn submit(&self, image: &NormalizedImage) -> RecognitionResult {
        let result = match self.send(image) {
            Ok((status, body)) => interpret_response(status, &body),
            Err(reason) => RecognitionResult::failure(reason),
        };
        if let Some(reason) = &result.failure_reason {
            log::warn!("recognition via {} failed: {}", self.endpoint, reason);
        }
        result
    }
}

/// Map a status and body onto a result. Anything short of a well-formed
/// success becomes a failure carrying the best available reason.
fn interpret_response(status: u16, body: &str) -> RecognitionResult {
    let parsed: Option<PredictResponse> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let detail = parsed
            .and_then(|p| p.error)
            .unwrap_or_else(|| truncate(body.trim(), MAX_ERROR_BODY));
        return if detail.is_empty() {
            RecognitionResult::failure(format!("service returned HTTP {}", status))
        } else {
            RecognitionResult::failure(format!("service returned HTTP {}: {}", status, detail))
        };
    }

    let Some(parsed) = parsed else {
        return RecognitionResult::failure("malformed response: not a JSON object");
    };
    if parsed.success == Some(false) {
        return RecognitionResult::failure(
            parsed
                .error
                .unwrap_or_else(|| "service reported failure".to_string()),
        );
    }
    let Some(raw_label) = parsed.letter.or(parsed.predicted_letter) else {
        return RecognitionResult::failure("malformed response: missing letter");
    };
    let label = match parse_letter(&raw_label) {
        Ok(label) => label,
        Err(reason) => return RecognitionResult::failure(format!("malformed response: {}", reason)),
    };
    let confidence = match parsed.confidence {
        Some(c) if c.is_finite() && (0.0..=1.0).contains(&c) => c as f32,
        Some(c) => {
            return RecognitionResult::failure(format!(
                "malformed response: confidence {} outside [0, 1]",
                c
            ))
        }
        None => return RecognitionResult::failure("malformed response: missing confidence"),
    };
    RecognitionResult::success(label, confidence)
}

fn parse_letter(raw: &str) -> Result<char, String> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Ok(c),
        _ => Err(format!("label {:?} is not a single letter A-Z", raw)),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_either_label_field() {
        let a = interpret_response(200, r#"{"success":true,"letter":"A","confidence":0.9}"#);
        assert_eq!(a.label, Some('A'));
        assert!(a.succeeded);
        let b = interpret_response(200, r#"{"predicted_letter":"Q","confidence":0.25}"#);
        assert_eq!(b.label, Some('Q'));
        assert!((b.confidence - 0.25).abs() < 1e-6);
    }

    #[test]
    fn error_status_surfaces_service_error() {
        let result = interpret_response(500, r#"{"success":false,"error":"Model not loaded"}"#);
        assert!(!result.succeeded);
        assert_eq!(
            result.failure_reason.as_deref(),
            Some("service returned HTTP 500: Model not loaded")
        );
    }

    #[test]
    fn error_status_with_plain_body() {
        let result = interpret_response(502, "Bad Gateway");
        assert_eq!(
            result.failure_reason.as_deref(),
            Some("service returned HTTP 502: Bad Gateway")
        );
    }

    #[test]
    fn success_false_is_a_failure_even_with_200() {
        let result = interpret_response(200, r#"{"success":false,"error":"No image data provided"}"#);
        assert_eq!(result.failure_reason.as_deref(), Some("No image data provided"));
    }

    #[test]
    fn malformed_bodies_fail() {
        for body in [
            "not json",
            r#"{"success":true,"confidence":0.5}"#,
            r#"{"letter":"AB","confidence":0.5}"#,
            r#"{"letter":"a","confidence":0.5}"#,
            r#"{"letter":"A","confidence":1.5}"#,
            r#"{"letter":"A"}"#,
        ] {
            let result = interpret_response(200, body);
            assert!(!result.succeeded, "{} should fail", body);
            assert!(result.label.is_none());
        }
    }

    #[test]
    fn letters_endpoint_defaults_next_to_predict() -> Result<()> {
        let recognizer = HttpRecognizer::new(&RecognitionConfig::default())?;
        assert_eq!(
            recognizer.letters_endpoint().as_str(),
            "http://127.0.0.1:8000/api/asl/letters/"
        );
        Ok(())
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let config = RecognitionConfig {
            endpoint: "ftp://example.com/predict".to_string(),
            ..RecognitionConfig::default()
        };
        assert!(HttpRecognizer::new(&config).is_err());
    }
}
