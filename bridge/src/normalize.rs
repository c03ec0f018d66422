//! Normalization of the bridge's inconsistent response shapes.
//!
//! The bridge returns one of `{ok, text}`, `{text}`, or `{data: {name, text}}`
//! on success, and arbitrary HTML or half-formed JSON on failure. Everything
//! collapses into [`NormalizedRecord`] or a [`BridgeError`].

use crate::client::BridgeError;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

/// Maximum number of characters of an upstream body echoed in diagnostics.
pub const BODY_PREVIEW_LEN: usize = 500;

/// Canonical success shape for a fetched document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub ok: bool,
    pub alias: String,
    pub name: Option<String>,
    pub text: String,
}

/// Collapses an upstream response into a [`NormalizedRecord`].
///
/// The success predicate reproduces the bridge's unreliable signaling
/// exactly: the transport status must be a success AND at least one of
/// `payload.ok`, `payload.text`, `payload.data.text` must be present and
/// truthy. A body that is not JSON at all is a distinguishable
/// [`BridgeError::Html`] carrying a truncated preview.
pub fn normalize_payload(
    alias: &str,
    status: StatusCode,
    content_type: &str,
    body: &str,
) -> Result<NormalizedRecord, BridgeError> {
    if !is_json_media_type(content_type) {
        return Err(BridgeError::Html {
            status: status.as_u16(),
            content_type: content_type.to_string(),
            body_preview: preview(body),
        });
    }

    // An unparseable body is treated as the empty object, so it falls
    // through to the failure branch with whatever could be salvaged.
    let payload: Value =
        serde_json::from_str(body).unwrap_or_else(|_| Value::Object(Default::default()));

    let data_text = payload.pointer("/data/text");
    let succeeded = status.is_success()
        && (is_truthy(payload.get("ok")) || is_truthy(payload.get("text")) || is_truthy(data_text));

    if !succeeded {
        return Err(BridgeError::Failed {
            status: status.as_u16(),
            source: payload,
        });
    }

    // `data.*` wins over the top-level fields.
    let text = string_field(data_text)
        .or_else(|| string_field(payload.get("text")))
        .unwrap_or_default();
    let name =
        string_field(payload.pointer("/data/name")).or_else(|| string_field(payload.get("name")));

    Ok(NormalizedRecord {
        ok: true,
        alias: alias.to_string(),
        name,
        text,
    })
}

fn is_json_media_type(content_type: &str) -> bool {
    content_type.contains("application/json")
}

/// JSON truthiness the way the bridge's original consumers read it:
/// `false`, `0`, `""`, `null`, and absent are falsy, everything else truthy.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

/// First [`BODY_PREVIEW_LEN`] characters of an untrusted upstream body.
pub fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_LEN).collect()
}
