//! Log redaction.
//!
//! Hook event payloads, agent responses, and routed message text can carry
//! provider credentials or user secrets (an agent echoing back a bearer
//! token it was handed, a tool call argument containing an API key). Before
//! any of that reaches a `tracing` event — e.g.
//! `workflow_router::MessageRouter`'s debug-gated per-decision log — it is
//! passed through [`sanitize_for_logging`].

/// Redact common secret patterns from a string before logging it.
///
/// # Example
///
/// ```rust
/// use workflow_tooling::logging::sanitize_for_logging;
///
/// let log = "API key: sk-abc123";
/// let sanitized = sanitize_for_logging(log);
/// assert!(sanitized.contains("[REDACTED]"));
/// ```
pub fn sanitize_for_logging(input: &str) -> String {
    let mut result = input.to_string();

    let patterns = [
        (r"(?i)(api[\s_-]?key|apikey)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (r"(?i)(password|passwd|pwd)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (r"(?i)(token)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (r"(?i)(secret)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (r"(?i)(authorization|auth)\s*:\s*bearer\s+\S+", "$1: Bearer [REDACTED]"),
    ];

    for (pattern, replacement) in &patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_api_key() {
        let sanitized = sanitize_for_logging("API key: sk-abc123");
        assert!(sanitized.contains("[REDACTED]"));
        assert!(!sanitized.contains("sk-abc123"));
    }

    #[test]
    fn redacts_bearer_token_in_provider_auth_header() {
        let sanitized = sanitize_for_logging("Authorization: Bearer abc123xyz");
        assert!(sanitized.contains("[REDACTED]"));
        assert!(!sanitized.contains("abc123xyz"));
    }

    #[test]
    fn redacts_secret_in_logged_tool_call_arguments() {
        let logged = "tool call send_email failed: apiKey=sk-live-zzz rejected by provider";
        let sanitized = sanitize_for_logging(logged);
        assert!(!sanitized.contains("sk-live-zzz"));
    }

    #[test]
    fn preserves_non_sensitive_routing_message() {
        let message = "route to billing-agent, conversation_id=abc-123";
        assert_eq!(sanitize_for_logging(message), message);
    }
}
