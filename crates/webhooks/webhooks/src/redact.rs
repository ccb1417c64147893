//! Header redaction applied before a request is handed to the webhook log
//! store. Never affects signature verification, which runs against the
//! original headers.

use std::collections::HashMap;

use supasaasy_core::types::WebhookLog;

/// Replaces sensitive header values (`authorization`, anything containing
/// `signature` or `cookie`, case-insensitively) with a redaction marker.
pub fn redact_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            if WebhookLog::is_sensitive_header(name) {
                (name.clone(), WebhookLog::REDACTION_MARKER.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}
