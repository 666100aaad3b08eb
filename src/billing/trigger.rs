use url::Url;

/// Query parameters the billing provider appends when sending the user back.
const REFERENCE_PARAMS: &[&str] = &["session_id", "checkout_session_id"];

/// Extracts the provider-assigned checkout reference from a return URL.
///
/// Accepts absolute URLs as well as bare paths such as
/// `/billing?session_id=cs_test_123`.
pub fn checkout_reference(return_url: &str) -> Option<String> {
    let trimmed = return_url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = Url::parse(trimmed)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(trimmed)))
        .ok()?;

    REFERENCE_PARAMS.iter().find_map(|name| {
        parsed
            .query_pairs()
            .find(|(key, value)| *key == *name && !value.trim().is_empty())
            .map(|(_, value)| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_id_in_absolute_url() {
        assert_eq!(
            checkout_reference("https://app.scholarflow.io/billing?session_id=cs_test_123&tab=plan"),
            Some("cs_test_123".to_string())
        );
    }

    #[test]
    fn finds_reference_in_relative_path() {
        assert_eq!(
            checkout_reference("/dashboard/billing?checkout_session_id=cs_live_9"),
            Some("cs_live_9".to_string())
        );
    }

    #[test]
    fn missing_or_blank_reference_disables_sync() {
        assert_eq!(checkout_reference("https://app.scholarflow.io/billing"), None);
        assert_eq!(checkout_reference("/billing?session_id="), None);
        assert_eq!(checkout_reference("   "), None);
    }
}
