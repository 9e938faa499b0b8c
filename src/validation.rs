//! Input validation for outgoing messages
//!
//! Rules applied before any side effect of a send: channel membership, mobile
//! number shape, and text content and length. Shape problems are
//! `Validation` errors; the length limit is a business rule and is reported
//! as a `Conflict`.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::topics;
use crate::error::{SmsGateError, SmsGateResult};

/// Mobile numbers after digit normalization and stripping of non-digits
const MOBILE_PATTERN: &str = r"^(09|9)\d{2,9}$";

/// Letters, digits, whitespace, underscore and dash in any script
const TEXT_PATTERN: &str = r"^[\p{L}\p{N}\s_-]+$";

/// A send request as received from a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub channel: String,
    pub mobile: String,
    #[serde(rename = "message")]
    pub text: String,
}

impl SendMessageRequest {
    pub fn new(
        channel: impl Into<String>,
        mobile: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            mobile: mobile.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageValidator {
    mobile: Regex,
    text: Regex,
    max_length: usize,
}

impl MessageValidator {
    pub fn new(max_length: usize) -> SmsGateResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| SmsGateError::failed(format!("invalid pattern {pattern}: {e}")))
        };

        Ok(Self {
            mobile: compile(MOBILE_PATTERN)?,
            text: compile(TEXT_PATTERN)?,
            max_length,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Check every rule; the first one broken is returned
    pub fn validate(&self, request: &SendMessageRequest) -> SmsGateResult<()> {
        self.validate_channel(&request.channel)?;
        self.validate_mobile(&request.mobile)?;
        self.validate_text(&request.text)
    }

    pub fn validate_channel(&self, channel: &str) -> SmsGateResult<()> {
        if topics::CHANNELS.contains(&channel) {
            Ok(())
        } else {
            Err(SmsGateError::validation(format!(
                "channel must be one of {}, got '{channel}'",
                topics::CHANNELS.join(", ")
            )))
        }
    }

    pub fn validate_mobile(&self, mobile: &str) -> SmsGateResult<()> {
        if mobile.is_empty() {
            return Err(SmsGateError::validation("mobile is required"));
        }

        let cleaned = clean_mobile(mobile);
        if self.mobile.is_match(&cleaned) {
            Ok(())
        } else {
            Err(SmsGateError::validation(format!(
                "mobile number '{mobile}' is malformed"
            )))
        }
    }

    /// Length is counted in characters, not bytes
    pub fn validate_text(&self, text: &str) -> SmsGateResult<()> {
        if text.is_empty() {
            return Err(SmsGateError::validation("message text is required"));
        }
        if !self.text.is_match(text) {
            return Err(SmsGateError::validation(
                "message text may only contain letters, digits, spaces, '_' and '-'",
            ));
        }

        let length = text.chars().count();
        if length > self.max_length {
            return Err(SmsGateError::conflict(format!(
                "message text is {length} characters, the limit is {}",
                self.max_length
            )));
        }
        Ok(())
    }
}

/// Map Persian and Arabic-Indic digits to ASCII
pub fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            other => other,
        })
        .collect()
}

/// Normalized digits only, with separators and signs removed
pub fn clean_mobile(mobile: &str) -> String {
    normalize_digits(mobile)
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::billing;

    fn validator() -> MessageValidator {
        MessageValidator::new(billing::MAX_MESSAGE_LENGTH).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let request = SendMessageRequest::new("event.prod", "09123456789", "some dummy message");
        assert!(validator().validate(&request).is_ok());
    }

    #[test]
    fn test_channel_must_be_a_channel_topic() {
        let v = validator();
        assert!(v.validate_channel("event.express").is_ok());

        let err = v.validate_channel("event.retry").unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(v.validate_channel("").is_err());
    }

    #[test]
    fn test_mobile_rules() {
        let v = validator();
        assert!(v.validate_mobile("09123456789").is_ok());
        assert!(v.validate_mobile("9123456789").is_ok());
        assert!(v.validate_mobile("0912-345-6789").is_ok());
        assert!(v.validate_mobile("۰۹۱۲۳۴۵۶۷۸۹").is_ok());
        assert!(v.validate_mobile("٠٩١٢٣٤٥٦٧٨٩").is_ok());

        assert!(v.validate_mobile("").is_err());
        assert!(v.validate_mobile("08123456789").is_err());
        assert!(v.validate_mobile("091234567890").is_err());
        assert!(v.validate_mobile("91").is_err());
    }

    #[test]
    fn test_digit_normalization() {
        assert_eq!(normalize_digits("۰۱۲۳۴۵۶۷۸۹"), "0123456789");
        assert_eq!(normalize_digits("٠١٢٣٤٥٦٧٨٩"), "0123456789");
        assert_eq!(clean_mobile("+98 (912) ۱۲۳"), "98912123");
    }

    #[test]
    fn test_text_length_is_a_conflict() {
        let v = validator();
        assert!(v.validate_text(&"a".repeat(160)).is_ok());

        let err = v.validate_text(&"a".repeat(161)).unwrap_err();
        assert!(matches!(err, SmsGateError::Conflict(_)));
    }

    #[test]
    fn test_text_length_counts_characters() {
        // 160 two-byte characters fit
        let persian = "س".repeat(160);
        assert!(validator().validate_text(&persian).is_ok());
    }

    #[test]
    fn test_text_content_rules() {
        let v = validator();
        assert!(v.validate_text("سلام دنیا 123").is_ok());
        assert!(matches!(
            v.validate_text(""),
            Err(SmsGateError::Validation(_))
        ));
        assert!(matches!(
            v.validate_text("<script>"),
            Err(SmsGateError::Validation(_))
        ));
    }

    #[test]
    fn test_request_uses_message_field_on_the_wire() {
        let request: SendMessageRequest = serde_json::from_str(
            r#"{"channel":"event.prod","mobile":"09123456789","message":"hello"}"#,
        )
        .unwrap();
        assert_eq!(request.text, "hello");
    }
}
