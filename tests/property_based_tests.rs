mod common;

use bigdecimal::BigDecimal;
use common::strategies::*;
use proptest::prelude::*;
use uuid::Uuid;

use smsgate_core::delivery::{content_hash, transaction_id};
use smsgate_core::validation::{clean_mobile, MessageValidator};

proptest! {
    /// Property: the content hash is 64 lowercase hex characters and stable
    #[test]
    fn content_hash_is_stable_hex(tenant_id in tenant_id_strategy(), mobile in mobile_strategy(), text in text_strategy()) {
        let hash = content_hash(tenant_id, &mobile, &text);
        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        prop_assert_eq!(hash, content_hash(tenant_id, &mobile, &text));
    }

    /// Property: the same text sent by two tenants never shares a hash
    #[test]
    fn content_hash_separates_tenants(tenant_id in tenant_id_strategy(), mobile in mobile_strategy(), text in text_strategy()) {
        prop_assert_ne!(
            content_hash(tenant_id, &mobile, &text),
            content_hash(tenant_id + 1, &mobile, &text)
        );
    }

    /// Property: transaction ids are 32 raw bytes and depend on the remaining balance
    #[test]
    fn transaction_id_tracks_balance(cents in 0i64..10_000_000, hash in "[0-9a-f]{64}") {
        let tenant = Uuid::new_v4();
        let credit = Uuid::new_v4();
        let price = BigDecimal::new(89.into(), 1);
        let balance = BigDecimal::new(cents.into(), 2);
        let next = BigDecimal::new((cents + 1).into(), 2);

        let id = transaction_id(tenant, credit, &balance, &price, &hash);
        prop_assert_eq!(id.len(), 32);
        prop_assert_ne!(id, transaction_id(tenant, credit, &next, &price, &hash));
    }

    /// Property: generated mobiles pass validation, with or without separators
    #[test]
    fn valid_mobiles_are_accepted(mobile in mobile_strategy()) {
        let validator = MessageValidator::new(160).unwrap();
        prop_assert!(validator.validate_mobile(&mobile).is_ok());

        let spaced: String = mobile.chars().flat_map(|c| [c, ' ']).collect();
        prop_assert_eq!(clean_mobile(&spaced), mobile.clone());
        prop_assert!(validator.validate_mobile(&spaced).is_ok());
    }

    /// Property: text at or under the limit passes, one character over is a conflict
    #[test]
    fn length_limit_counts_characters(text in text_strategy()) {
        let limit = text.chars().count();
        let validator = MessageValidator::new(limit).unwrap();
        prop_assert!(validator.validate_text(&text).is_ok());

        let longer = format!("{text}x");
        prop_assert!(matches!(
            validator.validate_text(&longer),
            Err(smsgate_core::SmsGateError::Conflict(_))
        ));
    }
}
