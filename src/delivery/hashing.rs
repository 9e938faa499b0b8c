//! Content hashes and debit ledger ids.

use bigdecimal::BigDecimal;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hex sha256 of `{tenant_id}:{mobile}:{text}`.
///
/// Used as the message's content hash, the broker partition key and the
/// ledger row's `message_hash_id`.
pub fn content_hash(tenant_id: i64, mobile: &str, text: &str) -> String {
    let digest = Sha256::digest(format!("{tenant_id}:{mobile}:{text}").as_bytes());
    hex::encode(digest)
}

/// Raw 32-byte sha256 identifying one debit.
///
/// Covers the balance left after the debit, so two debits for the same
/// content on the same credit row never collide while a replayed debit for
/// the same state does, and is rejected by the primary key.
pub fn transaction_id(
    tenant_uuid: Uuid,
    credit_uuid: Uuid,
    resulting_balance: &BigDecimal,
    price: &BigDecimal,
    message_hash: &str,
) -> Vec<u8> {
    let data = format!(
        "{tenant_uuid}:{credit_uuid}:{}:{}:{message_hash}",
        resulting_balance.normalized(),
        price.normalized()
    );
    Sha256::digest(data.as_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_content_hash_known_value() {
        // sha256("1:09120000000:hi")
        let hash = content_hash(1, "09120000000", "hi");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hex::encode(Sha256::digest(b"1:09120000000:hi")));
    }

    #[test]
    fn test_content_hash_changes_with_text() {
        assert_ne!(
            content_hash(1, "09120000000", "hi"),
            content_hash(1, "09120000000", "hi!")
        );
    }

    #[test]
    fn test_transaction_id_ignores_decimal_scale() {
        let tenant = Uuid::new_v4();
        let credit = Uuid::new_v4();
        let price = BigDecimal::from_str("8.9").unwrap();

        let a = transaction_id(
            tenant,
            credit,
            &BigDecimal::from_str("1.1").unwrap(),
            &price,
            "h",
        );
        let b = transaction_id(
            tenant,
            credit,
            &BigDecimal::from_str("1.1000").unwrap(),
            &BigDecimal::from_str("8.9000").unwrap(),
            "h",
        );
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
    }

    #[test]
    fn test_transaction_id_depends_on_balance() {
        let tenant = Uuid::new_v4();
        let credit = Uuid::new_v4();
        let price = BigDecimal::from_str("8.9").unwrap();

        let first = transaction_id(tenant, credit, &BigDecimal::from(20), &price, "h");
        let second = transaction_id(tenant, credit, &BigDecimal::from(11), &price, "h");
        assert_ne!(first, second);
    }
}
