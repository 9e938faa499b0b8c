use proptest::prelude::*;

/// Mobiles the validator accepts: optional leading zero, `9`, then 2 to 9 digits
pub fn mobile_strategy() -> impl Strategy<Value = String> {
    ("(0)?", "[0-9]{2,9}").prop_map(|(zero, rest)| format!("{zero}9{rest}"))
}

/// Alphanumeric message text with inner spaces
pub fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9 ]{0,40}"
}

pub fn tenant_id_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000
}
