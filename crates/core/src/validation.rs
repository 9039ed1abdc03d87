pub const CARD_NUMBER_LEN: usize = 9;

pub fn is_valid_card_number(value: &str) -> bool {
    value.len() == CARD_NUMBER_LEN && value.bytes().all(|byte| byte.is_ascii_digit())
}
