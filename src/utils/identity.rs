use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NATIONAL_ID_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-.]").unwrap());

/// 姓名: 去掉首尾空白并合并中间多余空白
pub fn normalize_display_name(name: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(name.trim(), " ");
    non_empty(collapsed.into_owned())
}

/// 身份证号: 去掉空格/横线/点并转大写
pub fn normalize_national_id(id: &str) -> Option<String> {
    let stripped = NATIONAL_ID_SEPARATORS.replace_all(id.trim(), "");
    non_empty(stripped.to_uppercase())
}

/// 手机号: 只保留数字，保留开头的 '+'
pub fn normalize_phone(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits)
    }
}

/// 券号: 去掉首尾空白并转大写
pub fn normalize_voucher(voucher: &str) -> Option<String> {
    non_empty(voucher.trim().to_uppercase())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
