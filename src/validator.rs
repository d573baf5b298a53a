// src/validator.rs

use crate::db::error::ValidationError;

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 6;

/// `local@domain.tld`: без пробелов, одна `@`, в домене есть точка не на краю.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Мобильный номер КНР: 11 цифр, `1`, затем `3`-`9`.
pub fn is_valid_phone(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 11
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
}

pub fn check_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        return Err(ValidationError::NameTooShort(MIN_NAME_LEN));
    }
    Ok(())
}

pub fn check_email(email: &str) -> Result<(), ValidationError> {
    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

pub fn check_phone(phone: &str) -> Result<(), ValidationError> {
    if !is_valid_phone(phone) {
        return Err(ValidationError::InvalidPhone(phone.to_string()));
    }
    Ok(())
}

pub fn check_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(is_valid_email("li.lei@example.cn"));
        assert!(!is_valid_email("li lei@example.cn"));
        assert!(!is_valid_email("lilei.example.cn"));
        assert!(!is_valid_email("@example.cn"));
        assert!(!is_valid_email("lilei@example"));
        assert!(!is_valid_email("lilei@a@b.cn"));
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone("13800138000"));
        assert!(is_valid_phone("19912345678"));
        assert!(!is_valid_phone("12800138000"));
        assert!(!is_valid_phone("1380013800"));
        assert!(!is_valid_phone("1380013800a"));
    }

    #[test]
    fn test_name_and_password() {
        assert_eq!(check_name(" 李 "), Err(ValidationError::NameTooShort(2)));
        assert!(check_name("李雷").is_ok());
        assert_eq!(check_password("12345", "12345"), Err(ValidationError::PasswordTooShort(6)));
        assert_eq!(check_password("123456", "654321"), Err(ValidationError::PasswordMismatch));
        assert!(check_password("123456", "123456").is_ok());
    }
}
