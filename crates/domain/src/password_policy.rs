//! 密码强度策略
//!
//! 校验顺序固定：长度下限、长度上限、大写、小写、数字、符号，
//! 返回第一条不满足的规则。

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// 密码不满足强度要求的具体原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordViolation {
    TooShort { min: usize },
    TooLong { max: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSymbol,
}

impl fmt::Display for PasswordViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { min } => write!(f, "password must be at least {min} characters"),
            Self::TooLong { max } => write!(f, "password must be at most {max} characters"),
            Self::MissingUppercase => f.write_str("password must contain an uppercase letter"),
            Self::MissingLowercase => f.write_str("password must contain a lowercase letter"),
            Self::MissingDigit => f.write_str("password must contain a digit"),
            Self::MissingSymbol => f.write_str("password must contain a special character"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSWORD_LENGTH,
            max_length: MAX_PASSWORD_LENGTH,
        }
    }
}

impl PasswordPolicy {
    pub fn with_min_length(min_length: usize) -> Self {
        Self {
            min_length,
            ..Self::default()
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordViolation> {
        let len = password.chars().count();
        if len < self.min_length {
            return Err(PasswordViolation::TooShort {
                min: self.min_length,
            });
        }
        if len > self.max_length {
            return Err(PasswordViolation::TooLong {
                max: self.max_length,
            });
        }

        let (mut upper, mut lower, mut digit, mut symbol) = (false, false, false, false);
        for c in password.chars() {
            if c.is_uppercase() {
                upper = true;
            } else if c.is_lowercase() {
                lower = true;
            } else if c.is_numeric() {
                digit = true;
            } else if is_symbol(c) {
                symbol = true;
            }
        }

        if !upper {
            return Err(PasswordViolation::MissingUppercase);
        }
        if !lower {
            return Err(PasswordViolation::MissingLowercase);
        }
        if !digit {
            return Err(PasswordViolation::MissingDigit);
        }
        if !symbol {
            return Err(PasswordViolation::MissingSymbol);
        }
        Ok(())
    }
}

// 标点与符号都算特殊字符；空白和控制字符不算
fn is_symbol(c: char) -> bool {
    c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace() && !c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_strong_password() {
        assert_eq!(PasswordPolicy::default().validate("Abcdef1!"), Ok(()));
    }

    #[test]
    fn reports_violations_in_order() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            policy.validate("Ab1!"),
            Err(PasswordViolation::TooShort { min: 8 })
        );
        assert_eq!(
            policy.validate(&format!("Aa1!{}", "x".repeat(125))),
            Err(PasswordViolation::TooLong { max: 128 })
        );
        assert_eq!(
            policy.validate("abcdefg1!"),
            Err(PasswordViolation::MissingUppercase)
        );
        assert_eq!(
            policy.validate("ABCDEFG1!"),
            Err(PasswordViolation::MissingLowercase)
        );
        assert_eq!(
            policy.validate("Abcdefgh!"),
            Err(PasswordViolation::MissingDigit)
        );
        assert_eq!(
            policy.validate("Abcdefgh1"),
            Err(PasswordViolation::MissingSymbol)
        );
    }

    #[test]
    fn whitespace_is_not_a_symbol() {
        assert_eq!(
            PasswordPolicy::default().validate("Abcdef1 "),
            Err(PasswordViolation::MissingSymbol)
        );
    }

    #[test]
    fn custom_minimum_is_respected() {
        let policy = PasswordPolicy::with_min_length(12);
        assert_eq!(
            policy.validate("Abcdef1!"),
            Err(PasswordViolation::TooShort { min: 12 })
        );
        assert!(policy.validate("Abcdefghij1!").is_ok());
    }
}
