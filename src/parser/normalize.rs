use thiserror::Error;

use super::blocks::collapse_whitespace;
use super::extract::{FieldKind, RawCandidate};
use crate::config::ExtractConfig;

/// Two-digit ITU country codes; zones 1 and 7 use one digit, everything else three.
const TWO_DIGIT_CODES: &[&str] = &[
    "20", "27", "30", "31", "32", "33", "34", "36", "39", "40", "41", "43", "44", "45", "46",
    "47", "48", "49", "51", "52", "53", "54", "55", "56", "57", "58", "60", "61", "62", "63",
    "64", "65", "66", "81", "82", "84", "86", "90", "91", "92", "93", "94", "95", "98",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalField {
    Name(String),
    Email(String),
    Phone(String),
}

impl CanonicalField {
    pub fn kind(&self) -> FieldKind {
        match self {
            CanonicalField::Name(_) => FieldKind::Name,
            CanonicalField::Email(_) => FieldKind::Email,
            CanonicalField::Phone(_) => FieldKind::Phone,
        }
    }

    pub fn into_value(self) -> String {
        match self {
            CanonicalField::Name(v) | CanonicalField::Email(v) | CanonicalField::Phone(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid email address `{0}`")]
    InvalidEmail(String),
    #[error("phone `{text}` has {digits} digits")]
    PhoneDigits { text: String, digits: usize },
    #[error("empty name")]
    EmptyName,
    #[error("name longer than {max} characters")]
    NameTooLong { max: usize },
    #[error("name `{0}` contains digits")]
    NameHasDigits(String),
}

pub fn normalize(candidate: &RawCandidate, cfg: &ExtractConfig) -> Result<CanonicalField, Rejection> {
    match candidate.kind {
        FieldKind::Name => normalize_name(&candidate.text, cfg.max_name_length).map(CanonicalField::Name),
        FieldKind::Email => normalize_email(&candidate.text).map(CanonicalField::Email),
        FieldKind::Phone => normalize_phone(&candidate.text, cfg).map(CanonicalField::Phone),
    }
}

pub fn normalize_email(raw: &str) -> Result<String, Rejection> {
    let email = raw.trim().to_lowercase();

    let valid = !email.chars().any(char::is_whitespace)
        && email.matches('@').count() == 1
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });

    if valid {
        Ok(email)
    } else {
        Err(Rejection::InvalidEmail(email))
    }
}

pub fn normalize_phone(raw: &str, cfg: &ExtractConfig) -> Result<String, Rejection> {
    let (international, digits) = phone_digits(raw);
    if !(cfg.min_phone_digits..=cfg.max_phone_digits).contains(&digits.len()) {
        return Err(Rejection::PhoneDigits {
            text: raw.trim().to_string(),
            digits: digits.len(),
        });
    }

    if !international {
        return Ok(group_digits(&digits));
    }

    let (code, rest) = digits.split_at(country_code_len(&digits));
    if rest.is_empty() {
        Ok(format!("+{}", code))
    } else {
        Ok(format!("+{} {}", code, group_digits(rest)))
    }
}

/// Split a raw phone into (international, digits). A leading `+`, or digits
/// starting with the `00` exit prefix, mark international form; the `00` itself
/// is not part of the number.
pub fn phone_digits(raw: &str) -> (bool, String) {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        (true, digits)
    } else if let Some(rest) = digits.strip_prefix("00") {
        (true, rest.to_string())
    } else {
        (false, digits)
    }
}

fn country_code_len(digits: &str) -> usize {
    let len = match digits.as_bytes().first() {
        Some(b'1') | Some(b'7') => 1,
        _ if digits.get(..2).is_some_and(|p| TWO_DIGIT_CODES.contains(&p)) => 2,
        _ => 3,
    };
    len.min(digits.len())
}

/// Blocks of 3-4 digits, longer blocks last: 7 → 3+4, 10 → 3+3+4, 12 → 4+4+4.
fn group_digits(digits: &str) -> String {
    let n = digits.len();
    if n <= 4 {
        return digits.to_string();
    }
    let blocks = n.div_ceil(4);
    let base = n / blocks;
    let longer = n % blocks;

    let mut parts = Vec::with_capacity(blocks);
    let mut pos = 0;
    for i in 0..blocks {
        let len = base + usize::from(i >= blocks - longer);
        parts.push(&digits[pos..pos + len]);
        pos += len;
    }
    parts.join(" ")
}

pub fn normalize_name(raw: &str, max_len: usize) -> Result<String, Rejection> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return Err(Rejection::EmptyName);
    }
    if collapsed.chars().any(char::is_numeric) {
        return Err(Rejection::NameHasDigits(collapsed));
    }
    let name = title_case(&collapsed);
    if name.chars().count() > max_len {
        return Err(Rejection::NameTooLong { max: max_len });
    }
    Ok(name)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract::Locator;

    fn cfg() -> ExtractConfig {
        ExtractConfig::default()
    }

    #[test]
    fn email_lowercased_and_trimmed() {
        assert_eq!(normalize_email("  John.Doe@EXAMPLE.com ").unwrap(), "john.doe@example.com");
    }

    #[test]
    fn email_rejections() {
        for bad in ["not-an-email", "a@@b.com", "a@b@c.com", "@x.com", "a@", "a@localhost", "a b@x.com", "a@.com", "a@x.com."] {
            assert!(
                matches!(normalize_email(bad), Err(Rejection::InvalidEmail(_))),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn national_phone_grouping() {
        assert_eq!(normalize_phone("(555) 123-4567", &cfg()).unwrap(), "555 123 4567");
        assert_eq!(normalize_phone("555.1234", &cfg()).unwrap(), "555 1234");
        assert_eq!(normalize_phone("12345678", &cfg()).unwrap(), "1234 5678");
        assert_eq!(normalize_phone("01234567890", &cfg()).unwrap(), "012 3456 7890");
    }

    #[test]
    fn phone_digit_bounds() {
        assert_eq!(
            normalize_phone("123", &cfg()),
            Err(Rejection::PhoneDigits {
                text: "123".into(),
                digits: 3
            })
        );
        assert!(normalize_phone("1234567890123456", &cfg()).is_err());
        let strict = ExtractConfig {
            min_phone_digits: 10,
            ..cfg()
        };
        assert!(normalize_phone("555 1234", &strict).is_err());
    }

    #[test]
    fn international_phones() {
        assert_eq!(normalize_phone("+44 20 7946 0958", &cfg()).unwrap(), "+44 207 946 0958");
        assert_eq!(normalize_phone("0044 20 7946 0958", &cfg()).unwrap(), "+44 207 946 0958");
        assert_eq!(normalize_phone("+1 (555) 123-4567", &cfg()).unwrap(), "+1 555 123 4567");
        assert_eq!(normalize_phone("+353 1 234 5678", &cfg()).unwrap(), "+353 1234 5678");
    }

    #[test]
    fn phone_normalization_idempotent() {
        for raw in [
            "(555) 123-4567",
            "+44 20 7946 0958",
            "0049 30 1234567",
            "555.1234",
            "+7 495 123 45 67",
            "(001) 234-5678",
            "00 (44) 20-7946-0958",
        ] {
            let once = normalize_phone(raw, &cfg()).unwrap();
            assert_eq!(normalize_phone(&once, &cfg()).unwrap(), once);
        }
    }

    #[test]
    fn punctuated_exit_prefix() {
        assert_eq!(normalize_phone("(001) 234-5678", &cfg()).unwrap(), "+1 234 5678");
        assert_eq!(normalize_phone("(00) 44 20 7946 0958", &cfg()).unwrap(), "+44 207 946 0958");
    }

    #[test]
    fn name_title_case() {
        assert_eq!(normalize_name("  jane   SMITH ", 100).unwrap(), "Jane Smith");
        assert_eq!(normalize_name("mary-jane o'brien", 100).unwrap(), "Mary-Jane O'Brien");
    }

    #[test]
    fn name_rejections() {
        assert_eq!(normalize_name("   ", 100), Err(Rejection::EmptyName));
        assert!(matches!(normalize_name("Agent 007", 100), Err(Rejection::NameHasDigits(_))));
        assert_eq!(normalize_name("Jane Smith", 5), Err(Rejection::NameTooLong { max: 5 }));
    }

    #[test]
    fn canonical_values_unchanged() {
        assert_eq!(normalize_email("john.doe@example.com").unwrap(), "john.doe@example.com");
        assert_eq!(normalize_name("Jane Smith", 100).unwrap(), "Jane Smith");
    }

    #[test]
    fn dispatch_by_kind() {
        let candidate = |kind, text: &str| RawCandidate {
            kind,
            text: text.to_string(),
            locator: Locator {
                group: 0,
                block: 0,
                offset: 0,
            },
        };
        assert_eq!(
            normalize(&candidate(FieldKind::Email, "A@B.io"), &cfg()),
            Ok(CanonicalField::Email("a@b.io".into()))
        );
        assert_eq!(
            normalize(&candidate(FieldKind::Name, "ann lee"), &cfg()).map(|f| f.kind()),
            Ok(FieldKind::Name)
        );
        assert!(normalize(&candidate(FieldKind::Phone, "12"), &cfg()).is_err());
    }
}
