//! Validation and normalization for Chilean identifiers and names.

use regex::Regex;

/// Spanish name particles that stay lowercase and travel with the surname
/// they precede.
const PARTICLES: &[&str] = &["de", "del", "la", "las", "los", "san", "santa", "y"];

/// A value that failed validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {what} '{value}': {reason}")]
pub struct ValidationError {
    pub what: &'static str,
    pub value: String,
    pub reason: String,
}

fn invalid(what: &'static str, value: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError {
        what,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Normalizes a Chilean RUT to its dotted canonical form (`12.345.678-5`),
/// verifying the modulo-11 check digit. Accepts dotted or bare input, with
/// or without the dash.
pub fn validate_rut(input: &str) -> Result<String, ValidationError> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let (digits, check) = match cleaned.split_once('-') {
        Some((digits, check)) => (digits.to_string(), check.to_string()),
        None if cleaned.len() >= 2 => {
            let split = cleaned.len() - 1;
            (cleaned[..split].to_string(), cleaned[split..].to_string())
        }
        None => return Err(invalid("rut", input, "too short")),
    };

    if digits.len() < 6 {
        return Err(invalid("rut", input, "fewer than 6 digits"));
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("rut", input, "non-numeric body"));
    }
    let expected = check_digit(&digits);
    if check != expected {
        return Err(invalid(
            "rut",
            input,
            format!("check digit should be {}", expected),
        ));
    }
    Ok(format!("{}-{}", dotted(&digits), check))
}

/// Modulo-11 check digit: weights 2..=7 cycling over the reversed digits;
/// remainder 11 maps to `0` and 10 to `K`.
fn check_digit(digits: &str) -> String {
    let sum: u32 = digits
        .bytes()
        .rev()
        .zip([2u32, 3, 4, 5, 6, 7].into_iter().cycle())
        .map(|(b, weight)| u32::from(b - b'0') * weight)
        .sum();
    match 11 - (sum % 11) {
        11 => "0".to_string(),
        10 => "K".to_string(),
        n => n.to_string(),
    }
}

fn dotted(digits: &str) -> String {
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = digits;
    while rest.len() > 3 {
        let (head, tail) = rest.split_at(rest.len() - 3);
        groups.push(tail);
        rest = head;
    }
    groups.push(rest);
    groups.reverse();
    groups.join(".")
}

/// Lowercases and checks the rough shape of an email address.
pub fn validate_email(input: &str) -> Result<String, ValidationError> {
    let email = input.trim().to_lowercase();
    let re = Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$")
        .map_err(|e| invalid("email", input, format!("regex compile error: {}", e)))?;
    if re.is_match(&email) {
        Ok(email)
    } else {
        Err(invalid("email", input, "not a plausible address"))
    }
}

/// Normalizes a Chilean phone number to `+56 D DDDD DDDD`. Accepts the
/// country prefix, leading zeroes, and arbitrary punctuation.
pub fn validate_phone(input: &str) -> Result<String, ValidationError> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut rest = digits.as_str();
    if rest.len() > 9 && rest.starts_with("56") {
        rest = &rest[2..];
    }
    let rest = rest.trim_start_matches('0');
    if rest.len() != 9 {
        return Err(invalid("phone", input, "expected 9 national digits"));
    }
    Ok(format!("+56 {} {} {}", &rest[..1], &rest[1..5], &rest[5..]))
}

/// Splits a full name into given names and surnames, title-casing words
/// while keeping particles lowercase. Chilean names carry two surnames, so
/// the last two non-particle words (with their particles) become the
/// surname when enough words remain.
pub fn normalize_full_name(input: &str) -> (String, String) {
    let words: Vec<String> = input.split_whitespace().map(cased_word).collect();
    match words.len() {
        0 => return (String::new(), String::new()),
        1 => return (words[0].clone(), String::new()),
        _ => {}
    }

    let mut split = surname_start(&words, words.len() - 1);
    if split >= 2 {
        let second = surname_start(&words, split - 1);
        if second >= 1 {
            split = second;
        }
    }
    (words[..split].join(" "), words[split..].join(" "))
}

/// Index where the surname headed at `end` begins, walking left over its
/// particles.
fn surname_start(words: &[String], end: usize) -> usize {
    let mut start = end;
    while start > 0 && is_particle(&words[start - 1]) {
        start -= 1;
    }
    start
}

fn is_particle(word: &str) -> bool {
    PARTICLES.contains(&word.to_lowercase().as_str())
}

fn cased_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if is_particle(&lower) {
        return lower;
    }
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}
