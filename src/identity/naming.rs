const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()_+-={}|;:,.<>?";
const MIN_PASSWORD_LEN: usize = 8;

/// Lowercase ASCII alphanumerics only.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

pub fn principal_name(firstname: &str, lastname: &str) -> String {
    format!("{}_{}", normalize_name(firstname), normalize_name(lastname))
}

pub fn company_email(firstname: &str, lastname: &str, domain: &str) -> String {
    format!(
        "{}.{}@{}",
        normalize_name(firstname),
        normalize_name(lastname),
        domain
    )
}

pub fn display_name(full_name: Option<&str>, firstname: &str, lastname: &str) -> String {
    match full_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{} {}", firstname.trim(), lastname.trim())
            .trim()
            .to_string(),
    }
}

/// First whitespace-separated word, then the rest.
pub fn split_full_name(name: &str) -> Option<(String, String)> {
    let mut words = name.split_whitespace();
    let first = words.next()?;
    let rest: Vec<&str> = words.collect();
    if rest.is_empty() {
        return None;
    }
    Some((first.to_string(), rest.join(" ")))
}

/// Temporary password with at least one character from each class.
pub fn generate_password(length: usize) -> Result<String, getrandom::Error> {
    let length = length.max(MIN_PASSWORD_LEN);
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
    let mut chars = Vec::with_capacity(length);
    for class in [UPPER, LOWER, DIGITS, SPECIAL] {
        chars.push(class[random_index(class.len())?]);
    }
    while chars.len() < length {
        chars.push(all[random_index(all.len())?]);
    }
    for i in (1..chars.len()).rev() {
        let j = random_index(i + 1)?;
        chars.swap(i, j);
    }
    Ok(chars.into_iter().map(char::from).collect())
}

fn random_index(bound: usize) -> Result<usize, getrandom::Error> {
    let bound = bound as u32;
    let zone = u32::MAX - (u32::MAX % bound);
    loop {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf)?;
        let value = u32::from_le_bytes(buf);
        if value < zone {
            return Ok((value % bound) as usize);
        }
    }
}
