//! Password generation and strength checks

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

use crate::dictionary::DictionaryIndex;
use crate::error::{Result, VaultError};

pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &str = "0123456789";
pub const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Bounds and default for generated passwords
pub const MIN_GENERATED_LENGTH: usize = 5;
pub const MAX_GENERATED_LENGTH: usize = 32;
pub const DEFAULT_GENERATED_LENGTH: usize = 12;

/// Passwords shorter than this are weak
pub const MIN_STRONG_LENGTH: usize = 15;

/// Most common leaked passwords, rejected without a dictionary lookup
pub const COMMON_PASSWORDS: [&str; 10] = [
    "123456",
    "123456789",
    "qwerty",
    "111111",
    "password",
    "12345678",
    "abc123",
    "1234567",
    "password1",
    "123123",
];

/// Character sets a generated password draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharsetOptions {
    pub uppercase: bool,
    pub lowercase: bool,
    pub digits: bool,
    pub punctuation: bool,
}

impl CharsetOptions {
    pub fn all() -> Self {
        Self {
            uppercase: true,
            lowercase: true,
            digits: true,
            punctuation: true,
        }
    }

    /// Selected sets, in a fixed order
    pub fn charsets(&self) -> Vec<&'static str> {
        [
            (self.uppercase, UPPERCASE),
            (self.lowercase, LOWERCASE),
            (self.digits, DIGITS),
            (self.punctuation, PUNCTUATION),
        ]
        .into_iter()
        .filter_map(|(enabled, set)| enabled.then_some(set))
        .collect()
    }
}

impl Default for CharsetOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// Random string of `length` characters with at least one from each set
pub fn generate_random_string(length: usize, charsets: &[&str]) -> Result<String> {
    if charsets.is_empty() || charsets.iter().any(|set| set.is_empty()) {
        return Err(VaultError::Validation(
            "Please select at least one character set!".to_string(),
        ));
    }
    if length < charsets.len() {
        return Err(VaultError::Validation(format!(
            "Length must be at least {} for the selected character sets",
            charsets.len()
        )));
    }

    let mut rng = OsRng;
    let mut chars: Vec<char> = Vec::with_capacity(length);
    for set in charsets {
        let set: Vec<char> = set.chars().collect();
        chars.extend(set.choose(&mut rng));
    }

    let pool: Vec<char> = charsets.iter().flat_map(|set| set.chars()).collect();
    for _ in chars.len()..length {
        chars.extend(pool.choose(&mut rng));
    }

    chars.shuffle(&mut rng);
    Ok(chars.into_iter().collect())
}

/// Password over every character set, length clamped to the allowed range
pub fn generate_password(length: usize) -> Result<String> {
    generate_with(length, CharsetOptions::all())
}

/// Password over the selected sets, length clamped to the allowed range
pub fn generate_with(length: usize, options: CharsetOptions) -> Result<String> {
    let length = length.clamp(MIN_GENERATED_LENGTH, MAX_GENERATED_LENGTH);
    generate_random_string(length, &options.charsets())
}

/// Weak if common, shorter than [`MIN_STRONG_LENGTH`], or in the dictionary
pub fn is_weak_password(password: &str, dictionary: Option<&DictionaryIndex>) -> Result<bool> {
    if password.chars().count() < MIN_STRONG_LENGTH || COMMON_PASSWORDS.contains(&password) {
        return Ok(true);
    }
    match dictionary {
        Some(dictionary) => dictionary.contains(password),
        None => Ok(false),
    }
}

/// Coarse strength rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PasswordStrength {
    VeryWeak,
    Weak,
    Good,
    Strong,
}

impl PasswordStrength {
    pub fn estimate(password: &str, dictionary: Option<&DictionaryIndex>) -> Result<Self> {
        if COMMON_PASSWORDS.contains(&password) {
            return Ok(Self::VeryWeak);
        }
        if let Some(dictionary) = dictionary {
            if dictionary.contains(password)? {
                return Ok(Self::VeryWeak);
            }
        }

        let length = password.chars().count();
        let classes = character_classes(password);
        let strength = match length {
            0..=7 => Self::VeryWeak,
            8..=11 => Self::Weak,
            _ if length >= MIN_STRONG_LENGTH && classes >= 3 => Self::Strong,
            _ if classes >= 2 => Self::Good,
            _ => Self::Weak,
        };
        Ok(strength)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VeryWeak => "Very weak",
            Self::Weak => "Weak",
            Self::Good => "Good",
            Self::Strong => "Strong",
        }
    }
}

impl std::fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

fn character_classes(password: &str) -> usize {
    let checks: [fn(&char) -> bool; 3] = [
        char::is_ascii_uppercase,
        char::is_ascii_lowercase,
        char::is_ascii_digit,
    ];
    let basic = checks
        .iter()
        .filter(|check| password.chars().any(|c| check(&c)))
        .count();
    let other = password.chars().any(|c| !c.is_ascii_alphanumeric());
    basic + usize::from(other)
}
