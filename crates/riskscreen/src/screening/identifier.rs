//! Client code generation.
//!
//! The code seeds the platform's unique-identifier attribute. It is advisory
//! rather than globally unique, and is recomputed whenever any of its four
//! inputs changes.

use chrono::{Datelike, NaiveDate};

use super::domain::Sex;

const CONSONANTS_PER_PART: usize = 2;

/// Derives the client code from the identity fields.
///
/// Returns `None` unless all four inputs are present. The shape is
/// `<lastName consonants><familyName consonants><sex digit><ddmmyy>`.
pub fn generate_identifier(
    family_name: &str,
    last_name: &str,
    sex: &str,
    date_of_birth: NaiveDate,
) -> Option<String> {
    let family_name = family_name.trim();
    let last_name = last_name.trim();
    let sex = Sex::parse(sex)?;
    if family_name.is_empty() || last_name.is_empty() {
        return None;
    }

    let mut code = String::new();
    code.push_str(&consonant_prefix(last_name));
    code.push_str(&consonant_prefix(family_name));
    code.push_str(sex.identifier_digit());
    code.push_str(&format!(
        "{:02}{:02}{:02}",
        date_of_birth.day(),
        date_of_birth.month(),
        date_of_birth.year() % 100
    ));

    Some(code)
}

/// Up to two qualifying consonants; names with fewer fall back to their
/// first two raw characters.
fn consonant_prefix(name: &str) -> String {
    let consonants: String = name
        .chars()
        .filter(|ch| is_consonant(*ch))
        .take(CONSONANTS_PER_PART)
        .collect();

    if consonants.chars().count() < CONSONANTS_PER_PART {
        name.chars().take(CONSONANTS_PER_PART).collect()
    } else {
        consonants
    }
}

fn is_consonant(ch: char) -> bool {
    if ch.is_ascii_alphabetic() {
        return !matches!(ch.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u');
    }

    // Khmer consonant block.
    ('\u{1780}'..='\u{17A3}').contains(&ch)
}
