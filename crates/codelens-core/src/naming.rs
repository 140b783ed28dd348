//! Identifier helpers shared by the registry and the extraction agents.

/// Split an identifier into its name tokens.
///
/// Handles camelCase, PascalCase, acronyms (`HTTPServer` -> `HTTP`, `Server`),
/// trailing digits (`v2Api` -> `v2`, `Api`) and `_`, `-`, `.` or whitespace separators.
pub fn split_identifier(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for part in name.split(|c: char| !c.is_alphanumeric()) {
        if part.is_empty() {
            continue;
        }

        let chars: Vec<char> = part.chars().collect();
        let mut current = String::new();

        for (i, &c) in chars.iter().enumerate() {
            if !current.is_empty() && c.is_uppercase() {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower)
                {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            current.push(c);
        }

        if !current.is_empty() {
            tokens.push(current);
        }
    }

    tokens
}

/// Uppercase the first character, leave the rest untouched.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn to_pascal_case<S: AsRef<str>>(terms: &[S]) -> String {
    terms
        .iter()
        .map(|t| capitalize(&t.as_ref().to_lowercase()))
        .collect()
}

pub fn to_camel_case<S: AsRef<str>>(terms: &[S]) -> String {
    let mut out = String::new();
    for (i, term) in terms.iter().enumerate() {
        let lower = term.as_ref().to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            out.push_str(&capitalize(&lower));
        }
    }
    out
}

pub fn to_snake_case<S: AsRef<str>>(terms: &[S]) -> String {
    terms
        .iter()
        .map(|t| t.as_ref().to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Lowercased first letters of each token (`UserCreationService` -> `ucs`).
pub fn initials<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .filter_map(|t| t.as_ref().chars().next())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// American Soundex code, or `None` when the word has no ASCII letters.
pub fn soundex(word: &str) -> Option<String> {
    let mut letters = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase());

    let first = letters.next()?;
    let mut code = String::with_capacity(4);
    code.push(first);
    let mut last = soundex_digit(first);

    for c in letters {
        let digit = soundex_digit(c);
        if let Some(d) = digit {
            if digit != last {
                code.push(d);
                if code.len() == 4 {
                    break;
                }
            }
        }
        // H and W do not separate letters with the same code
        if c != 'H' && c != 'W' {
            last = digit;
        }
    }

    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}
