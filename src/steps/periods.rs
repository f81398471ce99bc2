//! Reading hours, direction and magnitude out of free text.
//!
//! The human states intent in plain words ("raise the morning peak by 5%
//! during 7-9am"). These helpers pull out what the decision step needs and
//! ignore everything else.

use std::collections::BTreeSet;

use crate::belief::Direction;

/// Named parts of the day, longest phrases first so "early morning" wins
/// over "morning" and "afternoon" over "noon".
const NAMED_PERIODS: &[(&str, u8, u8)] = &[
    ("early morning", 4, 6),
    ("morning peak", 7, 9),
    ("morning ramp", 6, 9),
    ("evening peak", 17, 20),
    ("late evening", 21, 23),
    ("late night", 22, 23),
    ("overnight", 0, 5),
    ("afternoon", 12, 17),
    ("midday", 11, 13),
    ("noon", 11, 13),
    ("morning", 6, 11),
    ("evening", 17, 21),
    ("night", 22, 23),
    ("all day", 0, 23),
    ("whole day", 0, 23),
    ("entire day", 0, 23),
];

const INCREASE_CUES: &[&str] = &[
    "increas", "rais", "higher", "boost", "uplift", "underestimat", "underforecast",
    "cold", "freez", "frost", "snow", "blizzard", "heatwave", "hot", "surge", "spike",
];

const DECREASE_CUES: &[&str] = &[
    "decreas", "reduc", "lower", "cut", "overestimat", "overforecast", "holiday", "mild",
    "shutdown", "closure", "drop", "dip",
];

const STRONG_WORDS: &[&str] = &[
    "far", "extreme", "extremely", "severe", "severely", "record", "significant",
    "significantly", "sharp", "sharply", "much", "unusual", "unusually", "major",
];

const WEAK_WORDS: &[&str] = &["slight", "slightly", "minor", "small", "modest", "modestly"];

/// Hours of the day named or implied by `text`.
pub fn extract_hours(text: &str) -> BTreeSet<u8> {
    let mut lower = text.to_lowercase();
    let mut hours = BTreeSet::new();

    for (phrase, start, end) in NAMED_PERIODS {
        while let Some(pos) = lower.find(phrase) {
            hours.extend(span(*start, *end));
            lower.replace_range(pos..pos + phrase.len(), &" ".repeat(phrase.len()));
        }
    }

    hours.extend(clock_hours(&lower));
    hours
}

/// Direction implied by the wording, if one side clearly dominates.
pub fn direction_hint(text: &str) -> Option<Direction> {
    let lower = text.to_lowercase();
    let words = words(&lower);

    let mut up = count_cues(&words, INCREASE_CUES);
    let mut down = count_cues(&words, DECREASE_CUES);
    for phrase in ["heat wave", "cold snap", "too low", "under-forecast", "under forecast"] {
        if lower.contains(phrase) {
            up += 1;
        }
    }
    for phrase in ["too high", "over-forecast", "over forecast"] {
        if lower.contains(phrase) {
            down += 1;
        }
    }
    // Unusually low temperatures mean heating load.
    if lower.contains("temperature") && lower.contains("below") {
        up += 1;
    }

    match up.cmp(&down) {
        std::cmp::Ordering::Greater => Some(Direction::Increase),
        std::cmp::Ordering::Less => Some(Direction::Decrease),
        std::cmp::Ordering::Equal => None,
    }
}

/// An explicit percentage such as "by 5%" or "3.5 percent".
///
/// Only values in (0, 50] are accepted.
pub fn magnitude_hint(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        let number: String = chars[start..i].iter().collect();
        let mut j = i;
        while j < chars.len() && chars[j] == ' ' {
            j += 1;
        }
        let rest: String = chars[j..].iter().take(7).collect();
        if rest.starts_with('%') || rest.starts_with("percent") {
            if let Ok(value) = number.trim_end_matches('.').parse::<f64>() {
                if value > 0.0 && value <= 50.0 {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Scaling applied to the default magnitude for intensity words.
pub fn intensity(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words = words(&lower);
    if words.iter().any(|w| STRONG_WORDS.contains(w)) {
        1.5
    } else if words.iter().any(|w| WEAK_WORDS.contains(w)) {
        0.5
    } else {
        1.0
    }
}

fn words(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn count_cues(words: &[&str], cues: &[&str]) -> usize {
    words
        .iter()
        .filter(|w| cues.iter().any(|c| w.starts_with(c)))
        .count()
}

fn span(start: u8, end: u8) -> Vec<u8> {
    if start <= end {
        (start..=end).collect()
    } else {
        // Wraps past midnight.
        (start..=23).chain(0..=end).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number { value: u32, minute: Option<u32> },
    Word(String),
    Dash,
}

#[derive(Debug, Clone, Copy)]
struct ClockTime {
    hour: u32,
    minute: Option<u32>,
    pm: Option<bool>,
}

impl ClockTime {
    fn is_explicit(&self) -> bool {
        self.minute.is_some() || self.pm.is_some()
    }

    fn to_24h(self) -> Option<u8> {
        let hour = match self.pm {
            Some(pm) => {
                if !(1..=12).contains(&self.hour) {
                    return None;
                }
                self.hour % 12 + if pm { 12 } else { 0 }
            }
            None => self.hour,
        };
        u8::try_from(hour).ok().filter(|h| *h < 24)
    }
}

fn tokenize(lower: &str) -> Vec<Token> {
    let chars: Vec<char> = lower.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let mut minute = None;
            if i + 1 < chars.len() && chars[i] == ':' && chars[i + 1].is_ascii_digit() {
                let m_start = i + 1;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let m: String = chars[m_start..i].iter().collect();
                minute = m.parse().ok();
            }
            // A number glued to '%' or '.' followed by digits is not a clock time.
            let is_quantity = chars.get(i).is_some_and(|c| *c == '%')
                || (chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()));
            match digits.parse::<u32>() {
                Ok(value) if !is_quantity && digits.len() <= 2 => {
                    tokens.push(Token::Number { value, minute })
                }
                _ => tokens.push(Token::Word(digits)),
            }
        } else if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else {
            if c == '-' || c == '\u{2013}' {
                tokens.push(Token::Dash);
            }
            i += 1;
        }
    }
    tokens
}

fn clock_time(tokens: &[Token], i: usize) -> Option<(ClockTime, usize)> {
    let Token::Number { value, minute } = tokens.get(i)? else {
        return None;
    };
    let pm = match tokens.get(i + 1) {
        Some(Token::Word(w)) if w == "am" => Some(false),
        Some(Token::Word(w)) if w == "pm" => Some(true),
        _ => None,
    };
    let next = if pm.is_some() { i + 2 } else { i + 1 };
    Some((
        ClockTime {
            hour: *value,
            minute: *minute,
            pm,
        },
        next,
    ))
}

fn is_range_joiner(token: Option<&Token>, in_between: bool) -> bool {
    match token {
        Some(Token::Dash) => true,
        Some(Token::Word(w)) => {
            matches!(w.as_str(), "to" | "through" | "until" | "till")
                || (in_between && w == "and")
        }
        _ => false,
    }
}

fn clock_hours(lower: &str) -> BTreeSet<u8> {
    let tokens = tokenize(lower);
    let mut hours = BTreeSet::new();
    let mut hour_keyword = false;
    let mut in_between = false;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) => {
                match w.as_str() {
                    "hour" | "hours" | "he" | "hr" | "hrs" => hour_keyword = true,
                    "between" | "from" => in_between = true,
                    _ => {
                        hour_keyword = false;
                        in_between = false;
                    }
                }
                i += 1;
            }
            Token::Dash => i += 1,
            Token::Number { .. } => {
                let Some((first, next)) = clock_time(&tokens, i) else {
                    i += 1;
                    continue;
                };
                let ranged = is_range_joiner(tokens.get(next), in_between)
                    .then(|| clock_time(&tokens, next + 1))
                    .flatten();

                match ranged {
                    Some((mut second, after)) => {
                        let mut first = first;
                        if first.is_explicit() || second.is_explicit() || hour_keyword {
                            if first.pm.is_none() {
                                if let Some(pm) = second.pm {
                                    let inherited = ClockTime { pm: Some(pm), ..first };
                                    match (inherited.to_24h(), second.to_24h()) {
                                        (Some(a), Some(b)) if a <= b => first = inherited,
                                        _ => first.pm = Some(!pm),
                                    }
                                }
                            }
                            if second.pm.is_none() && second.minute.is_none() {
                                second.pm = first.pm;
                            }
                            if let (Some(a), Some(b)) = (first.to_24h(), second.to_24h()) {
                                // "07:00-10:00" ends when hour 10 starts.
                                let exclusive = second.minute == Some(0) && a != b;
                                let end = if exclusive { (b + 23) % 24 } else { b };
                                hours.extend(span(a, end));
                            }
                        }
                        i = after;
                    }
                    None => {
                        if first.is_explicit() || hour_keyword {
                            if let Some(h) = first.to_24h() {
                                hours.insert(h);
                            }
                        }
                        i = next;
                    }
                }
                in_between = false;
            }
        }
    }
    hours
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(hours: &[u8]) -> BTreeSet<u8> {
        hours.iter().copied().collect()
    }

    #[test]
    fn test_named_periods() {
        assert_eq!(extract_hours("cold snap during the morning peak"), set(&[7, 8, 9]));
        assert_eq!(extract_hours("Early Morning"), set(&[4, 5, 6]));
        assert_eq!(
            extract_hours("afternoon only"),
            (12..=17).collect::<BTreeSet<u8>>()
        );
    }

    #[test]
    fn test_clock_forms() {
        assert_eq!(extract_hours("raise 7am"), set(&[7]));
        assert_eq!(extract_hours("at 6 pm"), set(&[18]));
        assert_eq!(extract_hours("12am and 12pm"), set(&[0, 12]));
        assert_eq!(extract_hours("from 07:00"), set(&[7]));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(extract_hours("7-9am"), set(&[7, 8, 9]));
        assert_eq!(extract_hours("07:00-10:00"), set(&[7, 8, 9]));
        assert_eq!(extract_hours("hours 17 to 19"), set(&[17, 18, 19]));
        assert_eq!(extract_hours("between 5 and 7pm"), set(&[17, 18, 19]));
        assert_eq!(extract_hours("11-1pm"), set(&[11, 12, 13]));
        assert_eq!(extract_hours("hours 22-1"), set(&[22, 23, 0, 1]));
    }

    #[test]
    fn test_hour_keyword() {
        assert_eq!(extract_hours("hour 8 looks off"), set(&[8]));
        assert_eq!(extract_hours("HE 18"), set(&[18]));
    }

    #[test]
    fn test_plain_numbers_are_not_hours() {
        assert!(extract_hours("raise by 5% for 2 days").is_empty());
        assert!(extract_hours("in 2024 demand grew 3.5%").is_empty());
        assert!(extract_hours("").is_empty());
    }

    #[test]
    fn test_direction_hint() {
        assert_eq!(
            direction_hint("Cold snap, temperatures far below seasonal norm"),
            Some(Direction::Increase)
        );
        assert_eq!(direction_hint("lower the holiday load"), Some(Direction::Decrease));
        assert_eq!(direction_hint("the forecast is too high"), Some(Direction::Decrease));
        assert_eq!(direction_hint("adjust hours 7-9"), None);
    }

    #[test]
    fn test_magnitude_hint() {
        assert_eq!(magnitude_hint("raise by 5% please"), Some(5.0));
        assert_eq!(magnitude_hint("about 3.5 percent"), Some(3.5));
        assert_eq!(magnitude_hint("7am 120%"), None);
        assert_eq!(magnitude_hint("no numbers"), None);
    }

    #[test]
    fn test_intensity() {
        assert_eq!(intensity("temperatures far below normal"), 1.5);
        assert_eq!(intensity("a slight bump"), 0.5);
        assert_eq!(intensity("adjust"), 1.0);
    }
}
