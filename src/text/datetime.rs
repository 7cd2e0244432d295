//! Date and time expansion.
//!
//! ISO dates read as "May twelfth, twenty twenty-three"; clock times read
//! the conversational way ("14:30" → "half past two PM"); time ranges join
//! with "to"; decades read as eras ("1990s" → "nineteen nineties").

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;

use super::numbers::{integer_words, ordinal_words, year_words};

const MONTHS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August",
    "September", "October", "November", "December",
];

static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());
// Ranges first so "09:00-17:00" is not torn apart by the single-time rule.
static RE_TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2})\s*[-–—]\s*(\d{1,2}):(\d{2})\b").unwrap()
});
static RE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}):(\d{2})(?::\d{2})?\s*(am|pm)?\b").unwrap()
});
// "1990s", "'90s", "60s" — the optional apostrophe is swallowed.
static RE_DECADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"['\u{2019}]?\b(\d{1,3})0s\b").unwrap());

const DECADE_WORDS: &[&str] = &[
    "hundreds", "tens", "twenties", "thirties", "forties", "fifties", "sixties",
    "seventies", "eighties", "nineties",
];

fn read_date(year: i64, month: usize, day: i64) -> Option<String> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{} {}, {}", MONTHS[month - 1], ordinal_words(day), year_words(year)))
}

/// Conversational reading of a 24-hour (or suffixed 12-hour) clock time.
fn read_time(hour: i64, minute: i64, explicit_suffix: Option<&str>) -> Option<String> {
    if !(0..=23).contains(&hour) || !(0..=59).contains(&minute) {
        return None;
    }

    let suffix = match explicit_suffix {
        Some(s) => s.to_uppercase(),
        None => (if hour < 12 { "AM" } else { "PM" }).to_string(),
    };
    let hour12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    let next12 = match (hour + 1) % 12 {
        0 => 12,
        h => h,
    };

    let spoken = match minute {
        0 => format!("{} o'clock {}", integer_words(hour12), suffix),
        15 => format!("quarter past {} {}", integer_words(hour12), suffix),
        30 => format!("half past {} {}", integer_words(hour12), suffix),
        45 => format!("quarter to {} {}", integer_words(next12), suffix),
        m if m < 10 => format!("{} oh {} {}", integer_words(hour12), integer_words(m), suffix),
        m => format!("{} {} {}", integer_words(hour12), integer_words(m), suffix),
    };
    Some(spoken)
}

/// Era reading for a decade pattern: `base` is the digits before the
/// trailing `0s` ("1990s" → 199 → "nineteen nineties").
fn read_decade(base: i64) -> String {
    let digit = (base % 10) as usize;
    let prefix = base / 10;
    if prefix == 0 {
        return DECADE_WORDS[digit].to_string();
    }
    if digit == 0 && prefix % 10 == 0 {
        // Round millennia: "2000s" reads "two thousands", not "twenty hundreds".
        return format!("{}s", integer_words(base * 10));
    }
    format!("{} {}", integer_words(prefix), DECADE_WORDS[digit])
}

/// Expand dates, time ranges, and times in `text`.
pub fn process_dates_and_times(text: &str) -> String {
    let out = RE_ISO_DATE
        .replace_all(text, |caps: &Captures| {
            let year: i64 = caps[1].parse().unwrap_or(0);
            let month: usize = caps[2].parse().unwrap_or(0);
            let day: i64 = caps[3].parse().unwrap_or(0);
            read_date(year, month, day).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    let out = RE_TIME_RANGE
        .replace_all(&out, |caps: &Captures| {
            let from = read_time(caps[1].parse().unwrap_or(-1), caps[2].parse().unwrap_or(-1), None);
            let to = read_time(caps[3].parse().unwrap_or(-1), caps[4].parse().unwrap_or(-1), None);
            match (from, to) {
                (Some(f), Some(t)) => format!("{f} to {t}"),
                _ => caps[0].to_string(),
            }
        })
        .into_owned();

    let out = RE_TIME
        .replace_all(&out, |caps: &Captures| {
            let hour: i64 = caps[1].parse().unwrap_or(-1);
            let minute: i64 = caps[2].parse().unwrap_or(-1);
            let suffix = caps.get(3).map(|m| m.as_str());
            read_time(hour, minute, suffix).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    RE_DECADE
        .replace_all(&out, |caps: &Captures| match caps[1].parse::<i64>() {
            Ok(base) => read_decade(base),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_date() {
        let out = process_dates_and_times("Meeting on 2023-05-12");
        assert!(out.contains("May twelfth, twenty twenty-three"), "got: {out}");
    }

    #[test]
    fn half_past_time() {
        let out = process_dates_and_times("at 14:30 sharp");
        assert!(out.contains("half past two PM"), "got: {out}");
    }

    #[test]
    fn date_and_time_together() {
        let out = process_dates_and_times("Meeting on 2023-05-12 at 14:30");
        assert!(out.contains("May twelfth, twenty twenty-three"), "got: {out}");
        assert!(out.contains("half past two PM"), "got: {out}");
    }

    #[test]
    fn oclock_and_quarters() {
        assert!(process_dates_and_times("09:00").contains("nine o'clock AM"));
        assert!(process_dates_and_times("09:15").contains("quarter past nine AM"));
        assert!(process_dates_and_times("09:45").contains("quarter to ten AM"));
    }

    #[test]
    fn time_range() {
        let out = process_dates_and_times("open 09:00–17:00 daily");
        assert!(out.contains("nine o'clock AM to five o'clock PM"), "got: {out}");
    }

    #[test]
    fn explicit_suffix_kept() {
        let out = process_dates_and_times("at 9:30 pm");
        assert!(out.contains("half past nine PM"), "got: {out}");
    }

    #[test]
    fn minutes_spoken() {
        assert!(process_dates_and_times("7:05").contains("seven oh five AM"));
        assert!(process_dates_and_times("18:22").contains("six twenty-two PM"));
    }

    #[test]
    fn decades() {
        let out = process_dates_and_times("music of the 1990s");
        assert!(out.contains("nineteen nineties"), "got: {out}");
        assert!(process_dates_and_times("back in the 60s").contains("sixties"));
        assert!(process_dates_and_times("the '80s revival").contains("eighties"));
        assert!(process_dates_and_times("the 1900s").contains("nineteen hundreds"));
        assert!(process_dates_and_times("the 2000s").contains("two thousands"));
    }

    #[test]
    fn decade_does_not_eat_plain_plurals() {
        let out = process_dates_and_times("weighs 190 grams");
        assert!(out.contains("190 grams"), "got: {out}");
    }

    #[test]
    fn invalid_date_left_alone() {
        let out = process_dates_and_times("build 2023-99-99 failed");
        assert!(out.contains("2023-99-99"), "got: {out}");
    }

    #[test]
    fn idempotent() {
        let once =
            process_dates_and_times("2023-05-12 at 14:30, open 09:00-17:00, hits of the 1980s");
        assert_eq!(process_dates_and_times(&once), once);
    }
}
