//! Currency and financial-text expansion.
//!
//! Pattern order runs from most to least specific so that a suffixed or
//! parenthesized amount is never half-eaten by the basic-amount rule:
//! parenthetical-negative-with-suffix, parenthetical negative, leading
//! minus, suffixed, tilde-approximate, comma-grouped, basic. Percentages
//! and the financial-jargon table expand last, after every amount is
//! already words.

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;

use super::numbers::{decimal_words, integer_words};

/// Supported symbols with their unit names.
const CURRENCIES: &[(&str, CurrencyInfo)] = &[
    ("$", CurrencyInfo { name: "dollar", plural: "dollars", subunit: "cent", subunit_plural: "cents" }),
    ("€", CurrencyInfo { name: "euro", plural: "euros", subunit: "cent", subunit_plural: "cents" }),
    ("£", CurrencyInfo { name: "pound", plural: "pounds", subunit: "penny", subunit_plural: "pence" }),
    ("¥", CurrencyInfo { name: "yen", plural: "yen", subunit: "sen", subunit_plural: "sen" }),
    ("₹", CurrencyInfo { name: "rupee", plural: "rupees", subunit: "paisa", subunit_plural: "paise" }),
    ("₽", CurrencyInfo { name: "ruble", plural: "rubles", subunit: "kopeck", subunit_plural: "kopecks" }),
    ("₩", CurrencyInfo { name: "won", plural: "won", subunit: "jeon", subunit_plural: "jeon" }),
    ("¢", CurrencyInfo { name: "cent", plural: "cents", subunit: "", subunit_plural: "" }),
];

#[derive(Debug, Clone, Copy)]
struct CurrencyInfo {
    name: &'static str,
    plural: &'static str,
    subunit: &'static str,
    subunit_plural: &'static str,
}

const SYMBOL_CLASS: &str = r"[$€£¥₹₽₩¢]";

static RE_PAREN_NEG_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\(({SYMBOL_CLASS})(\d+(?:\.\d+)?)\s*([KMBTkmbt])\)")).unwrap()
});
static RE_PAREN_NEG: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\(({SYMBOL_CLASS})(\d+(?:\.\d{{1,4}})?)\)")).unwrap());
static RE_LEADING_MINUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"-\s*({SYMBOL_CLASS})(\d+(?:\.\d{{1,4}})?)\b")).unwrap());
static RE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"({SYMBOL_CLASS})(\d+(?:\.\d+)?)\s*([KMBTkmbt])\b")).unwrap());
static RE_APPROX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"~\s*({SYMBOL_CLASS})(\d{{1,3}}(?:,\d{{3}})*(?:\.\d{{1,4}})?|\d+(?:\.\d{{1,4}})?)\b"
    ))
    .unwrap()
});
static RE_GROUPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"({SYMBOL_CLASS})(\d{{1,3}}(?:,\d{{3}})+(?:\.\d{{1,4}})?)\b")).unwrap()
});
static RE_BASIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"({SYMBOL_CLASS})(\d+(?:\.\d{{1,4}})?)\b")).unwrap());
static RE_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?[\d,]+(?:\.\d+)?)\s*%").unwrap());

/// Financial jargon, expanded after the amounts.
static JARGON: &[(&str, &str)] = &[
    (r"(?i)\bbps\b", "basis points"),
    (r"(?i)\bbp\b", "basis point"),
    (r"(?i)\bQ1\b", "first quarter"),
    (r"(?i)\bQ2\b", "second quarter"),
    (r"(?i)\bQ3\b", "third quarter"),
    (r"(?i)\bQ4\b", "fourth quarter"),
    (r"(?i)\bYoY\b", "year over year"),
    (r"(?i)\bMoM\b", "month over month"),
    (r"(?i)\bP/E\b", "price to earnings"),
    (r"(?i)\bROI\b", "return on investment"),
    (r"(?i)\bEBITDA\b", "E B I T D A"),
];

static JARGON_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    JARGON.iter().map(|(p, r)| (Regex::new(p).expect("jargon pattern"), *r)).collect()
});

fn info_for(symbol: &str) -> Option<&'static CurrencyInfo> {
    CURRENCIES.iter().find(|(s, _)| *s == symbol).map(|(_, info)| info)
}

fn suffix_word(suffix: &str) -> &'static str {
    match suffix.to_ascii_uppercase().as_str() {
        "K" => "thousand",
        "M" => "million",
        "B" => "billion",
        "T" => "trillion",
        _ => "",
    }
}

/// "$2.5M" → "two point five million dollars".
fn suffixed_words(amount: &str, suffix: &str, info: &CurrencyInfo) -> String {
    let words = if amount.contains('.') {
        decimal_words(amount)
    } else {
        integer_words(amount.parse::<i64>().unwrap_or(0))
    };
    let unit = if amount == "1" { info.name } else { info.plural };
    format!("{} {} {}", words, suffix_word(suffix), unit)
}

/// "$25.50" → "twenty-five dollars and fifty cents".
fn amount_words(raw: &str, info: &CurrencyInfo) -> String {
    let raw = raw.replace(',', "");
    if let Some(dot) = raw.find('.') {
        let int_part: i64 = raw[..dot].parse().unwrap_or(0);
        let dec_str = &raw[dot + 1..];
        // Two-digit subunit, right-padded ("$.5" means 50 cents).
        let cents: i64 = dec_str
            .chars()
            .chain(std::iter::repeat('0'))
            .take(2)
            .collect::<String>()
            .parse()
            .unwrap_or(0);

        let main = match int_part {
            0 => String::new(),
            1 => format!("one {}", info.name),
            n => format!("{} {}", integer_words(n), info.plural),
        };

        if cents > 0 && !info.subunit.is_empty() {
            let sub = if cents == 1 {
                format!("one {}", info.subunit)
            } else {
                format!("{} {}", integer_words(cents), info.subunit_plural)
            };
            if main.is_empty() {
                sub
            } else {
                format!("{main} and {sub}")
            }
        } else if cents > 0 {
            // No subunit for this currency; read the decimal directly.
            format!("{} {}", decimal_words(&raw), info.plural)
        } else if main.is_empty() {
            format!("zero {}", info.plural)
        } else {
            main
        }
    } else {
        let n: i64 = raw.parse().unwrap_or(0);
        match n {
            1 => format!("one {}", info.name),
            _ => format!("{} {}", integer_words(n), info.plural),
        }
    }
}

fn replace_amount(caps: &Captures, prefix: &str) -> String {
    match info_for(&caps[1]) {
        Some(info) => format!("{prefix}{}", amount_words(&caps[2], info)),
        None => caps[0].to_string(),
    }
}

/// Expand every currency amount and financial abbreviation in `text`.
pub fn process_currency(text: &str) -> String {
    let mut out = text.to_string();

    out = RE_PAREN_NEG_SUFFIX
        .replace_all(&out, |caps: &Captures| match info_for(&caps[1]) {
            Some(info) => format!("negative {}", suffixed_words(&caps[2], &caps[3], info)),
            None => caps[0].to_string(),
        })
        .into_owned();

    out = RE_PAREN_NEG
        .replace_all(&out, |caps: &Captures| replace_amount(caps, "negative "))
        .into_owned();

    out = RE_LEADING_MINUS
        .replace_all(&out, |caps: &Captures| replace_amount(caps, "negative "))
        .into_owned();

    out = RE_SUFFIX
        .replace_all(&out, |caps: &Captures| match info_for(&caps[1]) {
            Some(info) => suffixed_words(&caps[2], &caps[3], info),
            None => caps[0].to_string(),
        })
        .into_owned();

    out = RE_APPROX
        .replace_all(&out, |caps: &Captures| replace_amount(caps, "approximately "))
        .into_owned();

    out = RE_GROUPED
        .replace_all(&out, |caps: &Captures| replace_amount(caps, ""))
        .into_owned();

    out = RE_BASIC
        .replace_all(&out, |caps: &Captures| replace_amount(caps, ""))
        .into_owned();

    out = RE_PERCENT
        .replace_all(&out, |caps: &Captures| {
            let raw = caps[1].replace(',', "");
            let words = if raw.contains('.') {
                decimal_words(&raw)
            } else {
                match raw.parse::<i64>() {
                    Ok(n) => integer_words(n),
                    Err(_) => return caps[0].to_string(),
                }
            };
            format!("{words} percent")
        })
        .into_owned();

    for (re, replacement) in JARGON_PATTERNS.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_amount_with_cents() {
        let out = process_currency("It costs $25.50 today.");
        assert!(out.contains("twenty-five dollars and fifty cents"), "got: {out}");
    }

    #[test]
    fn whole_dollars() {
        assert!(process_currency("$1 fee").contains("one dollar"));
        assert!(process_currency("$40 fee").contains("forty dollars"));
    }

    #[test]
    fn suffixed_amounts() {
        let out = process_currency("Revenue of $2.5M in Q1");
        assert!(out.contains("two point five million dollars"), "got: {out}");
        assert!(out.contains("first quarter"), "got: {out}");

        let out = process_currency("raised €500K");
        assert!(out.contains("five hundred thousand euros"), "got: {out}");
    }

    #[test]
    fn parenthetical_negative_with_suffix() {
        let out = process_currency("a ($500K) writedown");
        assert!(out.contains("negative five hundred thousand dollars"), "got: {out}");
    }

    #[test]
    fn parenthetical_negative() {
        let out = process_currency("posted ($50) net");
        assert!(out.contains("negative fifty dollars"), "got: {out}");
    }

    #[test]
    fn leading_minus() {
        let out = process_currency("down -$50 overnight");
        assert!(out.contains("negative fifty dollars"), "got: {out}");
    }

    #[test]
    fn tilde_approximate() {
        let out = process_currency("~$568.91 per unit");
        assert!(
            out.contains("approximately five hundred sixty-eight dollars and ninety-one cents"),
            "got: {out}"
        );
    }

    #[test]
    fn comma_grouped() {
        let out = process_currency("$1,234,567.89 total");
        assert!(out.contains("one million two hundred thirty-four thousand five hundred sixty-seven dollars"), "got: {out}");
        assert!(out.contains("eighty-nine cents"), "got: {out}");
    }

    #[test]
    fn international_symbols() {
        assert!(process_currency("£3 each").contains("three pounds"));
        assert!(process_currency("¥500 note").contains("five hundred yen"));
        assert!(process_currency("₹20 tip").contains("twenty rupees"));
    }

    #[test]
    fn percentages() {
        assert!(process_currency("50% off").contains("fifty percent off"));
        let out = process_currency("grew 3.5% this year");
        assert!(out.contains("three point five percent"), "got: {out}");
        let out = process_currency("down -2% overnight");
        assert!(out.contains("negative two percent"), "got: {out}");
        let out = process_currency("a 1,200% spike");
        assert!(out.contains("one thousand two hundred percent"), "got: {out}");
    }

    #[test]
    fn percent_sign_without_number_left_alone() {
        assert_eq!(process_currency("the % key"), "the % key");
    }

    #[test]
    fn jargon_after_amounts() {
        let out = process_currency("up 50 bps YoY, P/E fell");
        assert!(out.contains("basis points"));
        assert!(out.contains("year over year"));
        assert!(out.contains("price to earnings"));
    }

    #[test]
    fn jargon_is_case_insensitive() {
        assert!(process_currency("strong ebitda growth").contains("E B I T D A"));
        assert!(process_currency("strong EBITDA growth").contains("E B I T D A"));
        assert!(process_currency("roi doubled").contains("return on investment"));
    }

    #[test]
    fn idempotent() {
        let once = process_currency("Revenue of $2.5M in Q1, 50% margin, ($50) in Q2");
        assert_eq!(process_currency(&once), once);
    }

    #[test]
    fn case_insensitive_suffix() {
        let out = process_currency("$3m run rate");
        assert!(out.contains("three million dollars"), "got: {out}");
    }
}
