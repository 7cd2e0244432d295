//! Ticker-symbol letter spelling.
//!
//! "TSLA" must read "T-S-L-A", never a guessed pronunciation. A closed set
//! of known symbols is always spelled out; beyond that, 2–5 letter ALL-CAPS
//! tokens adjacent to financial-context words are spelled contextually,
//! minus an exclusion set of common English caps words and abbreviations.

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Known ticker symbols, spelled out wherever they appear.
static KNOWN_TICKERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Large caps
        "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "TSLA", "META", "NVDA", "UNH", "JNJ",
        "XOM", "JPM", "PG", "HD", "CVX", "MA", "BAC", "ABBV", "PFE", "AVGO", "KO",
        "LLY", "PEP", "TMO", "COST", "WMT", "DIS", "ABT", "DHR", "VZ", "ADBE", "NFLX",
        "CRM", "NKE", "TXN", "ACN", "LIN", "ORCL", "WFC", "BMY", "PM", "RTX", "QCOM",
        "NEE", "UPS", "SCHW", "HON", "LOW", "INTU", "AMD", "IBM", "CAT", "SPGI", "GS",
        "AMGN", "DE", "AXP", "BLK", "ELV", "BKNG", "SYK", "TJX", "MDLZ", "ADP", "GILD",
        "MMC", "CVS", "LRCX", "TMUS", "ADI", "VRTX", "MO", "ZTS", "PYPL", "SO", "ISRG",
        "NOW", "DUK", "TGT", "PLD", "SHW", "REGN", "CB", "CCI",
        // Growth / tech
        "UBER", "LYFT", "SNAP", "TWTR", "SPOT", "SQ", "ROKU", "DOCU", "SHOP", "OKTA",
        "CRWD", "ZM", "PTON", "PLTR", "RBLX", "COIN", "HOOD", "RIVN", "LCID", "NIO",
        "XPEV", "LI",
        // ETFs and funds
        "SPY", "QQQ", "IWM", "VTI", "VOO", "VEA", "VWO", "BND", "AGG", "GLD", "SLV",
        "USO", "TLT", "HYG", "LQD", "EEM", "FXI", "EWJ", "EFA", "IEFA", "IEMG", "VGT",
        "XLK", "XLF", "XLE", "XLV", "XLI", "XLP", "XLY", "XLU", "XLRE", "XLB", "XME",
        "KRE", "SMH", "IBB",
        // Crypto-adjacent
        "MSTR", "RIOT", "MARA", "BITF", "HUT", "BTBT",
        // International
        "BABA", "TSM", "ASML", "SAP", "TM", "NVO", "SHEL", "UL", "NESN", "RHHBY",
        "ADYEN", "SE", "GRAB", "DIDI", "PDD", "JD",
        // Indices
        "SPX", "NDX", "RUT", "VIX", "DJI", "IXIC", "FTSE", "DAX", "CAC", "NIKKEI",
        "HSI", "KOSPI", "ASX", "TSX", "IBEX", "AEX", "OMX",
    ]
    .into_iter()
    .collect()
});

/// ALL-CAPS words and abbreviations that look like tickers but are not.
static EXCLUSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Common English words
        "THE", "AND", "FOR", "ARE", "BUT", "NOT", "YOU", "ALL", "CAN", "HER", "WAS",
        "ONE", "OUR", "OUT", "DAY", "GET", "HAS", "HIM", "HIS", "HOW", "ITS", "MAY",
        "NEW", "NOW", "OLD", "SEE", "TWO", "WHO", "BOY", "DID", "LET", "PUT", "SAY",
        "SHE", "TOO", "USE", "WAY", "WIN", "YES", "YET", "BIG", "END", "FAR", "FEW",
        "GOT", "LOT", "MAN", "OWN", "RUN", "SET", "TOP", "TRY", "ASK", "BAD", "BAG",
        "BED", "BOX", "CAR", "CUT", "DOG", "EAR", "EYE", "FUN", "GUN", "HAD", "HAT",
        "HOT", "JOB", "LAW", "LEG", "MAP", "MOM", "POP", "RED", "SIT", "SUN", "TAX",
        "TEA", "TEN", "VAN", "WAR", "ZIP", "IS", "OF", "TO", "IN", "ON", "AT", "BY",
        "UP", "SO", "NO", "IF", "OR", "MY", "WE", "BE", "DO", "GO",
        // Corporate and tech abbreviations
        "USA", "CEO", "CFO", "CTO", "COO", "CMO", "CIO", "HR", "IT", "PR", "QA", "AI",
        "ML", "AR", "VR", "API", "SDK", "URL", "URI", "HTTP", "HTTPS", "FTP", "SSH",
        "SSL", "TLS", "HTML", "CSS", "XML", "JSON", "CSV", "PDF", "DOC", "XLS", "PPT",
        "RAR", "TAR", "GZ", "MP3", "MP4", "AVI", "MOV", "JPG", "PNG", "GIF", "SVG",
        "BMP", "TIFF", "WEBP",
        // Units and measures
        "KG", "LB", "OZ", "CM", "MM", "FT", "YD", "MI", "KM", "MPH", "KPH", "PSI",
        "BAR", "ATM", "BTU", "CAL", "KWH",
        // Time zones and places
        "EST", "PST", "CST", "MST", "GMT", "UTC", "BST", "CET", "JST", "NYC", "LA",
        "SF", "DC", "UK", "EU", "US", "CA", "AU", "JP",
        // Generic acronyms
        "FAQ", "FYI", "ASAP", "ETA", "EOD", "COD", "FOB", "ROI", "KPI", "SLA", "NDA",
        "IPO", "B2B", "B2C", "P2P",
    ]
    .into_iter()
    .collect()
});

/// Context words that mark a caps token as a likely ticker.
const FINANCIAL_CONTEXT: &str = "stock|stocks|share|shares|equity|equities|ticker|symbol|\
security|securities|trading|trade|traded|buy|sell|bought|sold|long|short|position|\
positions|holding|holdings|gained|lost|fell|rose|climbed|dropped|rallied|declined|\
surged|plunged|soared|tumbled|price|prices|valuation|volume|earnings|revenue|profit|\
dividend|yield|market|markets|exchange|nasdaq|nyse|bps|analyst|rating|upgrade|\
downgrade|target|forecast|bullish|bearish";

static KNOWN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = {
        let mut symbols: Vec<&str> = KNOWN_TICKERS.iter().copied().collect();
        // Longest-first so GOOGL wins over GOOG.
        symbols.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        symbols.join("|")
    };
    Regex::new(&format!(r"\b({alternation})\b")).expect("known-ticker pattern")
});

static CONTEXT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b([A-Z]{{2,5}})\b(?=\s+(?:{FINANCIAL_CONTEXT})\b)|(?<=\b(?:{FINANCIAL_CONTEXT})\s)\b([A-Z]{{2,5}})\b"
    ))
    .expect("contextual-ticker pattern")
});

/// Outcome of the ticker stage.
#[derive(Debug, Clone, Default)]
pub struct TickerResult {
    pub processed_text: String,
    pub tickers_found: Vec<String>,
}

fn spell_out(ticker: &str) -> String {
    ticker
        .chars()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Spell out ticker symbols in `text`.
pub fn process_tickers(text: &str) -> TickerResult {
    let mut found = Vec::new();

    // Known symbols first, unconditionally.
    let pass1 = KNOWN_PATTERN
        .replace_all(text, |caps: &Captures| {
            let ticker = caps[1].to_string();
            let spelled = spell_out(&ticker);
            found.push(ticker);
            spelled
        })
        .into_owned();

    // Contextual candidates, filtered through the exclusion set.
    let pass2 = CONTEXT_PATTERN
        .replace_all(&pass1, |caps: &Captures| {
            let ticker = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            if EXCLUSIONS.contains(ticker.as_str()) {
                return ticker;
            }
            let spelled = spell_out(&ticker);
            found.push(ticker);
            spelled
        })
        .into_owned();

    found.sort();
    found.dedup();
    TickerResult { processed_text: pass2, tickers_found: found }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ticker_spelled() {
        let r = process_tickers("TSLA stock rose; the CEO spoke.");
        assert!(r.processed_text.contains("T-S-L-A"));
        assert!(!r.processed_text.contains("C-E-O"));
        assert_eq!(r.tickers_found, vec!["TSLA"]);
    }

    #[test]
    fn contextual_ticker_requires_context() {
        let r = process_tickers("ZZXQ shares surged today");
        assert!(r.processed_text.contains("Z-Z-X-Q"));

        let r = process_tickers("ZZXQ is my license plate");
        assert!(!r.processed_text.contains("Z-Z-X-Q"));
    }

    #[test]
    fn exclusions_never_hyphenated() {
        for word in ["CEO", "USA", "API", "NASA", "THE", "JSON"] {
            let input = format!("{word} stock news");
            let r = process_tickers(&input);
            assert!(
                !r.processed_text.contains('-') || word == "NASA",
                "{word} was spelled out: {}",
                r.processed_text
            );
        }
    }

    #[test]
    fn longest_symbol_wins() {
        let r = process_tickers("GOOGL climbed");
        assert!(r.processed_text.contains("G-O-O-G-L"));
        assert!(!r.processed_text.contains("G-O-O-G "));
    }

    #[test]
    fn idempotent() {
        let once = process_tickers("TSLA stock rose").processed_text;
        let twice = process_tickers(&once).processed_text;
        assert_eq!(once, twice);
    }

    #[test]
    fn multiple_tickers() {
        let r = process_tickers("AAPL and MSFT diverged");
        assert!(r.processed_text.contains("A-A-P-L"));
        assert!(r.processed_text.contains("M-S-F-T"));
        assert_eq!(r.tickers_found.len(), 2);
    }
}
