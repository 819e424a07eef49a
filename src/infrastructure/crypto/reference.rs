//! Human-facing reservation reference codes

use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 6;

/// Generate a reference code: `<prefix>-<YYMMDD>-<6 alnum>`
///
/// Example: `BK-250115-Q7X2MA`
pub fn generate_reference_code(prefix: &str, date: NaiveDate) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}-{}-{}", prefix, date.format("%y%m%d"), suffix)
}
