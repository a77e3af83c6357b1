//! Free-text search classification for recipient lookups.

use crate::service::{LookupKey, RecipientLookup};
use crate::types::FilterState;
use once_cell::sync::Lazy;
use regex::Regex;

static RECIPIENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^re_[A-Za-z0-9_]{25}").expect("valid recipient id regex"));

const BANK_ACCOUNT_ID_MAX_LEN: usize = 10;

pub fn is_recipient_id(term: &str) -> bool {
    RECIPIENT_ID_RE.is_match(term)
}

pub fn is_bank_account_id(term: &str) -> bool {
    term.chars().count() <= BANK_ACCOUNT_ID_MAX_LEN && term.parse::<i64>().is_ok()
}

/// Lookup key for `term`: recipient id, then numeric bank account id, then name.
pub fn classify(term: &str) -> LookupKey {
    if is_recipient_id(term) {
        LookupKey::Id
    } else if is_bank_account_id(term) {
        LookupKey::BankAccountId
    } else {
        LookupKey::Name
    }
}

/// Lookups issued for one search.
///
/// Any non-empty term that is not a recipient id is also looked up by external
/// id. Results are concatenated external first, then classified, and are not
/// de-duplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub external: Option<RecipientLookup>,
    pub classified: RecipientLookup,
}

impl SearchPlan {
    pub fn for_filter(state: &FilterState) -> Self {
        let term = state.search.as_str();
        let lookup = |key: LookupKey| RecipientLookup {
            key,
            value: term.to_string(),
            count: state.page_size,
            page: state.page,
        };

        let external = if !term.is_empty() && !is_recipient_id(term) {
            Some(lookup(LookupKey::ExternalId))
        } else {
            None
        };

        Self {
            external,
            classified: lookup(classify(term)),
        }
    }

    pub fn remote_calls(&self) -> usize {
        1 + usize::from(self.external.is_some())
    }
}
