//! Query-string persistence for [`FilterState`].
//!
//! The state is flattened into form-urlencoded pairs with bracketed nested
//! keys (`dates[start]`, `filters[status]`, `sort[field]`). Missing or empty
//! values fall back to the defaults (`count=15`, `offset=1`, `search=''` and
//! the default date window).

use crate::types::{DateRange, FilterState, SortDirection, SortOrder};
use chrono::NaiveDate;
use tracing::debug;
use url::form_urlencoded;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Holds the persisted query of the current location and guards against
/// re-persisting (and re-fetching) an identical state.
#[derive(Debug, Clone)]
pub struct QueryPersistence {
    defaults: FilterState,
    current: String,
}

impl QueryPersistence {
    /// A non-empty location is held in normalized form, so a differently
    /// spelled query for the same state does not count as a change.
    pub fn new(defaults: FilterState, location_query: &str) -> Self {
        let mut persistence = Self {
            defaults,
            current: String::new(),
        };
        let raw = strip_question_mark(location_query);
        if !raw.is_empty() {
            persistence.current = Self::serialize(&persistence.parse(raw));
        }
        persistence
    }

    pub fn defaults(&self) -> &FilterState {
        &self.defaults
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Flatten `state` into its navigable query form.
    pub fn serialize(state: &FilterState) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        out.append_pair("count", &state.page_size.to_string());
        out.append_pair("offset", &state.page.to_string());
        out.append_pair("search", &state.search);
        out.append_pair(
            "dates[start]",
            &state.date_range.start.format(DATE_FORMAT).to_string(),
        );
        out.append_pair(
            "dates[end]",
            &state.date_range.end.format(DATE_FORMAT).to_string(),
        );
        for (name, values) in &state.filters {
            let key = format!("filters[{name}]");
            for value in values {
                out.append_pair(&key, value);
            }
        }
        if let Some(sort) = &state.sort {
            out.append_pair("sort[field]", &sort.field);
            out.append_pair("sort[direction]", sort.direction.as_str());
        }
        out.finish()
    }

    /// Parse a location query, normalizing anything missing to the defaults.
    pub fn parse(&self, raw: &str) -> FilterState {
        let mut state = self.defaults.clone();
        let mut start = None;
        let mut end = None;
        let mut sort_field = None;
        let mut sort_direction = None;

        let query = strip_question_mark(raw);
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "count" => state.page_size = positive_or(&value, self.defaults.page_size),
                "offset" => state.page = positive_or(&value, self.defaults.page),
                "search" => state.search = value.into_owned(),
                "dates[start]" => start = parse_date(&value),
                "dates[end]" => end = parse_date(&value),
                "sort[field]" if !value.is_empty() => sort_field = Some(value.into_owned()),
                "sort[direction]" => sort_direction = SortDirection::parse(&value),
                other => match filter_name(other) {
                    Some(name) if !value.is_empty() => state
                        .filters
                        .entry(name.to_string())
                        .or_default()
                        .push(value.into_owned()),
                    Some(_) => {}
                    None => debug!(key = other, "ignoring unknown query key"),
                },
            }
        }

        let start = start.unwrap_or(self.defaults.date_range.start);
        let end = end.unwrap_or(self.defaults.date_range.end);
        state.date_range = if start <= end {
            DateRange::new(start, end)
        } else {
            DateRange::new(end, start)
        };

        state.sort = sort_field.map(|field| SortOrder {
            field,
            direction: sort_direction.unwrap_or(SortDirection::Descending),
        });

        state
    }

    /// Put back a previously persisted query.
    pub fn restore(&mut self, query: String) {
        self.current = query;
    }

    /// Persist `state` as the current query. Returns the new query only when
    /// it differs from what the location already carries.
    pub fn persist(&mut self, state: &FilterState) -> Option<String> {
        let next = Self::serialize(state);
        if next == self.current {
            debug!(query = %next, "query unchanged; skipping persist");
            return None;
        }
        self.current = next.clone();
        Some(next)
    }
}

fn strip_question_mark(raw: &str) -> &str {
    raw.strip_prefix('?').unwrap_or(raw)
}

fn positive_or(raw: &str, default: u32) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => value,
        _ => default,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

fn filter_name(key: &str) -> Option<&str> {
    let inner = key.strip_prefix("filters[")?;
    let inner = inner.strip_suffix("[]").unwrap_or(inner);
    let name = inner.strip_suffix(']')?;
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn defaults() -> FilterState {
        FilterState::new(DateRange::new(day(2024, 1, 24), day(2024, 1, 31)), 15)
    }

    #[test]
    fn empty_query_yields_documented_defaults() {
        let persistence = QueryPersistence::new(defaults(), "");
        let state = persistence.parse("");
        assert_eq!(state.page_size, 15);
        assert_eq!(state.page, 1);
        assert_eq!(state.search, "");
        assert_eq!(state.date_range, defaults().date_range);
    }

    #[test]
    fn empty_and_garbage_values_fall_back() {
        let persistence = QueryPersistence::new(defaults(), "");
        let state = persistence.parse("?count=&offset=abc&search=");
        assert_eq!(state.page_size, 15);
        assert_eq!(state.page, 1);
    }

    #[test]
    fn nested_keys_round_trip() {
        let persistence = QueryPersistence::new(defaults(), "");
        let mut state = defaults();
        state.page = 3;
        state.search = "loja centro".to_string();
        state
            .filters
            .insert("status".to_string(), vec!["active".to_string(), "blocked".to_string()]);
        state.sort = Some(SortOrder {
            field: "created_at".to_string(),
            direction: SortDirection::Ascending,
        });

        let query = QueryPersistence::serialize(&state);
        assert_eq!(persistence.parse(&format!("?{query}")), state);
    }

    #[test]
    fn array_style_filter_keys_are_accepted() {
        let persistence = QueryPersistence::new(defaults(), "");
        let state = persistence.parse("filters%5Bstatus%5D%5B%5D=paid&filters[status][]=refused");
        assert_eq!(
            state.filters.get("status"),
            Some(&vec!["paid".to_string(), "refused".to_string()])
        );
    }

    #[test]
    fn reversed_dates_are_normalized() {
        let persistence = QueryPersistence::new(defaults(), "");
        let state = persistence.parse("dates[start]=2024-02-10&dates[end]=2024-02-01");
        assert_eq!(state.date_range, DateRange::new(day(2024, 2, 1), day(2024, 2, 10)));
    }

    #[test]
    fn persist_is_idempotent() {
        let state = defaults();
        let location = QueryPersistence::serialize(&state);
        let mut persistence = QueryPersistence::new(defaults(), &format!("?{location}"));

        assert!(persistence.persist(&state).is_none());

        let mut next = state.clone();
        next.page = 2;
        let persisted = persistence.persist(&next).unwrap();
        assert!(persisted.contains("offset=2"));
        assert_eq!(persistence.current(), persisted);
        assert!(persistence.persist(&next).is_none());
    }

    #[test]
    fn equivalent_location_spelling_is_not_a_change() {
        let mut persistence = QueryPersistence::new(
            defaults(),
            "?offset=1&count=15&dates[start]=2024-01-24&dates[end]=2024-01-31",
        );
        assert!(persistence.persist(&defaults()).is_none());
    }
}
