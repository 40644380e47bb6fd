//! `Cache-Control` directive scanning.
//!
//! One scanner serves the cacheability policy (response directives), the
//! suitability checker (request directives), and the entry's freshness
//! math. Numeric directives keep their malformed-ness visible: response
//! math degrades a bad `max-age` to 0, while request checks fail closed.

use crate::http::headers::HeaderBag;

/// A numeric directive as found on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericDirective {
    #[default]
    Absent,
    Valid(i64),
    Malformed,
}

impl NumericDirective {
    pub fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Lenient read: malformed values collapse to 0 (response-side
    /// sentinel).
    pub fn lenient(self) -> Option<i64> {
        match self {
            Self::Absent => None,
            Self::Valid(n) => Some(n),
            Self::Malformed => Some(0),
        }
    }

    /// Strict read: malformed values are an error (request-side checks
    /// fail closed).
    pub fn strict(self) -> Result<Option<i64>, ()> {
        match self {
            Self::Absent => Ok(None),
            Self::Valid(n) => Ok(Some(n)),
            Self::Malformed => Err(()),
        }
    }
}

/// Parsed `Cache-Control` directives, accumulated across every
/// occurrence of the header and every comma-separated sublist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub public: bool,
    pub private: bool,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub only_if_cached: bool,
    /// `max-stale` is recognized on requests but never honored: this
    /// cache does not serve stale responses.
    pub max_stale: bool,
    pub max_age: NumericDirective,
    pub s_maxage: NumericDirective,
    pub min_fresh: NumericDirective,
}

impl CacheControl {
    /// Scan all `Cache-Control` headers in `headers`.
    pub fn from_headers(headers: &HeaderBag) -> Self {
        let mut cc = Self::default();
        for token in headers.tokens_of("cache-control") {
            let (name, value) = match token.split_once('=') {
                Some((n, v)) => (n.trim(), Some(v.trim().trim_matches('"'))),
                None => (token, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "no-store" => cc.no_store = true,
                "no-cache" => cc.no_cache = true,
                "public" => cc.public = true,
                "private" => cc.private = true,
                "must-revalidate" => cc.must_revalidate = true,
                "proxy-revalidate" => cc.proxy_revalidate = true,
                "only-if-cached" => cc.only_if_cached = true,
                "max-stale" => cc.max_stale = true,
                "max-age" => cc.max_age = parse_numeric(value),
                "s-maxage" => cc.s_maxage = parse_numeric(value),
                "min-fresh" => cc.min_fresh = parse_numeric(value),
                _ => {}
            }
        }
        cc
    }

    /// Whether the response carries any directive that makes otherwise
    /// uncacheable status codes explicitly cacheable.
    pub fn has_explicit_caching(&self) -> bool {
        self.max_age.is_present()
            || self.s_maxage.is_present()
            || self.must_revalidate
            || self.proxy_revalidate
            || self.public
    }

    /// Whether the response carries explicit freshness information.
    pub fn has_explicit_freshness(&self) -> bool {
        self.max_age.is_present() || self.s_maxage.is_present()
    }
}

fn parse_numeric(value: Option<&str>) -> NumericDirective {
    match value {
        Some(v) if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) => {
            match v.parse::<i64>() {
                Ok(n) => NumericDirective::Valid(n),
                Err(_) => NumericDirective::Malformed,
            }
        }
        _ => NumericDirective::Malformed,
    }
}
