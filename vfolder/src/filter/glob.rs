use regex::Regex;
use tracing::trace;

use crate::{Error, Result};

use super::{FilterStrategy, Message, SearchScope};

/// The glob filter strategy.
///
/// `*` matches any sequence of characters (line breaks included), `?`
/// matches exactly one character, any other character matches
/// itself. The whole value must match, case matters.
#[derive(Clone, Debug)]
pub struct GlobFilter {
    pattern: String,
    regex: Regex,
    scope: SearchScope,
}

impl GlobFilter {
    /// Compiles the given glob pattern.
    pub fn build(pattern: impl ToString, scope: SearchScope) -> Result<Self> {
        let pattern = pattern.to_string();
        let regex = Regex::new(&glob_to_regex(&pattern))
            .map_err(|err| Error::CompileFilterError(err, pattern.clone()))?;

        Ok(Self {
            pattern,
            regex,
            scope,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn scope(&self) -> SearchScope {
        self.scope
    }

    /// Returns `true` if the given value matches the pattern.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    fn matches_headers(&self, msg: &Message) -> bool {
        msg.envelope().fields().any(|field| self.is_match(field))
    }

    fn matches_body(&self, msg: &Message) -> bool {
        msg.body().is_some_and(|body| self.is_match(body))
    }
}

impl FilterStrategy for GlobFilter {
    fn matches(&self, msg: &Message) -> bool {
        let matches = (self.scope.includes_headers() && self.matches_headers(msg))
            || (self.scope.includes_body() && self.matches_body(msg));

        trace!(pattern = self.pattern.as_str(), matches, "tested message against glob");
        matches
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("(?s)^");
    let mut literal = String::new();

    for c in glob.chars() {
        match c {
            '*' | '?' => {
                regex.push_str(&regex::escape(&literal));
                literal.clear();
                regex.push_str(if c == '*' { ".*" } else { "." });
            }
            c => literal.push(c),
        }
    }

    regex.push_str(&regex::escape(&literal));
    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use crate::filter::{Envelope, FilterStrategy, Message, SearchScope};

    use super::{glob_to_regex, GlobFilter};

    fn subject(subject: &str) -> Message<'static> {
        let envelope = Envelope {
            subject: Some(subject.to_owned()),
            ..Default::default()
        };
        Message::new(envelope, || Ok(None))
    }

    #[test]
    fn translate_glob() {
        assert_eq!(glob_to_regex("*invoice*"), "(?s)^.*invoice.*$");
        assert_eq!(glob_to_regex("a?c"), "(?s)^a.c$");
        assert_eq!(glob_to_regex("1+1 (x)"), r"(?s)^1\+1 \(x\)$");
        assert_eq!(glob_to_regex(""), "(?s)^$");
    }

    #[test]
    fn match_whole_value() {
        let filter = GlobFilter::build("*invoice*", SearchScope::Headers).unwrap();
        assert!(filter.is_match("March invoice"));
        assert!(filter.is_match("invoice"));
        assert!(filter.is_match("line\ninvoice\nline"));
        assert!(!filter.is_match("Meeting notes"));
        assert!(!filter.is_match("March Invoice"));

        let filter = GlobFilter::build("inv?ice", SearchScope::Headers).unwrap();
        assert!(filter.is_match("invoice"));
        assert!(!filter.is_match("invice"));
        assert!(!filter.is_match("an invoice"));

        let filter = GlobFilter::build("[urgent] *", SearchScope::Headers).unwrap();
        assert!(filter.is_match("[urgent] call back"));
        assert!(!filter.is_match("u call back"));
    }

    #[test]
    fn match_headers() {
        let filter = GlobFilter::build("*invoice*", SearchScope::Headers).unwrap();
        assert!(filter.matches(&subject("March invoice")));
        assert!(!filter.matches(&subject("Meeting notes")));
    }

    #[test]
    fn match_whole_address_headers() {
        let raw = concat!(
            "From: Alice <alice@localhost>\r\n",
            "To: bob@localhost, carol@localhost\r\n",
            "Subject: hi\r\n",
            "\r\n",
        );

        let matches = |pattern: &str| {
            let filter = GlobFilter::build(pattern, SearchScope::Headers).unwrap();
            filter.matches(&Message::from_raw(raw))
        };

        assert!(matches("Alice <alice@localhost>"));
        assert!(matches("*<alice@localhost>"));
        assert!(matches("alice@localhost"));
        assert!(matches("Alice"));
        assert!(matches("bob@localhost, carol@localhost"));
        assert!(matches("*carol@localhost"));
        assert!(!matches("bob@localhost"));
        assert!(!matches("carol@localhost"));
    }

    #[test]
    fn match_body_lazily() {
        let raw = "Subject: Meeting notes\r\n\r\nPlease find the invoice attached.\r\n";

        let filter = GlobFilter::build("*invoice*", SearchScope::Headers).unwrap();
        assert!(!filter.matches(&Message::from_raw(raw)));

        let filter = GlobFilter::build("*invoice*", SearchScope::Body).unwrap();
        assert!(filter.matches(&Message::from_raw(raw)));

        let filter = GlobFilter::build("*Meeting*", SearchScope::Body).unwrap();
        assert!(!filter.matches(&Message::from_raw(raw)));

        // headers match first, the body is never loaded
        let filter = GlobFilter::build("*invoice*", SearchScope::Both).unwrap();
        let msg = subject("March invoice");
        assert!(filter.matches(&msg));
        assert!(msg.raw_if_loaded().is_none());
    }

    #[test]
    fn failed_body_load_is_no_match() {
        let filter = GlobFilter::build("*", SearchScope::Body).unwrap();
        let msg = Message::new(Envelope::default(), || Err("unreachable storage".into()));
        assert!(!filter.matches(&msg));
    }
}
