use mail_parser::{Addr, Address, HeaderValue, MessageParser};

/// The message header fields a filter pattern is tested against.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Envelope {
    /// The From header as a whole, `Name <address>`.
    pub from_full: Option<String>,
    pub from_addr: Option<String>,
    pub from_name: Option<String>,
    /// The To header as a whole.
    pub to_full: Option<String>,
    /// The Cc header as a whole.
    pub cc_full: Option<String>,
    pub subject: Option<String>,
    pub in_reply_to: Option<String>,
}

impl Envelope {
    /// Parses an envelope from raw message bytes. Only the header
    /// block is needed. Unparsable input gives an empty envelope.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let Some(msg) = MessageParser::default().parse(bytes) else {
            return Self::default();
        };

        let mut envelope = Self::default();

        if let Some(from) = msg.from() {
            envelope.from_full = Some(render_address(from));

            if let Some(addr) = first_addr(from) {
                envelope.from_addr = addr.address.as_ref().map(ToString::to_string);
                envelope.from_name = addr.name.as_ref().map(ToString::to_string);
            }
        }

        envelope.to_full = msg.to().map(render_address);
        envelope.cc_full = msg.cc().map(render_address);

        envelope.subject = msg.subject().map(ToString::to_string);

        envelope.in_reply_to = match msg.in_reply_to() {
            HeaderValue::Text(id) => Some(id.to_string()),
            HeaderValue::TextList(ids) => Some(ids.join(" ")),
            _ => None,
        };

        envelope
    }

    /// Returns every value the pattern should be tested against.
    ///
    /// Multi-address headers are only given as a whole, so a pattern
    /// has to match the complete header value.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        [
            &self.from_full,
            &self.from_addr,
            &self.from_name,
            &self.to_full,
            &self.cc_full,
            &self.subject,
            &self.in_reply_to,
        ]
        .into_iter()
        .filter_map(Option::as_deref)
    }
}

fn first_addr<'a, 'x>(addr: &'a Address<'x>) -> Option<&'a Addr<'x>> {
    match addr {
        Address::List(addrs) => addrs.first(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).next(),
    }
}

fn all_addrs<'a, 'x>(addr: &'a Address<'x>) -> Vec<&'a Addr<'x>> {
    match addr {
        Address::List(addrs) => addrs.iter().collect(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
    }
}

fn render_addr(addr: &Addr) -> String {
    match (&addr.name, &addr.address) {
        (Some(name), Some(email)) => format!("{name} <{email}>"),
        (None, Some(email)) => email.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

fn render_address(addr: &Address) -> String {
    all_addrs(addr)
        .into_iter()
        .map(render_addr)
        .filter(|addr| !addr.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extracts the text body of a raw message.
pub(super) fn parse_text_body(bytes: &[u8]) -> Option<String> {
    let msg = MessageParser::default().parse(bytes)?;
    msg.body_text(0).map(|body| body.into_owned())
}
