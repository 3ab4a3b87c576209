use std::convert::TryFrom;
use std::fmt::Display;
use std::str::FromStr;

use headers::Header;
use http::header::{HeaderName, HeaderValue};

use crate::resource::Resource;

pub static DEPTH: HeaderName = HeaderName::from_static("depth");
pub static TIMEOUT: HeaderName = HeaderName::from_static("timeout");
pub static ETAG: HeaderName = HeaderName::from_static("etag");
pub static IF_RANGE: HeaderName = HeaderName::from_static("if-range");
pub static IF_MATCH: HeaderName = HeaderName::from_static("if-match");
pub static IF_NONE_MATCH: HeaderName = HeaderName::from_static("if-none-match");
pub static IF: HeaderName = HeaderName::from_static("if");
pub static DAV: HeaderName = HeaderName::from_static("dav");
pub static MS_AUTHOR_VIA: HeaderName = HeaderName::from_static("ms-author-via");

/// Prefix of the lock tokens we hand out.
pub const OPAQUE_LOCK_TOKEN: &str = "opaquelocktoken:";

// helper.
fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        Err(invalid())
    } else {
        Ok(v)
    }
}

// helper
fn invalid() -> headers::Error {
    headers::Error::invalid()
}

// helper
fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

// encode a string we generated ourselves; never fails for visible ascii.
fn str_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

macro_rules! header {
    ($tname:ident, $hname:ident, $sname:expr) => {
        pub static $hname: HeaderName = HeaderName::from_static($sname);

        #[derive(Debug, Clone, PartialEq)]
        pub struct $tname(pub String);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                one(values)?
                    .to_str()
                    .map(|x| $tname(x.to_owned()))
                    .map_err(map_invalid)
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                values.extend(std::iter::once(str_value(&self.0)))
            }
        }
    };
}

header!(ContentLocation, CONTENT_LOCATION, "content-location");
header!(LockTokenHeader, LOCK_TOKEN, "lock-token");
header!(Destination, DESTINATION, "destination");
header!(XLitmus, X_LITMUS, "x-litmus");

impl LockTokenHeader {
    /// Header value for a token id: `<opaquelocktoken:ID>`.
    pub fn from_id(id: &str) -> LockTokenHeader {
        LockTokenHeader(format!("<{}{}>", OPAQUE_LOCK_TOKEN, id))
    }

    /// The bare token id, without the pointy brackets and the scheme.
    pub fn token_id(&self) -> String {
        strip_token(&self.0)
    }
}

/// Strip `<`, `>` and the `opaquelocktoken:` prefix from a token.
pub fn strip_token(s: &str) -> String {
    let s = s.trim();
    let s = s.strip_prefix('<').unwrap_or(s);
    let s = s.strip_suffix('>').unwrap_or(s);
    s.strip_prefix(OPAQUE_LOCK_TOKEN).unwrap_or(s).to_string()
}

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// Number of levels below the resource this depth covers.
    pub fn levels(&self) -> u32 {
        match self {
            Depth::Zero => 0,
            Depth::One => 1,
            Depth::Infinity => u32::MAX,
        }
    }
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        match value.as_bytes() {
            b"0" => Ok(Depth::Zero),
            b"1" => Ok(Depth::One),
            b"infinity" | b"Infinity" => Ok(Depth::Infinity),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "Infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DavTimeout {
    Seconds(u32),
    Infinite,
}

#[derive(Debug, Clone)]
pub struct Timeout(pub Vec<DavTimeout>);

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        let mut v = Vec::new();
        let words = value.to_str().map_err(map_invalid)?.split(',');
        for word in words.map(str::trim) {
            let w = match word {
                "Infinite" => DavTimeout::Infinite,
                _ if word.starts_with("Second-") => match word[7..].parse::<u32>() {
                    Err(_) => return Err(invalid()),
                    Ok(n) => DavTimeout::Seconds(n),
                },
                _ => return Err(invalid()),
            };
            v.push(w);
        }
        Ok(Timeout(v))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = self
            .0
            .iter()
            .map(|s| match *s {
                DavTimeout::Seconds(n) => format!("Second-{}", n),
                DavTimeout::Infinite => "Infinite".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        values.extend(std::iter::once(str_value(&value)));
    }
}

// Headers with a `T` or `F` value.
macro_rules! flag_header {
    ($tname:ident, $hname:ident, $sname:expr) => {
        pub static $hname: HeaderName = HeaderName::from_static($sname);

        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $tname(pub bool);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                match one(values)?.as_bytes() {
                    b"T" | b"t" => Ok($tname(true)),
                    b"F" | b"f" => Ok($tname(false)),
                    _ => Err(invalid()),
                }
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                let value = if self.0 { "T" } else { "F" };
                values.extend(std::iter::once(HeaderValue::from_static(value)));
            }
        }
    };
}

flag_header!(Overwrite, OVERWRITE, "overwrite");
// `Brief: t` asks for a multistatus without the error propstats.
flag_header!(Brief, BRIEF, "brief");

#[derive(Debug, Clone)]
pub struct ETag {
    tag: String,
    weak: bool,
}

impl ETag {
    pub fn new(weak: bool, t: impl Into<String>) -> Result<ETag, headers::Error> {
        let t = t.into();
        if t.contains('\"') {
            Err(invalid())
        } else {
            let w = if weak { "W/" } else { "" };
            Ok(ETag {
                tag: format!("{}\"{}\"", w, t),
                weak,
            })
        }
    }

    pub fn from_resource(res: &dyn Resource) -> Option<ETag> {
        let tag = res.etag()?;
        ETag::new(false, tag.replace('"', "")).ok()
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    // weak comparison, as used by If-None-Match.
    pub(crate) fn weak_eq(&self, other: &ETag) -> bool {
        let a = self.tag.strip_prefix("W/").unwrap_or(&self.tag);
        let b = other.tag.strip_prefix("W/").unwrap_or(&other.tag);
        a == b
    }
}

impl FromStr for ETag {
    type Err = headers::Error;

    fn from_str(t: &str) -> Result<Self, Self::Err> {
        let (weak, s) = if let Some(t) = t.strip_prefix("W/") {
            (true, t)
        } else {
            (false, t)
        };
        if s.len() >= 2 && s.starts_with('\"') && s.ends_with('\"') && !s[1..s.len() - 1].contains('\"') {
            Ok(ETag {
                tag: t.to_owned(),
                weak,
            })
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<&HeaderValue> for ETag {
    type Error = headers::Error;

    fn try_from(value: &HeaderValue) -> Result<Self, Self::Error> {
        let s = value.to_str().map_err(map_invalid)?;
        ETag::from_str(s)
    }
}

impl Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.tag)
    }
}

impl PartialEq for ETag {
    fn eq(&self, other: &Self) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }
}

impl Header for ETag {
    fn name() -> &'static HeaderName {
        &ETAG
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        ETag::try_from(value)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(str_value(&self.tag)));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IfRange {
    ETag(ETag),
    Date(headers::Date),
}

impl Header for IfRange {
    fn name() -> &'static HeaderName {
        &IF_RANGE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;

        let mut iter = std::iter::once(value);
        if let Ok(tm) = headers::Date::decode(&mut iter) {
            return Ok(IfRange::Date(tm));
        }

        let mut iter = std::iter::once(value);
        if let Ok(et) = ETag::decode(&mut iter) {
            return Ok(IfRange::ETag(et));
        }

        Err(invalid())
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        match *self {
            IfRange::Date(ref d) => d.encode(values),
            IfRange::ETag(ref t) => t.encode(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ETagList {
    Tags(Vec<ETag>),
    Star,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfMatch(pub ETagList);

#[derive(Debug, Clone, PartialEq)]
pub struct IfNoneMatch(pub ETagList);

// Decode a list of etags. Commas inside etags are not handled,
// we never generate those.
fn decode_etaglist<'i, I>(values: &mut I) -> Result<ETagList, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let mut v = Vec::new();
    let mut count = 0usize;
    for value in values {
        let s = value.to_str().map_err(map_invalid)?;
        if s.trim() == "*" {
            return Ok(ETagList::Star);
        }
        for t in s.split(',') {
            // Simply skip misformed etags, they will never match.
            if let Ok(t) = ETag::from_str(t.trim()) {
                v.push(t);
            }
        }
        count += 1;
    }
    if count != 0 {
        Ok(ETagList::Tags(v))
    } else {
        Err(invalid())
    }
}

fn encode_etaglist<E>(m: &ETagList, values: &mut E)
where
    E: Extend<HeaderValue>,
{
    let value = match *m {
        ETagList::Star => "*".to_string(),
        ETagList::Tags(ref t) => t.iter().map(|t| t.tag.as_str()).collect::<Vec<&str>>().join(", "),
    };
    values.extend(std::iter::once(str_value(&value)));
}

impl Header for IfMatch {
    fn name() -> &'static HeaderName {
        &IF_MATCH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(IfMatch(decode_etaglist(values)?))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_etaglist(&self.0, values)
    }
}

impl Header for IfNoneMatch {
    fn name() -> &'static HeaderName {
        &IF_NONE_MATCH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(IfNoneMatch(decode_etaglist(values)?))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_etaglist(&self.0, values)
    }
}

/// The RFC 4918 `If` header.
///
/// The lists are ORed, the conditions inside one list are ANDed. A list
/// can be tagged with the url of the resource it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct If(pub Vec<IfList>);

#[derive(Debug, Clone, PartialEq)]
pub struct IfList {
    pub resource_tag: Option<url::Url>,
    pub conditions: Vec<IfCondition>,
}

/// `[Not] <state-token>` or `[Not] [etag]`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfCondition {
    pub not: bool,
    pub item: IfItem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IfItem {
    StateToken(String),
    ETag(ETag),
}

impl If {
    fn conditions(&self) -> impl Iterator<Item = &IfCondition> {
        self.0.iter().flat_map(|l| l.conditions.iter())
    }

    /// All lock token ids that are submitted (not negated) in this header.
    pub fn token_ids(&self) -> Vec<String> {
        self.conditions()
            .filter(|c| !c.not)
            .filter_map(|c| match c.item {
                IfItem::StateToken(ref t) if t.starts_with(OPAQUE_LOCK_TOKEN) => Some(strip_token(t)),
                _ => None,
            })
            .collect()
    }

    /// Does the header contain the `<DAV:no-lock>` state token.
    pub fn has_no_lock(&self) -> bool {
        self.conditions()
            .any(|c| !c.not && matches!(c.item, IfItem::StateToken(ref t) if t == "DAV:no-lock"))
    }
}

#[derive(Debug, PartialEq)]
enum IfToken<'a> {
    Open,
    Close,
    Not,
    // `<...>`: a resource tag or a state token, depending on position.
    Angle(&'a str),
    // `[...]`
    Square(&'a str),
    Word(&'a str),
}

fn is_delimiter(c: char) -> bool {
    c.is_ascii_whitespace() || "<>()[]".contains(c)
}

// Tokenizer over the raw header value.
struct IfLexer<'a> {
    rest: &'a str,
}

impl<'a> IfLexer<'a> {
    // `s` starts with the opening delimiter. Quotes protect `close`.
    fn delimited(&mut self, close: char) -> Result<&'a str, headers::Error> {
        let s = self.rest;
        let mut quoted = false;
        for (i, c) in s.char_indices().skip(1) {
            if c.is_ascii_whitespace() {
                break;
            }
            if c == '"' {
                quoted = !quoted;
            } else if c == close && !quoted {
                self.rest = &s[i + 1..];
                return Ok(&s[1..i]);
            }
        }
        Err(invalid())
    }

    fn next_token(&mut self) -> Result<Option<IfToken<'a>>, headers::Error> {
        self.rest = self.rest.trim_start();
        let s = self.rest;
        let Some(first) = s.chars().next() else {
            return Ok(None);
        };
        let tok = match first {
            '(' => {
                self.rest = &s[1..];
                IfToken::Open
            }
            ')' => {
                self.rest = &s[1..];
                IfToken::Close
            }
            '<' => IfToken::Angle(self.delimited('>')?),
            '[' => IfToken::Square(self.delimited(']')?),
            _ => {
                let end = s.find(is_delimiter).unwrap_or(s.len());
                if end == 0 {
                    return Err(invalid());
                }
                self.rest = &s[end..];
                match &s[..end] {
                    "Not" => IfToken::Not,
                    word => IfToken::Word(word),
                }
            }
        };
        Ok(Some(tok))
    }
}

// The conditions up to and including the closing parenthesis.
fn parse_if_list(lexer: &mut IfLexer<'_>, resource_tag: Option<url::Url>) -> Result<IfList, headers::Error> {
    let mut conditions = Vec::new();
    let mut not = false;
    loop {
        let item = match lexer.next_token()? {
            Some(IfToken::Not) if !not => {
                not = true;
                continue;
            }
            // no URI parser here, a ':' is good enough.
            Some(IfToken::Angle(t)) | Some(IfToken::Word(t)) if t.contains(':') => IfItem::StateToken(t.to_string()),
            Some(IfToken::Square(t)) => IfItem::ETag(ETag::from_str(t)?),
            Some(IfToken::Close) if !not && !conditions.is_empty() => {
                return Ok(IfList {
                    resource_tag,
                    conditions,
                });
            }
            _ => return Err(invalid()),
        };
        conditions.push(IfCondition { not, item });
        not = false;
    }
}

impl Header for If {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut lexer = IfLexer {
            rest: one(values)?.to_str().map_err(map_invalid)?,
        };
        let mut lists = Vec::new();
        while let Some(tok) = lexer.next_token()? {
            let tag = match tok {
                IfToken::Open => None,
                IfToken::Angle(url) => {
                    if lexer.next_token()? != Some(IfToken::Open) {
                        return Err(invalid());
                    }
                    Some(url::Url::parse(url).map_err(map_invalid)?)
                }
                _ => return Err(invalid()),
            };
            lists.push(parse_if_list(&mut lexer, tag)?);
        }
        if lists.is_empty() {
            return Err(invalid());
        }
        Ok(If(lists))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let mut out = Vec::new();
        for list in &self.0 {
            let conds: Vec<String> = list
                .conditions
                .iter()
                .map(|c| {
                    let not = if c.not { "Not " } else { "" };
                    match c.item {
                        IfItem::StateToken(ref t) => format!("{}<{}>", not, t),
                        IfItem::ETag(ref e) => format!("{}[{}]", not, e),
                    }
                })
                .collect();
            match list.resource_tag {
                Some(ref u) => out.push(format!("<{}> ({})", u, conds.join(" "))),
                None => out.push(format!("({})", conds.join(" "))),
            }
        }
        values.extend(std::iter::once(str_value(&out.join(" "))));
    }
}
