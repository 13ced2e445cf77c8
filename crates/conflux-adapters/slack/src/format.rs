//! Slack text dialect conversions.
//!
//! Inbound text arrives in Slack's "mrkdwn" with `<...>` escapes for users,
//! channels, special mentions and links; these helpers rewrite it into the
//! plain markdown the relay passes around. Outbound only needs the code
//! fence fix-up and topic extraction.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([a-zA-Z0-9]+)>").expect("invalid mention regex"));

static CHANNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#[a-zA-Z0-9]+\|(.+?)>").expect("invalid channel regex"));

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!((?:subteam\^)?[a-zA-Z0-9]+)(?:\|@?(.+?))?>").expect("invalid variable regex")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<|>]+)\|([^>]+)>").expect("invalid url regex"));

static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<((?:https?|mailto|ftp):[^<|>]+)>").expect("invalid bare url regex")
});

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```\w+$").expect("invalid code fence regex"));

static TOPIC_OR_PURPOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(@.+) (cleared|set)(?: the)? channel (topic|purpose)(?:: (.*))?")
        .expect("invalid topic regex")
});

static MARKDOWN_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(^|[\s.;,])~([^~\s][^~]*?)~", "${1}~~${2}~~"),
        (r"(^|[\s.;,])\*([^*\s][^*]*?)\*", "${1}**${2}**"),
        (r"(^|[\s.;,])_([^_\s][^_]*?)_", "${1}*${2}*"),
    ]
    .into_iter()
    .map(|(re, rep)| (Regex::new(re).expect("invalid markdown regex"), rep))
    .collect()
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([A-Za-z][A-Za-z0-9]{1,7}));")
        .expect("invalid entity regex")
});

/// Named references: the Latin-1 set plus common typographic ones.
static NAMED_ENTITIES: LazyLock<HashMap<&'static str, char>> = LazyLock::new(|| {
    [
        ("amp", '&'), ("lt", '<'), ("gt", '>'), ("quot", '"'), ("apos", '\''),
        ("nbsp", '\u{a0}'), ("iexcl", '¡'), ("cent", '¢'), ("pound", '£'),
        ("curren", '¤'), ("yen", '¥'), ("brvbar", '¦'), ("sect", '§'), ("uml", '¨'),
        ("copy", '©'), ("ordf", 'ª'), ("laquo", '«'), ("not", '¬'), ("shy", '\u{ad}'),
        ("reg", '®'), ("macr", '¯'), ("deg", '°'), ("plusmn", '±'), ("sup2", '²'),
        ("sup3", '³'), ("acute", '´'), ("micro", 'µ'), ("para", '¶'), ("middot", '·'),
        ("cedil", '¸'), ("sup1", '¹'), ("ordm", 'º'), ("raquo", '»'), ("frac14", '¼'),
        ("frac12", '½'), ("frac34", '¾'), ("iquest", '¿'), ("Agrave", 'À'),
        ("Aacute", 'Á'), ("Acirc", 'Â'), ("Atilde", 'Ã'), ("Auml", 'Ä'), ("Aring", 'Å'),
        ("AElig", 'Æ'), ("Ccedil", 'Ç'), ("Egrave", 'È'), ("Eacute", 'É'),
        ("Ecirc", 'Ê'), ("Euml", 'Ë'), ("Igrave", 'Ì'), ("Iacute", 'Í'), ("Icirc", 'Î'),
        ("Iuml", 'Ï'), ("ETH", 'Ð'), ("Ntilde", 'Ñ'), ("Ograve", 'Ò'), ("Oacute", 'Ó'),
        ("Ocirc", 'Ô'), ("Otilde", 'Õ'), ("Ouml", 'Ö'), ("times", '×'), ("Oslash", 'Ø'),
        ("Ugrave", 'Ù'), ("Uacute", 'Ú'), ("Ucirc", 'Û'), ("Uuml", 'Ü'), ("Yacute", 'Ý'),
        ("THORN", 'Þ'), ("szlig", 'ß'), ("agrave", 'à'), ("aacute", 'á'), ("acirc", 'â'),
        ("atilde", 'ã'), ("auml", 'ä'), ("aring", 'å'), ("aelig", 'æ'), ("ccedil", 'ç'),
        ("egrave", 'è'), ("eacute", 'é'), ("ecirc", 'ê'), ("euml", 'ë'), ("igrave", 'ì'),
        ("iacute", 'í'), ("icirc", 'î'), ("iuml", 'ï'), ("eth", 'ð'), ("ntilde", 'ñ'),
        ("ograve", 'ò'), ("oacute", 'ó'), ("ocirc", 'ô'), ("otilde", 'õ'), ("ouml", 'ö'),
        ("divide", '÷'), ("oslash", 'ø'), ("ugrave", 'ù'), ("uacute", 'ú'), ("ucirc", 'û'),
        ("uuml", 'ü'), ("yacute", 'ý'), ("thorn", 'þ'), ("yuml", 'ÿ'), ("OElig", 'Œ'),
        ("oelig", 'œ'), ("Scaron", 'Š'), ("scaron", 'š'), ("Yuml", 'Ÿ'), ("fnof", 'ƒ'),
        ("circ", 'ˆ'), ("tilde", '˜'), ("ensp", '\u{2002}'), ("emsp", '\u{2003}'),
        ("thinsp", '\u{2009}'), ("zwnj", '\u{200c}'), ("zwj", '\u{200d}'),
        ("ndash", '–'), ("mdash", '—'), ("lsquo", '‘'), ("rsquo", '’'), ("sbquo", '‚'),
        ("ldquo", '“'), ("rdquo", '”'), ("bdquo", '„'), ("dagger", '†'),
        ("Dagger", '‡'), ("bull", '•'), ("hellip", '…'), ("permil", '‰'),
        ("prime", '′'), ("Prime", '″'), ("lsaquo", '‹'), ("rsaquo", '›'),
        ("euro", '€'), ("trade", '™'), ("larr", '←'), ("uarr", '↑'), ("rarr", '→'),
        ("darr", '↓'), ("harr", '↔'), ("lArr", '⇐'), ("rArr", '⇒'), ("hArr", '⇔'),
        ("ne", '≠'), ("le", '≤'), ("ge", '≥'), ("infin", '∞'), ("spades", '♠'),
        ("clubs", '♣'), ("hearts", '♥'), ("diams", '♦'),
    ]
    .into_iter()
    .collect()
});

/// User IDs mentioned as `<@U123>`.
pub fn mention_ids(text: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Rewrites `<@U123>` to `@name`. Unknown IDs are left as they are.
pub fn replace_mentions(text: &str, names: &HashMap<String, String>) -> String {
    MENTION_RE
        .replace_all(text, |c: &Captures<'_>| match names.get(&c[1]) {
            Some(name) => format!("@{name}"),
            None => c[0].to_string(),
        })
        .into_owned()
}

/// Rewrites `<#C123|general>` to `#general`.
pub fn replace_channels(text: &str) -> String {
    CHANNEL_RE.replace_all(text, "#${1}").into_owned()
}

/// Rewrites special mentions: `<!here>` to `@here`, `<!subteam^S1|@team>`
/// to `@team`.
pub fn replace_variables(text: &str) -> String {
    VARIABLE_RE
        .replace_all(text, |c: &Captures<'_>| match c.get(2) {
            Some(label) => format!("@{}", label.as_str()),
            None => format!("@{}", &c[1]),
        })
        .into_owned()
}

/// Rewrites `<url|label>` to `[label](url)` and `<url>` to `url`.
pub fn replace_urls(text: &str) -> String {
    let labelled = URL_RE.replace_all(text, "[${2}](${1})");
    BARE_URL_RE.replace_all(&labelled, "${1}").into_owned()
}

/// Converts Slack's single-character emphasis to markdown.
pub fn repair_markdown(text: &str) -> String {
    MARKDOWN_RULES
        .iter()
        .fold(text.to_string(), |acc, (re, rep)| {
            re.replace_all(&acc, *rep).into_owned()
        })
}

/// Decodes HTML character references in one pass, so `&amp;lt;` becomes
/// `&lt;`. Named references cover Latin-1 and common typography; unknown
/// names are left as they are.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |c: &Captures<'_>| {
            let decoded = match (c.get(1), c.get(2), c.get(3)) {
                (Some(dec), _, _) => dec.as_str().parse::<u32>().ok().and_then(char::from_u32),
                (_, Some(hex), _) => u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32),
                (_, _, Some(name)) => NAMED_ENTITIES.get(name.as_str()).copied(),
                _ => None,
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| c[0].to_string())
        })
        .into_owned()
}

/// Strips language hints from code fences (`` ```rust `` → `` ``` ``),
/// which Slack renders literally.
pub fn replace_code_fence(text: &str) -> String {
    CODE_FENCE_RE.replace_all(text, "```").into_owned()
}

/// What a topic-change message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicUpdate {
    Topic(String),
    Purpose(String),
}

/// Parses `"@user set the channel topic: X"` and
/// `"@user cleared channel purpose"` style messages.
pub fn extract_topic_or_purpose(text: &str) -> Option<TopicUpdate> {
    let caps = TOPIC_OR_PURPOSE_RE.captures(text)?;
    let value = match &caps[2] {
        "set" => caps.get(4).map_or("", |m| m.as_str()).to_string(),
        _ => String::new(),
    };
    match &caps[3] {
        "topic" => Some(TopicUpdate::Topic(value)),
        _ => Some(TopicUpdate::Purpose(value)),
    }
}
