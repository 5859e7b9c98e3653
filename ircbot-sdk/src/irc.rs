//! IRC wire format: line parsing, serialization and CTCP helpers.
//!
//! Lines follow RFC 1459 with IRCv3 message tags:
//!
//! ```text
//! [@tag=value;tag2 ][:prefix ]COMMAND [param ...][ :trailing]
//! ```

use std::collections::HashMap;
use std::fmt;

/// Marker byte that delimits CTCP payloads inside PRIVMSG/NOTICE text.
pub const CTCP_DELIM: char = '\x01';

/// A single parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Build a message with no tags and no prefix.
    pub fn new(command: &str, params: Vec<String>) -> Self {
        Self {
            tags: HashMap::new(),
            prefix: None,
            command: command.to_string(),
            params,
        }
    }

    /// Parse one line. Returns `None` for blank lines or lines without a command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut tags = HashMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, after) = stripped.split_once(' ')?;
            for tag in raw_tags.split(';').filter(|t| !t.is_empty()) {
                match tag.split_once('=') {
                    Some((k, v)) => tags.insert(k.to_string(), unescape_tag_value(v)),
                    None => tags.insert(tag.to_string(), String::new()),
                };
            }
            rest = after.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, after) = stripped.split_once(' ')?;
            prefix = Some(p.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, r)) => (c, r),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            // 14 middle params at most; the 15th swallows the rest of the line
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            if params.len() == 14 {
                params.push(rest.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, r)) => {
                    params.push(p.to_string());
                    rest = r;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix, if the prefix is a user mask.
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split('!').next().unwrap_or(p))
            .filter(|n| !n.is_empty())
    }

    /// True when the prefix names a user (`nick!user@host`) rather than a server.
    pub fn from_user(&self) -> bool {
        self.prefix.as_deref().is_some_and(|p| p.contains('!'))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            let mut keys: Vec<&String> = self.tags.keys().collect();
            keys.sort();
            let rendered: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    let v = &self.tags[k];
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{k}={}", escape_tag_value(v))
                    }
                })
                .collect();
            write!(f, "@{} ", rendered.join(";"))?;
        }
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon = i == last
                && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Whether `target` names a channel rather than a user.
pub fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Replace line breaks so user text cannot smuggle extra protocol lines.
pub fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// A CTCP request or reply embedded in message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ctcp {
    pub command: String,
    pub args: String,
}

impl Ctcp {
    /// Parse `\x01COMMAND args\x01`. The closing delimiter is optional.
    pub fn parse(text: &str) -> Option<Self> {
        let inner = text.strip_prefix(CTCP_DELIM)?;
        let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
        let (command, args) = match inner.split_once(' ') {
            Some((c, a)) => (c, a),
            None => (inner, ""),
        };
        if command.is_empty() {
            return None;
        }
        Some(Self {
            command: command.to_ascii_uppercase(),
            args: args.to_string(),
        })
    }

    /// Render a CTCP payload.
    pub fn format(command: &str, args: &str) -> String {
        if args.is_empty() {
            format!("{CTCP_DELIM}{command}{CTCP_DELIM}")
        } else {
            format!("{CTCP_DELIM}{command} {args}{CTCP_DELIM}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_privmsg_with_prefix() {
        let msg = Message::parse(":alice!a@host PRIVMSG #rust :hello there\r\n").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!a@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#rust", "hello there"]);
        assert_eq!(msg.nick(), Some("alice"));
        assert!(msg.from_user());
    }

    #[test]
    fn parse_numeric_from_server() {
        let msg = Message::parse(":irc.example.net 001 bot :Welcome to the network").unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["bot", "Welcome to the network"]);
        assert!(!msg.from_user());
        assert_eq!(msg.nick(), Some("irc.example.net"));
    }

    #[test]
    fn parse_without_prefix_and_lowercase_command() {
        let msg = Message::parse("ping :12345").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["12345"]);
        assert!(msg.prefix.is_none());
    }

    #[test]
    fn parse_tags_are_unescaped() {
        let msg = Message::parse("@time=2025-01-01T00:00:00Z;note=a\\sb\\:c;flag :n!u@h PRIVMSG #c :x")
            .unwrap();
        assert_eq!(msg.tags["time"], "2025-01-01T00:00:00Z");
        assert_eq!(msg.tags["note"], "a b;c");
        assert_eq!(msg.tags["flag"], "");
        assert_eq!(msg.params, vec!["#c", "x"]);
    }

    #[test]
    fn parse_rejects_blank_and_prefix_only() {
        assert!(Message::parse("").is_none());
        assert!(Message::parse("\r\n").is_none());
        assert!(Message::parse(":server.only").is_none());
    }

    #[test]
    fn parse_collapses_extra_spaces() {
        let msg = Message::parse(":s  475  bot  #secret :Cannot join channel (+k)").unwrap();
        assert_eq!(msg.command, "475");
        assert_eq!(msg.params, vec!["bot", "#secret", "Cannot join channel (+k)"]);
    }

    #[test]
    fn parse_fifteenth_param_takes_the_rest() {
        let line = "CMD 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16";
        let msg = Message::parse(line).unwrap();
        assert_eq!(msg.params.len(), 15);
        assert_eq!(msg.params[14], "15 16");
    }

    #[test]
    fn display_adds_colon_only_when_needed() {
        let join = Message::new("JOIN", vec!["#rust".into()]);
        assert_eq!(join.to_string(), "JOIN #rust");

        let say = Message::new("PRIVMSG", vec!["#rust".into(), "hi all".into()]);
        assert_eq!(say.to_string(), "PRIVMSG #rust :hi all");

        let empty = Message::new("TOPIC", vec!["#rust".into(), String::new()]);
        assert_eq!(empty.to_string(), "TOPIC #rust :");

        let colon = Message::new("PRIVMSG", vec!["bob".into(), ":)".into()]);
        assert_eq!(colon.to_string(), "PRIVMSG bob ::)");
    }

    #[test]
    fn display_escapes_tags_and_keeps_prefix() {
        let mut msg = Message::new("PRIVMSG", vec!["#c".into(), "x".into()]);
        msg.prefix = Some("n!u@h".into());
        msg.tags.insert("note".into(), "a b;c".into());
        let line = msg.to_string();
        assert_eq!(line, "@note=a\\sb\\:c :n!u@h PRIVMSG #c x");
        assert_eq!(Message::parse(&line).unwrap(), msg);
    }

    #[test]
    fn channel_detection() {
        assert!(is_channel("#rust"));
        assert!(is_channel("&local"));
        assert!(!is_channel("alice"));
        assert!(!is_channel(""));
    }

    #[test]
    fn sanitize_strips_line_breaks() {
        assert_eq!(sanitize("a\r\nQUIT :bye"), "a  QUIT :bye");
    }

    #[test]
    fn ctcp_parse_and_format() {
        let v = Ctcp::parse("\x01version\x01").unwrap();
        assert_eq!(v.command, "VERSION");
        assert_eq!(v.args, "");

        let p = Ctcp::parse("\x01PING 1700000000").unwrap();
        assert_eq!(p.command, "PING");
        assert_eq!(p.args, "1700000000");

        assert!(Ctcp::parse("plain text").is_none());
        assert!(Ctcp::parse("\x01\x01").is_none());

        assert_eq!(Ctcp::format("VERSION", "ircbot 0.1"), "\x01VERSION ircbot 0.1\x01");
        assert_eq!(Ctcp::format("TIME", ""), "\x01TIME\x01");
    }
}
