//! Per-compiler recognition of diagnostic header lines.
//!
//! Each [`LineMatcher`] variant answers two questions about a line: does it
//! start a diagnostic, and what are its header fields. Everything else in the
//! parser is format-agnostic.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::diagnostic::Severity;

/// `path:line[:col]: severity: message` (clang and gcc; the column is
/// optional in both).
static COLON_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<path>(?:[A-Za-z]:)?[^:]+):(?P<line>[^:\s]+):(?:(?P<col>[^:\s]+):)? (?P<sev>fatal error|error|warning|note): ?(?P<msg>.*)$",
    )
    .expect("COLON_HEADER regex should compile")
});

/// `path(line[,col]): severity [CODE]: message` (MSVC).
static MSVC_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<path>.+?)\((?P<line>[^,)]+)(?:,(?P<col>[^)]+))?\)\s*: (?P<sev>fatal error|error|warning|note)(?: (?P<code>[A-Z]+\d+))?: ?(?P<msg>.*)$",
    )
    .expect("MSVC_HEADER regex should compile")
});

/// gcc's scope lines, e.g. `a.cpp: In function 'int main()':`.
static GCC_SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[^:]+: (?:In (?:static member |member )?function|In constructor|In destructor|In lambda function|In instantiation of|At global scope)",
    )
    .expect("GCC_SCOPE regex should compile")
});

/// Trailing option tag, e.g. ` [-Wunused-variable]`.
static OPTION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+\[(?P<tag>-[^\]\s]+)\]$").expect("OPTION_TAG regex should compile")
});

/// Compiler family hint supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerFamily {
    /// Sniff the family from the first recognizable line.
    #[default]
    Auto,
    Clang,
    Gcc,
    Msvc,
}

impl CompilerFamily {
    /// Guess a family from a compiler executable or fixture directory name
    /// (`clang++-17`, `g++-13`, `cl.exe`).
    pub fn from_compiler_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let stem = name.trim_end_matches(".exe");
        if stem.contains("clang") {
            CompilerFamily::Clang
        } else if stem.starts_with("g++") || stem.starts_with("gcc") || stem.contains("-gcc") {
            CompilerFamily::Gcc
        } else if stem == "cl" || stem.contains("msvc") {
            CompilerFamily::Msvc
        } else {
            CompilerFamily::Auto
        }
    }

    /// The matcher this hint pins, if any.
    pub fn matcher(self) -> Option<LineMatcher> {
        match self {
            CompilerFamily::Auto => None,
            CompilerFamily::Clang => Some(LineMatcher::Clang),
            CompilerFamily::Gcc => Some(LineMatcher::Gcc),
            CompilerFamily::Msvc => Some(LineMatcher::Msvc),
        }
    }
}

impl FromStr for CompilerFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(CompilerFamily::Auto),
            "clang" => Ok(CompilerFamily::Clang),
            "gcc" => Ok(CompilerFamily::Gcc),
            "msvc" => Ok(CompilerFamily::Msvc),
            other => Err(format!("unknown compiler family: {other:?}")),
        }
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerFamily::Auto => write!(f, "auto"),
            CompilerFamily::Clang => write!(f, "clang"),
            CompilerFamily::Gcc => write!(f, "gcc"),
            CompilerFamily::Msvc => write!(f, "msvc"),
        }
    }
}

/// Fields parsed from a diagnostic header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub severity: Severity,
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub code: Option<String>,
}

/// Result of testing one line against a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMatch {
    NotHeader,
    Header(Header),
    /// Shaped like a header, but a field failed validation.
    Ambiguous(String),
}

/// Header recognizer for one compiler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMatcher {
    Clang,
    Gcc,
    Msvc,
}

impl LineMatcher {
    /// Pick a matcher from the first line that identifies a family.
    ///
    /// Returns `None` when no line looks like compiler output at all.
    pub fn sniff<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        for line in lines {
            let line = line.trim_end_matches('\r');
            if MSVC_HEADER.is_match(line) {
                return Some(LineMatcher::Msvc);
            }
            if GCC_SCOPE.is_match(line) {
                return Some(LineMatcher::Gcc);
            }
            // clang always reports a column; gcc may leave it out.
            if let Some(caps) = COLON_HEADER.captures(line) {
                return Some(if caps.name("col").is_some() {
                    LineMatcher::Clang
                } else {
                    LineMatcher::Gcc
                });
            }
        }
        None
    }

    /// Parse the header fields of a line.
    pub fn parse_header(&self, line: &str) -> HeaderMatch {
        let Some(caps) = self.regex().captures(line) else {
            return HeaderMatch::NotHeader;
        };

        let line_no = match parse_position(&caps, "line") {
            Ok(Some(n)) => n,
            Ok(None) => return HeaderMatch::Ambiguous("missing line number".to_string()),
            Err(reason) => return HeaderMatch::Ambiguous(reason),
        };
        let column = match parse_position(&caps, "col") {
            Ok(n) => n.unwrap_or(0),
            Err(reason) => return HeaderMatch::Ambiguous(reason),
        };
        let Some(severity) = caps.name("sev").and_then(|m| Severity::from_word(m.as_str()))
        else {
            return HeaderMatch::NotHeader;
        };
        let path = caps.name("path").map(|m| m.as_str()).unwrap_or("");
        if path.trim().is_empty() || path != path.trim_start() {
            return HeaderMatch::Ambiguous("path is empty or indented".to_string());
        }

        let mut message = caps
            .name("msg")
            .map(|m| m.as_str().trim_end().to_string())
            .unwrap_or_default();
        let mut code = caps.name("code").map(|m| m.as_str().to_string());
        if code.is_none()
            && let Some(tag) = OPTION_TAG.captures(&message)
        {
            let start = tag.get(0).map(|m| m.start()).unwrap_or(message.len());
            code = tag.name("tag").map(|m| m.as_str().to_string());
            message.truncate(start);
        }

        HeaderMatch::Header(Header {
            severity,
            file: PathBuf::from(path),
            line: line_no,
            column,
            message,
            code,
        })
    }

    fn regex(&self) -> &'static Regex {
        match self {
            LineMatcher::Clang | LineMatcher::Gcc => &COLON_HEADER,
            LineMatcher::Msvc => &MSVC_HEADER,
        }
    }
}

/// Parse a numeric position capture; `Ok(None)` when the group is absent.
fn parse_position(caps: &Captures<'_>, name: &str) -> Result<Option<u32>, String> {
    match caps.name(name) {
        None => Ok(None),
        Some(m) => m
            .as_str()
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("non-numeric {name} {:?}", m.as_str())),
    }
}

/// gcc scope lines and other compiler chatter that carries no diagnostic.
pub(crate) fn is_scope_line(line: &str) -> bool {
    GCC_SCOPE.is_match(line)
}
