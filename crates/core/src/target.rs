//! Extraction of a retrieval target from a deobfuscated string.
//!
//! Only URI-shaped substrings with an allow-listed scheme are considered;
//! anything else (including malformed syntax behind a matched scheme
//! prefix) yields no target. Detection is still logged in that case,
//! retrieval is simply skipped.

use serde::Serialize;
use url::Url;

/// Allow-listed schemes: the naming/directory protocols this vulnerability
/// class abuses, plus plain HTTP(S) codebases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ldap,
    Ldaps,
    Rmi,
    Dns,
    Iiop,
    Nis,
    Nds,
    Corba,
    Http,
    Https,
}

impl Scheme {
    const ALL: [Scheme; 10] = [
        Scheme::Ldap,
        Scheme::Ldaps,
        Scheme::Rmi,
        Scheme::Dns,
        Scheme::Iiop,
        Scheme::Nis,
        Scheme::Nds,
        Scheme::Corba,
        Scheme::Http,
        Scheme::Https,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Scheme::Ldap => "ldap",
            Scheme::Ldaps => "ldaps",
            Scheme::Rmi => "rmi",
            Scheme::Dns => "dns",
            Scheme::Iiop => "iiop",
            Scheme::Nis => "nis",
            Scheme::Nds => "nds",
            Scheme::Corba => "corba",
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Default port when the URI carries none.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Scheme::Ldap => 389,
            Scheme::Ldaps => 636,
            Scheme::Rmi => 1099,
            Scheme::Dns => 53,
            Scheme::Iiop | Scheme::Corba => 2809,
            Scheme::Nis => 111,
            Scheme::Nds => 524,
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A protocol/host/port/path target extracted from attacker-supplied text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ResolvedTarget {
    /// Canonical URL rendering, used as the artifact source.
    #[must_use]
    pub fn url_string(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

/// Characters that end a URI candidate inside surrounding expression text.
fn is_terminator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '}' | '"' | '\'' | '<' | '>' | '`' | '\\')
}

/// Scan `flattened` for the earliest allow-listed `scheme://` substring and
/// parse it defensively. Returns `None` when no allow-listed scheme is
/// present or the candidate is not valid URI syntax.
#[must_use]
pub fn resolve(flattened: &str) -> Option<ResolvedTarget> {
    let (scheme, start) = Scheme::ALL
        .iter()
        .filter_map(|s| {
            let needle = format!("{}://", s.as_str());
            flattened.find(&needle).map(|idx| (*s, idx))
        })
        .min_by_key(|&(_, idx)| idx)?;

    let candidate = &flattened[start..];
    let end = candidate.find(is_terminator).unwrap_or(candidate.len());
    let candidate = &candidate[..end];

    let url = Url::parse(candidate).ok()?;
    let host = url.host_str()?.to_string();
    if host.is_empty() {
        return None;
    }
    let port = url.port().unwrap_or_else(|| scheme.default_port());

    Some(ResolvedTarget {
        scheme,
        host,
        port,
        path: url.path().to_string(),
    })
}
