//! Destructure `did:webvh` URLs into strongly typed components.
//!
//! A `did:webvh` URL is of the form
//!
//! `did:webvh:<scid>:<host>[:<path-segment>…][?<query>][#<fragment>]`
//!
//! where each `/` of the original HTTP path became a `:`-separated segment
//! and a port is percent-encoded into the host segment (`%3A`).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use nom::{
    IResult, Parser,
    bytes::complete::{is_not, tag},
    combinator::{opt, rest},
    multi::many0,
    sequence::preceded,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Structure of a `did:webvh` URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebvhUrl {
    /// Self-certifying identifier embedded in the DID.
    pub scid: String,

    /// Host segment, still DID-encoded (a port remains `%3A`-escaped).
    pub host: String,

    /// Path segments, one per `:`-separated part after the host.
    pub path: Vec<String>,

    /// Query parameters refining resolution.
    pub query: Option<QueryParams>,

    /// Fragment identifying a resource inside the document.
    pub fragment: Option<String>,
}

/// DID parameters supported in the URL query component.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    /// Identifies a specific version of the DID document to be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    /// Identifies a version of the DID document that was valid at a certain
    /// time. An RFC 3339 UTC timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_time: Option<String>,
}

impl Display for WebvhUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.did())?;
        if let Some(query) = &self.query {
            write!(f, "?")?;
            let mut first = true;
            if let Some(version_id) = &query.version_id {
                write!(f, "versionId={version_id}")?;
                first = false;
            }
            if let Some(version_time) = &query.version_time {
                if !first {
                    write!(f, "&")?;
                }
                write!(f, "versionTime={version_time}")?;
            }
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl FromStr for WebvhUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_url(s) {
            Ok(("", url)) => Ok(url),
            Ok((trailing, _)) => {
                Err(Error::Format(format!("unexpected trailing input in DID URL: {trailing}")))
            }
            Err(e) => Err(Error::Format(format!("failed to parse DID URL: {e}"))),
        }
    }
}

impl WebvhUrl {
    /// The DID part of the URL, excluding query and fragment.
    #[must_use]
    pub fn did(&self) -> String {
        let mut did = format!("did:webvh:{}:{}", self.scid, self.host);
        for segment in &self.path {
            did.push(':');
            did.push_str(segment);
        }
        did
    }

    /// The HTTP base URL the DID maps to.
    ///
    /// The scheme is `http` for localhost, `https` otherwise. The embedded
    /// port is percent-decoded and internationalized host labels come out
    /// punycode-encoded.
    ///
    /// # Errors
    /// Will fail if the host does not parse as a URL authority.
    pub fn base_url(&self) -> Result<String> {
        let host = self.host.replace("%3A", ":");
        let scheme = if host == "localhost" || host.starts_with("localhost:") {
            "http"
        } else {
            "https"
        };
        let mut raw = format!("{scheme}://{host}");
        for segment in &self.path {
            raw.push('/');
            raw.push_str(segment);
        }
        let parsed =
            url::Url::parse(&raw).map_err(|e| Error::Format(format!("invalid DID host: {e}")))?;
        Ok(parsed.to_string().trim_end_matches('/').to_string())
    }

    /// Location of the `did.jsonl` log file: `<base>/.well-known/did.jsonl`
    /// when the DID has no path, `<base>/did.jsonl` otherwise.
    ///
    /// # Errors
    /// Will fail if the base URL cannot be derived.
    pub fn log_url(&self) -> Result<String> {
        let base = self.base_url()?;
        if self.path.is_empty() {
            Ok(format!("{base}/.well-known/did.jsonl"))
        } else {
            Ok(format!("{base}/did.jsonl"))
        }
    }

    /// Location of the witness proof file, a sibling of the log file.
    ///
    /// # Errors
    /// Will fail if the base URL cannot be derived.
    pub fn witness_url(&self) -> Result<String> {
        let base = self.base_url()?;
        if self.path.is_empty() {
            Ok(format!("{base}/.well-known/did-witness.json"))
        } else {
            Ok(format!("{base}/did-witness.json"))
        }
    }

    /// The last colon segment of the DID. This is the value compared across
    /// entries when checking that a non-portable DID has not moved.
    #[must_use]
    pub fn host_segment(&self) -> &str {
        self.path.last().map_or(&self.host, String::as_str)
    }
}

/// The last colon segment of a DID string.
///
/// # Errors
/// Will fail if the string has no colon-separated segments.
pub fn last_segment(did: &str) -> Result<String> {
    did.rsplit(':')
        .next()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| Error::Format(format!("DID has no host segment: {did}")))
}

/// Convert an HTTP URL into the host-and-path form used in a `did:webvh`
/// identifier: a port becomes `%3A`-escaped and each path separator becomes
/// a colon. Does not prepend the `did:webvh:` prefix or the SCID.
///
/// # Errors
/// Will fail if the URL does not parse or has no host.
pub fn to_did_host(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| Error::Format(format!("invalid URL: {e}")))?;
    let Some(host_str) = parsed.host_str() else {
        return Err(Error::Format(format!("no host in URL: {url}")));
    };
    let mut host = host_str.to_string();
    if let Some(port) = parsed.port() {
        host.push_str(&format!("%3A{port}"));
    }
    if let Some(path) = parsed.path().strip_prefix('/') {
        if !path.is_empty() {
            let formatted = path.trim_end_matches('/').replace('/', ":");
            host.push_str(&format!(":{formatted}"));
        }
    }
    Ok(host)
}

fn scheme(input: &str) -> IResult<&str, &str> {
    preceded(tag("did:"), tag("webvh:")).parse(input)
}

fn segment(input: &str) -> IResult<&str, &str> {
    is_not(":/?#").parse(input)
}

fn path(input: &str) -> IResult<&str, Vec<String>> {
    let (next, segments) = many0(preceded(tag(":"), segment)).parse(input)?;
    Ok((next, segments.into_iter().map(ToString::to_string).collect()))
}

fn query(input: &str) -> IResult<&str, QueryParams> {
    let (next, q) = preceded(tag("?"), is_not("#")).parse(input)?;
    let mut params = QueryParams::default();
    for param in q.split('&') {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        match key {
            "versionId" => params.version_id = Some(value.to_string()),
            "versionTime" => params.version_time = Some(value.to_string()),
            _ => {}
        }
    }
    Ok((next, params))
}

fn fragment(input: &str) -> IResult<&str, &str> {
    preceded(tag("#"), rest).parse(input)
}

fn parse_url(input: &str) -> IResult<&str, WebvhUrl> {
    let (next, _) = scheme(input)?;
    let (next, (scid, _, host, parsed_path, parsed_query, parsed_fragment)) =
        (segment, tag(":"), segment, path, opt(query), opt(fragment)).parse(next)?;
    Ok((
        next,
        WebvhUrl {
            scid: scid.to_string(),
            host: host.to_string(),
            path: parsed_path,
            query: parsed_query,
            fragment: parsed_fragment.map(str::to_string),
        },
    ))
}
