//! # Protocol Revisions
//!
//! The `method` parameter of the first log entry selects the revision the
//! log is processed under. Revision-dependent behavior (witness counting,
//! witness parameter validation) is dispatched from this tag.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::{Error, Result};

/// A `did:webvh` specification revision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MethodVersion {
    /// `did:webvh:0.5`: witness approvals accumulate declared weights.
    V0_5,

    /// `did:webvh:1.0`: witness approvals count distinct witnesses.
    #[default]
    V1_0,
}

impl FromStr for MethodVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "did:webvh:0.5" => Ok(Self::V0_5),
            "did:webvh:1.0" => Ok(Self::V1_0),
            _ => Err(Error::Config(format!("unsupported protocol version: {s}"))),
        }
    }
}

impl Display for MethodVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::V0_5 => write!(f, "did:webvh:0.5"),
            Self::V1_0 => write!(f, "did:webvh:1.0"),
        }
    }
}
