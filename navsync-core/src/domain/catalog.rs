//! Catalog entries returned by a full pull of the NAV API root.

use super::SubjectId;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// One instrument listed by the catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(deserialize_with = "code_as_string")]
    pub scheme_code: SubjectId,
    #[serde(default)]
    pub scheme_name: Option<String>,
    #[serde(default)]
    pub isin_growth: Option<String>,
    #[serde(default)]
    pub isin_div_reinvestment: Option<String>,
}

impl CatalogEntry {
    /// The ISIN of the given kind, if present and non-blank.
    pub fn isin(&self, kind: IsinKind) -> Option<&str> {
        let isin = match kind {
            IsinKind::Growth => self.isin_growth.as_deref(),
            IsinKind::DivReinvestment => self.isin_div_reinvestment.as_deref(),
        };
        isin.map(str::trim).filter(|s| !s.is_empty())
    }
}

/// ISIN category selectable by the enrichment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsinKind {
    #[serde(rename = "isinGrowth")]
    Growth,
    #[serde(rename = "isinDivReinvestment")]
    DivReinvestment,
}

impl IsinKind {
    /// Operation selector string as accepted on the command line.
    pub fn code(&self) -> &'static str {
        match self {
            IsinKind::Growth => "isinGrowth",
            IsinKind::DivReinvestment => "isinDivReinvestment",
        }
    }
}

impl fmt::Display for IsinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for IsinKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isinGrowth" => Ok(IsinKind::Growth),
            "isinDivReinvestment" => Ok(IsinKind::DivReinvestment),
            other => Err(format!(
                "unknown operation '{other}'. Valid: isinGrowth, isinDivReinvestment"
            )),
        }
    }
}

/// Scheme codes arrive as JSON numbers from some endpoints and strings from others.
pub(crate) fn code_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Num(i64),
        Str(String),
    }

    Ok(match Code::deserialize(deserializer)? {
        Code::Num(n) => n.to_string(),
        Code::Str(s) => s,
    })
}

pub(crate) fn opt_code_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Num(i64),
        Str(String),
    }

    Ok(Option::<Code>::deserialize(deserializer)?.map(|c| match c {
        Code::Num(n) => n.to_string(),
        Code::Str(s) => s,
    }))
}
