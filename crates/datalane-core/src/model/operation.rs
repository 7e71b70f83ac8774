// ── Operations ──
//
// The six logical operations a caller can request. Reads (`get`,
// `get_list`) are the only ones eligible for reuse and always travel
// as HTTP GET.

use datalane_api::Method;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    GetList,
    Post,
    Put,
    Patch,
    Delete,
}

impl Operation {
    /// `get` and `get_list`.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Get | Self::GetList)
    }

    pub fn is_list(self) -> bool {
        matches!(self, Self::GetList)
    }

    /// The effective HTTP verb.
    pub fn method(self) -> Method {
        match self {
            Self::Get | Self::GetList => Method::Get,
            Self::Post => Method::Post,
            Self::Put => Method::Put,
            Self::Patch => Method::Patch,
            Self::Delete => Method::Delete,
        }
    }
}
