use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::InputError;

/// Canonical identifiers for the closed set of verification services.
///
/// Adding a provider means adding one variant here, one adapter under
/// [`crate::adapters`], and one entry in the configured priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Usps,
    Smarty,
    Google,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Usps, Self::Smarty, Self::Google];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usps => "usps",
            Self::Smarty => "smarty",
            Self::Google => "google",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "usps" => Ok(Self::Usps),
            "smarty" => Ok(Self::Smarty),
            "google" => Ok(Self::Google),
            other => Err(InputError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}
