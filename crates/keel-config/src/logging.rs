//! How `keeld` renders log events on standard error.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Value of the `log_format` setting.
///
/// Parsing ignores case, so `JSON` on the command line and `json` in a file
/// select the same output.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Flattened JSON, one object per line, for log collectors.
    #[default]
    Json,
    /// One line of text per event, for operators watching the console.
    Compact,
}

impl LogFormat {
    /// Machine-readable formats never carry terminal colour codes.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}
