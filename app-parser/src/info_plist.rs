use crate::error::{Error, Result};
use log::debug;
use serde::Deserialize;

/// Keys read from an iOS bundle's `Info.plist`
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InfoPlist {
    #[serde(rename = "CFBundleName")]
    pub bundle_name: String,
    #[serde(rename = "CFBundleDisplayName")]
    pub bundle_display_name: String,
    #[serde(rename = "CFBundleVersion")]
    pub bundle_version: String,
    #[serde(rename = "CFBundleShortVersionString")]
    pub bundle_short_version: String,
    #[serde(rename = "CFBundleIdentifier")]
    pub bundle_identifier: String,
}

impl InfoPlist {
    /// Decode XML or binary plist data, the format is detected from the header
    pub fn parse(data: &[u8]) -> Result<Self> {
        let p: InfoPlist = plist::from_bytes(data).map_err(|e| Error::malformed("Info.plist", e))?;
        debug!(
            "plist: id={} name={:?} display={:?} version={} build={}",
            p.bundle_identifier,
            p.bundle_name,
            p.bundle_display_name,
            p.bundle_short_version,
            p.bundle_version
        );
        Ok(p)
    }

    /// `CFBundleDisplayName`, or `CFBundleName` when the display name is empty
    pub fn name(&self) -> &str {
        if self.bundle_display_name.is_empty() {
            &self.bundle_name
        } else {
            &self.bundle_display_name
        }
    }
}
