//! Metadata extraction for Android `.apk` and iOS `.ipa` packages.
//!
//! ```no_run
//! let info = app_parser::extract("app.apk")?;
//! println!("{} {} ({})", info.bundle_id, info.version, info.build);
//! # Ok::<(), app_parser::Error>(())
//! ```

pub mod archive;
pub mod axml;
pub mod cgbi;
mod error;
pub mod icon;
pub mod info_plist;
pub mod manifest;
pub mod res;
pub mod resources;

pub use error::{Error, Result};

use crate::archive::{PackageArchive, ScanResult};
use crate::info_plist::InfoPlist;
use crate::manifest::parse_android_manifest;
use image::DynamicImage;
use log::{debug, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Screen density used to pick Android launcher icons (xxxhdpi is 640)
pub const DEFAULT_DENSITY: u16 = 720;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Platform from the file extension, compared ASCII case-insensitively
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        if ext.eq_ignore_ascii_case("apk") {
            Ok(Platform::Android)
        } else if ext.eq_ignore_ascii_case("ipa") {
            Ok(Platform::Ios)
        } else {
            Err(Error::UnknownPlatform(ext))
        }
    }
}

/// Normalized package metadata
#[derive(Clone, Debug, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub bundle_id: String,
    pub version: String,
    pub build: String,
    #[serde(skip)]
    pub icon: Option<DynamicImage>,
    /// Size of the package file in bytes
    pub size: u64,
    pub platform: Platform,
}

impl AppInfo {
    pub fn icon(&self) -> Result<&DynamicImage> {
        self.icon.as_ref().ok_or(Error::NoIcon)
    }
}

/// Extract metadata from the package at `path`
pub fn extract(path: impl AsRef<Path>) -> Result<AppInfo> {
    extract_with_density(path, DEFAULT_DENSITY)
}

/// Like [extract], choosing Android icons for the given screen `density`
pub fn extract_with_density(path: impl AsRef<Path>, density: u16) -> Result<AppInfo> {
    let path = path.as_ref();
    let platform = Platform::from_path(path)?;

    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut archive = PackageArchive::new(BufReader::new(file))?;
    let scan = archive.scan()?;

    let mut app = match platform {
        Platform::Android => read_android(&mut archive, &scan, density)?,
        Platform::Ios => read_ios(&mut archive, &scan)?,
    };
    app.size = size;
    info!(
        "{}: {} {} ({}) icon={}",
        path.display(),
        app.bundle_id,
        app.version,
        app.build,
        app.icon.is_some()
    );
    Ok(app)
}

fn read_android<R: Read + Seek>(
    archive: &mut PackageArchive<R>,
    scan: &ScanResult,
    density: u16,
) -> Result<AppInfo> {
    let index = scan.manifest.ok_or(Error::ManifestMissing)?;
    let (manifest, doc) = parse_android_manifest(&archive.read(index)?)?;
    if manifest.package.is_empty() {
        return Err(Error::MalformedBinaryFormat(
            "manifest has no package attribute".to_string(),
        ));
    }

    let (icon, label) = match resources::resolve_icon_and_label(archive, &doc, density) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to resolve icon and label: {}", e);
            (None, String::new())
        }
    };

    Ok(AppInfo {
        name: label,
        bundle_id: manifest.package,
        version: manifest.version_name,
        build: manifest.version_code,
        icon,
        size: 0,
        platform: Platform::Android,
    })
}

fn read_ios<R: Read + Seek>(archive: &mut PackageArchive<R>, scan: &ScanResult) -> Result<AppInfo> {
    let index = scan.info_plist.ok_or(Error::PlistMissing)?;
    let plist = InfoPlist::parse(&archive.read(index)?)?;
    if plist.bundle_identifier.is_empty() {
        return Err(Error::MalformedBinaryFormat(
            "Info.plist has no CFBundleIdentifier".to_string(),
        ));
    }

    let icon = match &scan.icon {
        Some(c) => match archive.read(c.index).and_then(|d| cgbi::decode_icon(&d)) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("icon {}: {}", c.name, e);
                None
            }
        },
        None => {
            debug!("no AppIcon entry");
            None
        }
    };

    Ok(AppInfo {
        name: plist.name().to_string(),
        bundle_id: plist.bundle_identifier,
        version: plist.bundle_short_version,
        build: plist.bundle_version,
        icon,
        size: 0,
        platform: Platform::Ios,
    })
}
