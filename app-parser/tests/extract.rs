use app_parser::{extract, Error, Platform};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

const PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key>
    <string>com.example.ipa</string>
    <key>CFBundleName</key>
    <string>Example</string>
    <key>CFBundleDisplayName</key>
    <string></string>
    <key>CFBundleShortVersionString</key>
    <string>3.0</string>
    <key>CFBundleVersion</key>
    <string>300</string>
</dict>
</plist>"#;

fn png(side: u32) -> Vec<u8> {
    let mut out = Cursor::new(vec![]);
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(side, side, Rgba([0, 128, 255, 255])))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn write_package(dir: &TempDir, file: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let path = dir.path().join(file);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
    path
}

#[test]
fn unknown_extension() {
    let err = extract("missing/file.zip").unwrap_err();
    assert!(matches!(err, Error::UnknownPlatform(_)), "{}", err);
}

#[test]
fn ipa_highest_resolution_icon_any_order() {
    let icons = [
        ("Payload/Example.app/AppIcon-060.png", 6),
        ("Payload/Example.app/AppIcon-180.png", 18),
        ("Payload/Example.app/AppIcon-120.png", 12),
    ];
    let orders: [[usize; 3]; 3] = [[0, 1, 2], [1, 2, 0], [2, 0, 1]];
    for order in orders {
        let dir = TempDir::new().unwrap();
        let mut entries = vec![("Payload/Example.app/Info.plist", PLIST.as_bytes().to_vec())];
        for i in order {
            entries.push((icons[i].0, png(icons[i].1)));
        }
        let path = write_package(&dir, "Example.IPA", &entries);

        let app = extract(&path).unwrap();
        assert_eq!(app.platform, Platform::Ios);
        assert_eq!(app.name, "Example");
        assert_eq!(app.bundle_id, "com.example.ipa");
        assert_eq!(app.version, "3.0");
        assert_eq!(app.build, "300");
        assert_eq!(app.icon().unwrap().dimensions(), (18, 18), "order {:?}", order);
    }
}

#[test]
fn ipa_unsized_icons_use_last() {
    let dir = TempDir::new().unwrap();
    let path = write_package(
        &dir,
        "app.ipa",
        &[
            ("Payload/Example.app/Info.plist", PLIST.as_bytes().to_vec()),
            ("Payload/Example.app/AppIcon60x60@2x.png", png(2)),
            ("Payload/Example.app/AppIcon76x76@2x~ipad.png", png(5)),
        ],
    );
    assert_eq!(extract(&path).unwrap().icon().unwrap().dimensions(), (5, 5));
}

#[test]
fn ipa_without_app_icon() {
    let dir = TempDir::new().unwrap();
    let path = write_package(
        &dir,
        "app.ipa",
        &[
            ("Payload/Example.app/Info.plist", PLIST.as_bytes().to_vec()),
            ("Payload/Example.app/LaunchImage.png", png(2)),
        ],
    );
    let app = extract(&path).unwrap();
    assert!(app.icon.is_none());
    assert!(matches!(app.icon(), Err(Error::NoIcon)));
}

#[test]
fn apk_without_manifest() {
    let dir = TempDir::new().unwrap();
    let path = write_package(&dir, "app.apk", &[("classes.dex", b"dex\n035\0".to_vec())]);
    assert!(matches!(extract(&path), Err(Error::ManifestMissing)));
}

#[test]
fn descriptor_serializes_without_icon() {
    let dir = TempDir::new().unwrap();
    let path = write_package(
        &dir,
        "app.ipa",
        &[
            ("Payload/Example.app/Info.plist", PLIST.as_bytes().to_vec()),
            ("Payload/Example.app/AppIcon-180.png", png(2)),
        ],
    );
    let app = extract(&path).unwrap();
    let json = serde_json::to_value(&app).unwrap();
    assert_eq!(json["bundle_id"], "com.example.ipa");
    assert_eq!(json["platform"], "ios");
    assert!(json.get("icon").is_none());
}
