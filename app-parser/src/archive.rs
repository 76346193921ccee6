use crate::error::Result;
use crate::icon::{IconCandidate, IconPicker};
use log::debug;
use regex::Regex;
use std::io::{Read, Seek};
use std::sync::LazyLock;
use zip::result::ZipError;
use zip::ZipArchive;

pub const ANDROID_MANIFEST: &str = "AndroidManifest.xml";
pub const RESOURCE_TABLE: &str = "resources.arsc";

/// Upper bound on the buffer reserved from an entry's declared size
const MAX_PREALLOC: u64 = 16 << 20;

static INFO_PLIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Payload/[^/]+/Info\.plist$").expect("Invalid Info.plist regex")
});

/// Entries of interest found in a package, as indexes into the archive
#[derive(Debug, Default)]
pub struct ScanResult {
    pub manifest: Option<usize>,
    pub info_plist: Option<usize>,
    pub icon: Option<IconCandidate>,
}

/// Read-only view of an `.apk` / `.ipa` zip container
pub struct PackageArchive<R> {
    zip: ZipArchive<R>,
}

impl<R: Read + Seek> PackageArchive<R> {
    pub fn new(reader: R) -> Result<Self> {
        Ok(PackageArchive {
            zip: ZipArchive::new(reader)?,
        })
    }

    /// Walk the central directory once and locate manifest, plist and icon
    pub fn scan(&mut self) -> Result<ScanResult> {
        let mut res = ScanResult::default();
        let mut icons = IconPicker::new();
        for i in 0..self.zip.len() {
            let entry = self.zip.by_index_raw(i)?;
            let name = entry.name();
            if name == ANDROID_MANIFEST {
                res.manifest = Some(i);
            } else if INFO_PLIST_RE.is_match(name) {
                if res.info_plist.is_none() {
                    res.info_plist = Some(i);
                }
            } else {
                icons.offer(i, name);
            }
        }
        res.icon = icons.finish();
        debug!(
            "scan: manifest={:?} plist={:?} icon={:?}",
            res.manifest,
            res.info_plist,
            res.icon.as_ref().map(|c| c.name.as_str())
        );
        Ok(res)
    }

    /// Read an entry fully into memory
    pub fn read(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut entry = self.zip.by_index(index)?;
        let mut buf = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
        // crc and inflate failures belong to the archive, not the file
        entry.read_to_end(&mut buf).map_err(ZipError::Io)?;
        Ok(buf)
    }

    /// Read a named entry, `None` when the archive has no such entry
    pub fn read_by_name(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut entry = match self.zip.by_name(name) {
            Ok(e) => e,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
        entry.read_to_end(&mut buf).map_err(ZipError::Io)?;
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn zip_with(names: &[&str]) -> Cursor<Vec<u8>> {
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        for name in names {
            w.start_file(*name, FileOptions::default()).unwrap();
            w.write_all(name.as_bytes()).unwrap();
        }
        let mut buf = w.finish().unwrap();
        buf.set_position(0);
        buf
    }

    #[test]
    fn scan_ipa_layout() {
        let mut archive = PackageArchive::new(zip_with(&[
            "Payload/Hello.app/AppIcon-060.png",
            "Payload/Hello.app/Info.plist",
            "Payload/Hello.app/AppIcon-180.png",
            "Payload/Hello.app/PlugIns/Ext.appex/Info.plist",
            "Payload/Hello.app/AppIcon-120.png",
        ]))
        .unwrap();
        let res = archive.scan().unwrap();
        assert_eq!(res.manifest, None);
        assert_eq!(res.info_plist, Some(1));
        assert_eq!(res.icon.unwrap().name, "Payload/Hello.app/AppIcon-180.png");
    }

    #[test]
    fn scan_apk_layout() {
        let mut archive = PackageArchive::new(zip_with(&[
            "META-INF/MANIFEST.MF",
            "AndroidManifest.xml",
            "res/mipmap-hdpi/ic_launcher.png",
        ]))
        .unwrap();
        let res = archive.scan().unwrap();
        assert_eq!(res.manifest, Some(1));
        assert_eq!(res.info_plist, None);
        assert!(res.icon.is_none());
        assert_eq!(
            archive.read(1).unwrap(),
            b"AndroidManifest.xml".to_vec()
        );
        assert!(archive.read_by_name(RESOURCE_TABLE).unwrap().is_none());
    }

    #[test]
    fn nested_manifest_name_does_not_match() {
        let mut archive =
            PackageArchive::new(zip_with(&["assets/AndroidManifest.xml", "Info.plist"])).unwrap();
        let res = archive.scan().unwrap();
        assert_eq!(res.manifest, None);
        assert_eq!(res.info_plist, None);
    }

    #[test]
    fn corrupt_entry_is_archive_error() {
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        w.start_file(ANDROID_MANIFEST, stored).unwrap();
        w.write_all(b"binary manifest body").unwrap();
        let mut data = w.finish().unwrap().into_inner();
        let at = data
            .windows(4)
            .position(|w| w == b"body")
            .unwrap();
        data[at] ^= 0xff;

        let mut archive = PackageArchive::new(Cursor::new(data)).unwrap();
        assert!(matches!(
            archive.read(0),
            Err(crate::Error::MalformedArchive(_))
        ));
        assert!(matches!(
            archive.read_by_name(ANDROID_MANIFEST),
            Err(crate::Error::MalformedArchive(_))
        ));
    }

    #[test]
    fn not_a_zip() {
        assert!(matches!(
            PackageArchive::new(Cursor::new(b"not a zip".to_vec())),
            Err(crate::Error::MalformedArchive(_))
        ));
    }
}
