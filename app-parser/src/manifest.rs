use crate::axml::{XmlAttribute, XmlDocument};
use crate::error::{Error, Result};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;

/// The three fields read from the `<manifest>` element
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestInfo {
    pub package: String,
    pub version_name: String,
    pub version_code: String,
}

/// Parse android manifest from AndroidManifest.xml file data
pub fn parse_android_manifest(data: &[u8]) -> Result<(ManifestInfo, XmlDocument)> {
    let doc = XmlDocument::parse(data)?;
    let xml = doc.to_xml()?;
    let info = read_root_attributes(&xml)?;
    debug!(
        "manifest: package={} versionName={} versionCode={}",
        info.package, info.version_name, info.version_code
    );
    Ok((info, doc))
}

/// Pull `package`, `versionName` and `versionCode` off the document element,
/// matching attributes by local name so the `android:` prefix is irrelevant.
fn read_root_attributes(xml: &str) -> Result<ManifestInfo> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(el) | Event::Empty(el) => {
                let mut res = ManifestInfo::default();
                for attr in el.attributes() {
                    let attr = attr.map_err(xml_err)?;
                    let slot = match attr.key.local_name().as_ref() {
                        b"package" => &mut res.package,
                        b"versionName" => &mut res.version_name,
                        b"versionCode" => &mut res.version_code,
                        _ => continue,
                    };
                    *slot = attr.unescape_value().map_err(xml_err)?.into_owned();
                }
                return Ok(res);
            }
            Event::Eof => {
                return Err(Error::MalformedBinaryFormat(
                    "manifest has no root element".to_string(),
                ))
            }
            _ => {}
        }
    }
}

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::malformed("manifest xml", e)
}

/// Attribute `attr` of the first `node` element
pub fn find_value_in<'a>(doc: &'a XmlDocument, node: &str, attr: &str) -> Option<&'a XmlAttribute> {
    doc.element(node)?.iter().find(|a| a.name == attr)
}
