//! Decoder for Android's compiled ("binary") XML.
//!
//! The document is flattened into a list of [XmlEvent]s which can be walked
//! directly or rendered back into plain XML text with [XmlDocument::to_xml].

use crate::error::{Error, Result};
use crate::res::{cursor_at, invalid, ChunkHeader, ChunkType, ResValue, StringPool};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io;

pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

/// Framework attribute ids, used when the string pool name has been stripped
const ATTR_NAMES: &[(u32, &str)] = &[
    (0x0101_0000, "theme"),
    (0x0101_0001, "label"),
    (0x0101_0002, "icon"),
    (0x0101_0003, "name"),
    (0x0101_020c, "minSdkVersion"),
    (0x0101_021b, "versionCode"),
    (0x0101_021c, "versionName"),
    (0x0101_0270, "targetSdkVersion"),
    (0x0101_0271, "maxSdkVersion"),
];

#[derive(Clone, Debug, PartialEq)]
pub struct XmlAttribute {
    /// Namespace URI, if any
    pub namespace: Option<String>,
    pub name: String,
    /// Typed value as stored in the document
    pub value: ResValue,
    /// Value rendered as text
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    StartNamespace {
        prefix: String,
        uri: String,
    },
    EndNamespace {
        prefix: String,
        uri: String,
    },
    StartElement {
        namespace: Option<String>,
        name: String,
        attributes: Vec<XmlAttribute>,
    },
    EndElement {
        namespace: Option<String>,
        name: String,
    },
    Text(String),
}

#[derive(Clone, Debug, Default)]
pub struct XmlDocument {
    pub strings: StringPool,
    pub events: Vec<XmlEvent>,
}

impl XmlDocument {
    /// Decode a binary XML file such as `AndroidManifest.xml`
    pub fn parse(data: &[u8]) -> Result<Self> {
        parse_document(data).map_err(|e| Error::malformed("binary xml", e))
    }

    /// Name and attributes of the document element
    pub fn root(&self) -> Option<(&str, &[XmlAttribute])> {
        self.events.iter().find_map(|e| match e {
            XmlEvent::StartElement {
                name, attributes, ..
            } => Some((name.as_str(), attributes.as_slice())),
            _ => None,
        })
    }

    /// Attributes of the first element called `name`
    pub fn element(&self, name: &str) -> Option<&[XmlAttribute]> {
        self.events.iter().find_map(|e| match e {
            XmlEvent::StartElement {
                name: n,
                attributes,
                ..
            } if n == name => Some(attributes.as_slice()),
            _ => None,
        })
    }

    /// Render the document as indented XML text
    pub fn to_xml(&self) -> Result<String> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_err)?;

        // prefixes in scope, innermost last
        let mut scope: Vec<(String, String)> = vec![];
        let mut pending: Vec<(String, String)> = vec![];
        for ev in &self.events {
            match ev {
                XmlEvent::StartNamespace { prefix, uri } => {
                    scope.push((prefix.clone(), uri.clone()));
                    pending.push((prefix.clone(), uri.clone()));
                }
                XmlEvent::EndNamespace { .. } => {
                    scope.pop();
                }
                XmlEvent::StartElement {
                    namespace,
                    name,
                    attributes,
                } => {
                    let qname = qualify(&scope, namespace.as_deref(), name);
                    let mut el = BytesStart::new(qname.as_str());
                    for (prefix, uri) in pending.drain(..) {
                        let key = format!("xmlns:{}", prefix);
                        el.push_attribute((key.as_str(), uri.as_str()));
                    }
                    for attr in attributes {
                        let key = qualify(&scope, attr.namespace.as_deref(), &attr.name);
                        el.push_attribute((key.as_str(), attr.text.as_str()));
                    }
                    w.write_event(Event::Start(el)).map_err(xml_err)?;
                }
                XmlEvent::EndElement { namespace, name } => {
                    let qname = qualify(&scope, namespace.as_deref(), name);
                    w.write_event(Event::End(BytesEnd::new(qname.as_str())))
                        .map_err(xml_err)?;
                }
                XmlEvent::Text(text) => {
                    w.write_event(Event::Text(BytesText::new(text)))
                        .map_err(xml_err)?;
                }
            }
        }
        String::from_utf8(w.into_inner()).map_err(xml_err)
    }
}

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::malformed("xml writer", e)
}

fn qualify(scope: &[(String, String)], namespace: Option<&str>, name: &str) -> String {
    let prefix = namespace.and_then(|uri| {
        scope
            .iter()
            .rev()
            .find(|(_, u)| u == uri)
            .map(|(p, _)| p.as_str())
    });
    match prefix {
        Some(p) if !p.is_empty() => format!("{}:{}", p, name),
        _ => name.to_string(),
    }
}

fn parse_document(data: &[u8]) -> io::Result<XmlDocument> {
    let root = ChunkHeader::read(data, 0)?;
    if root.chunk_type() != Some(ChunkType::Xml) {
        return Err(invalid(format!("bad magic 0x{:04x}, not a binary xml", root.ty)));
    }

    let mut doc = XmlDocument::default();
    let mut resource_map: Vec<u32> = vec![];
    for chunk in root.children(data, root.body())? {
        match chunk.chunk_type() {
            Some(ChunkType::StringPool) => {
                doc.strings = StringPool::parse(data, &chunk)?;
            }
            Some(ChunkType::XmlResourceMap) => {
                let mut r = cursor_at(data, chunk.body());
                let count = (chunk.end() - chunk.body()) / 4;
                resource_map = Vec::with_capacity(count);
                for _ in 0..count {
                    resource_map.push(r.read_u32::<LittleEndian>()?);
                }
            }
            Some(ChunkType::XmlStartNamespace) | Some(ChunkType::XmlEndNamespace) => {
                let mut r = cursor_at(data, chunk.body());
                let prefix = r.read_i32::<LittleEndian>()?;
                let uri = r.read_i32::<LittleEndian>()?;
                let prefix = doc.strings.get_i32(prefix).unwrap_or_default().to_string();
                let uri = string_at(&doc.strings, uri)?.to_string();
                doc.events.push(if chunk.chunk_type() == Some(ChunkType::XmlStartNamespace) {
                    XmlEvent::StartNamespace { prefix, uri }
                } else {
                    XmlEvent::EndNamespace { prefix, uri }
                });
            }
            Some(ChunkType::XmlStartElement) => {
                let ev = read_start_element(data, &chunk, &doc.strings, &resource_map)?;
                doc.events.push(ev);
            }
            Some(ChunkType::XmlEndElement) => {
                let mut r = cursor_at(data, chunk.body());
                let ns = r.read_i32::<LittleEndian>()?;
                let name = r.read_i32::<LittleEndian>()?;
                doc.events.push(XmlEvent::EndElement {
                    namespace: doc.strings.get_i32(ns).map(|s| s.to_string()),
                    name: string_at(&doc.strings, name)?.to_string(),
                });
            }
            Some(ChunkType::XmlCdata) => {
                let mut r = cursor_at(data, chunk.body());
                let text = r.read_i32::<LittleEndian>()?;
                doc.events
                    .push(XmlEvent::Text(string_at(&doc.strings, text)?.to_string()));
            }
            _ => trace!("skipping chunk 0x{:04x} at {}", chunk.ty, chunk.start),
        }
    }
    debug!(
        "binary xml: {} strings, {} events",
        doc.strings.strings.len(),
        doc.events.len()
    );
    Ok(doc)
}

fn string_at(strings: &StringPool, idx: i32) -> io::Result<&str> {
    strings
        .get_i32(idx)
        .ok_or_else(|| invalid(format!("string index {} out of range", idx)))
}

fn read_start_element(
    data: &[u8],
    chunk: &ChunkHeader,
    strings: &StringPool,
    resource_map: &[u32],
) -> io::Result<XmlEvent> {
    let mut r = cursor_at(data, chunk.body());
    let ns = r.read_i32::<LittleEndian>()?;
    let name = r.read_i32::<LittleEndian>()?;
    let attribute_start = r.read_u16::<LittleEndian>()? as usize;
    let attribute_size = r.read_u16::<LittleEndian>()? as usize;
    let attribute_count = r.read_u16::<LittleEndian>()? as usize;

    let name = string_at(strings, name)?.to_string();
    let mut attributes = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        let pos = chunk.body() + attribute_start + i * attribute_size;
        if pos + 20 > chunk.end() {
            return Err(invalid(format!("attribute {} of <{}> truncated", i, name)));
        }
        let mut r = cursor_at(data, pos);
        let attr_ns = r.read_i32::<LittleEndian>()?;
        let attr_name = r.read_i32::<LittleEndian>()?;
        let raw_value = r.read_i32::<LittleEndian>()?;
        let value = ResValue::read(&mut r)?;

        let attr_name = match attribute_name(strings, resource_map, attr_name) {
            Some(n) => n,
            None => {
                debug!("dropping unnamed attribute {} of <{}>", i, name);
                continue;
            }
        };
        let text = match strings.get_i32(raw_value) {
            Some(raw) if value.is_string() || value.data_type == 0 => raw.to_string(),
            _ => value.to_text(strings),
        };
        attributes.push(XmlAttribute {
            namespace: strings.get_i32(attr_ns).map(|s| s.to_string()),
            name: attr_name,
            value,
            text,
        });
    }

    Ok(XmlEvent::StartElement {
        namespace: strings.get_i32(ns).map(|s| s.to_string()),
        name,
        attributes,
    })
}

fn attribute_name(strings: &StringPool, resource_map: &[u32], idx: i32) -> Option<String> {
    match strings.get_i32(idx) {
        Some(n) if !n.is_empty() => Some(n.to_string()),
        _ => {
            let id = *resource_map.get(usize::try_from(idx).ok()?)?;
            ATTR_NAMES
                .iter()
                .find(|(i, _)| *i == id)
                .map(|(_, n)| n.to_string())
        }
    }
}
