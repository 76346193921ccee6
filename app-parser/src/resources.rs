//! Compiled resource table (`resources.arsc`) and the label/icon resolver.

use crate::archive::{PackageArchive, ANDROID_MANIFEST, RESOURCE_TABLE};
use crate::axml::XmlDocument;
use crate::error::{Error, Result};
use crate::manifest::find_value_in;
use crate::res::{cursor_at, invalid, ChunkHeader, ChunkType, ResValue, StringPool};
use byteorder::{LittleEndian, ReadBytesExt};
use image::DynamicImage;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;

/// Longest chain of resource references followed before giving up
const MAX_REFERENCE_DEPTH: usize = 8;

pub const DENSITY_DEFAULT: u16 = 0;
pub const DENSITY_MEDIUM: u16 = 160;
pub const DENSITY_ANY: u16 = 0xfffe;
pub const DENSITY_NONE: u16 = 0xffff;

const TYPE_FLAG_SPARSE: u8 = 0x01;
const TYPE_FLAG_OFFSET16: u8 = 0x02;

const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
const ENTRY_FLAG_COMPACT: u16 = 0x0008;

const NO_ENTRY: u32 = 0xffff_ffff;
const NO_ENTRY16: u16 = 0xffff;

/// The parts of `ResTable_config` used for picking a value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResConfig {
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub density: u16,
}

impl ResConfig {
    fn parse(data: &[u8]) -> Self {
        let byte = |i: usize| data.get(i).copied().unwrap_or(0);
        ResConfig {
            language: [byte(8), byte(9)],
            country: [byte(10), byte(11)],
            density: u16::from_le_bytes([byte(14), byte(15)]),
        }
    }

    pub fn has_locale(&self) -> bool {
        self.language != [0, 0] || self.country != [0, 0]
    }

    /// Whether `self` matches a screen of `requested` density better than
    /// `other` does, following `ResTable_config::isBetterThan`.
    pub fn is_better_density(&self, other: &ResConfig, requested: u16) -> bool {
        if self.density == other.density {
            return false;
        }
        if self.density == DENSITY_ANY {
            return true;
        }
        if other.density == DENSITY_ANY {
            return false;
        }
        let norm = |d: u16| -> i64 {
            if d == DENSITY_DEFAULT {
                DENSITY_MEDIUM as i64
            } else {
                d as i64
            }
        };
        let requested = norm(requested);
        let (mut h, mut l) = (norm(self.density), norm(other.density));
        let mut self_bigger = true;
        if l > h {
            std::mem::swap(&mut h, &mut l);
            self_bigger = false;
        }
        if requested >= h {
            // both too small, take the bigger one
            return self_bigger;
        }
        if l >= requested {
            // both too big, take the smaller one
            return !self_bigger;
        }
        // scaling down is twice as good as scaling up
        if (2 * l - requested) * h > requested * requested {
            !self_bigger
        } else {
            self_bigger
        }
    }
}

/// One `ResTable_type` chunk: a configuration and its simple values
#[derive(Clone, Debug, Default)]
pub struct ResType {
    pub id: u8,
    pub config: ResConfig,
    pub entries: HashMap<u16, ResValue>,
}

#[derive(Clone, Debug, Default)]
pub struct ResPackage {
    pub id: u8,
    pub name: String,
    pub types: Vec<ResType>,
}

#[derive(Clone, Debug, Default)]
pub struct ResourceTable {
    pub strings: StringPool,
    pub packages: Vec<ResPackage>,
}

impl ResourceTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        parse_table(data).map_err(|e| Error::malformed("resource table", e))
    }

    /// Every value defined for resource `id`, one per configuration
    pub fn values(&self, id: u32) -> Vec<(ResConfig, ResValue)> {
        let package = (id >> 24) as u8;
        let ty = (id >> 16) as u8;
        let entry = id as u16;
        self.packages
            .iter()
            .filter(|p| p.id == package)
            .flat_map(|p| p.types.iter())
            .filter(|t| t.id == ty)
            .filter_map(|t| t.entries.get(&entry).map(|v| (t.config, *v)))
            .collect()
    }

    /// Resolve a value to a string, preferring configurations without a
    /// locale. References are followed.
    pub fn resolve_string(&self, value: ResValue) -> Option<String> {
        let mut value = value;
        for _ in 0..MAX_REFERENCE_DEPTH {
            if value.is_string() {
                return self.strings.get(value.data).map(|s| s.to_string());
            }
            if !value.is_reference() {
                return None;
            }
            let values = self.values(value.data);
            let (_, next) = values
                .iter()
                .find(|(c, _)| !c.has_locale())
                .or_else(|| values.first())?;
            value = *next;
        }
        warn!("reference chain too deep at 0x{:08x}", value.data);
        None
    }

    /// All file paths a value can resolve to, best match for `density` first
    pub fn resolve_paths(&self, value: ResValue, density: u16) -> Vec<String> {
        let mut out = vec![];
        self.collect_paths(value, density, 0, &mut out);
        out
    }

    fn collect_paths(&self, value: ResValue, density: u16, depth: usize, out: &mut Vec<String>) {
        if depth >= MAX_REFERENCE_DEPTH {
            warn!("reference chain too deep at 0x{:08x}", value.data);
            return;
        }
        if value.is_string() {
            if let Some(s) = self.strings.get(value.data) {
                if !out.iter().any(|p| p == s) {
                    out.push(s.to_string());
                }
            }
            return;
        }
        if !value.is_reference() {
            return;
        }
        let mut candidates = self.values(value.data);
        while !candidates.is_empty() {
            let mut best = 0;
            for i in 1..candidates.len() {
                if candidates[i].0.is_better_density(&candidates[best].0, density) {
                    best = i;
                }
            }
            let (config, next) = candidates.remove(best);
            trace!("0x{:08x} density={} -> {:?}", value.data, config.density, next);
            self.collect_paths(next, density, depth + 1, out);
        }
    }
}

fn parse_table(data: &[u8]) -> io::Result<ResourceTable> {
    let root = ChunkHeader::read(data, 0)?;
    if root.chunk_type() != Some(ChunkType::Table) {
        return Err(invalid(format!("bad magic 0x{:04x}, not a resource table", root.ty)));
    }
    let mut table = ResourceTable::default();
    for chunk in root.children(data, root.body())? {
        match chunk.chunk_type() {
            Some(ChunkType::StringPool) => table.strings = StringPool::parse(data, &chunk)?,
            Some(ChunkType::TablePackage) => table.packages.push(parse_package(data, &chunk)?),
            _ => trace!("skipping table chunk 0x{:04x}", chunk.ty),
        }
    }
    debug!(
        "resource table: {} strings, {} package(s)",
        table.strings.strings.len(),
        table.packages.len()
    );
    Ok(table)
}

fn parse_package(data: &[u8], chunk: &ChunkHeader) -> io::Result<ResPackage> {
    let mut r = cursor_at(data, chunk.start + ChunkHeader::SIZE);
    let id = r.read_u32::<LittleEndian>()?;
    let mut name = [0u16; 128];
    for c in name.iter_mut() {
        *c = r.read_u16::<LittleEndian>()?;
    }
    let name_len = name.iter().position(|c| *c == 0).unwrap_or(name.len());

    let mut package = ResPackage {
        id: id as u8,
        name: String::from_utf16_lossy(&name[..name_len]),
        types: vec![],
    };
    for child in chunk.children(data, chunk.body())? {
        match child.chunk_type() {
            Some(ChunkType::TableType) => package.types.push(parse_type(data, &child)?),
            // type/key name pools, specs and libraries are not needed to resolve by id
            _ => trace!("skipping package chunk 0x{:04x}", child.ty),
        }
    }
    Ok(package)
}

fn parse_type(data: &[u8], chunk: &ChunkHeader) -> io::Result<ResType> {
    let mut r = cursor_at(data, chunk.start + ChunkHeader::SIZE);
    let id = r.read_u8()?;
    let flags = r.read_u8()?;
    let _reserved = r.read_u16::<LittleEndian>()?;
    let entry_count = r.read_u32::<LittleEndian>()? as usize;
    let entries_start = chunk.start + r.read_u32::<LittleEndian>()? as usize;
    if entry_count > (chunk.end() - chunk.body()) / 2 {
        return Err(invalid(format!("type {} claims {} entries", id, entry_count)));
    }

    let config_pos = r.position() as usize;
    let config_size = cursor_at(data, config_pos).read_u32::<LittleEndian>()? as usize;
    let config_end = (config_pos + config_size).min(chunk.body()).max(config_pos);
    let config = ResConfig::parse(&data[config_pos..config_end]);

    // (entry index, offset from entries_start)
    let mut offsets = Vec::with_capacity(entry_count);
    let mut r = cursor_at(data, chunk.body());
    for i in 0..entry_count {
        if flags & TYPE_FLAG_SPARSE != 0 {
            let idx = r.read_u16::<LittleEndian>()?;
            let offset = r.read_u16::<LittleEndian>()? as usize * 4;
            offsets.push((idx, offset));
        } else if flags & TYPE_FLAG_OFFSET16 != 0 {
            let offset = r.read_u16::<LittleEndian>()?;
            if offset != NO_ENTRY16 {
                offsets.push((i as u16, offset as usize * 4));
            }
        } else {
            let offset = r.read_u32::<LittleEndian>()?;
            if offset != NO_ENTRY {
                offsets.push((i as u16, offset as usize));
            }
        }
    }

    let mut entries = HashMap::with_capacity(offsets.len());
    for (idx, offset) in offsets {
        let pos = entries_start + offset;
        if pos + 8 > chunk.end() {
            return Err(invalid(format!("entry {} of type {} out of bounds", idx, id)));
        }
        let mut r = cursor_at(data, pos);
        let _size = r.read_u16::<LittleEndian>()?;
        let entry_flags = r.read_u16::<LittleEndian>()?;
        // key index, or the value itself for compact entries
        let key = r.read_u32::<LittleEndian>()?;
        if entry_flags & ENTRY_FLAG_COMPACT != 0 {
            entries.insert(
                idx,
                ResValue {
                    data_type: (entry_flags >> 8) as u8,
                    data: key,
                },
            );
        } else if entry_flags & ENTRY_FLAG_COMPLEX == 0 {
            if pos + 8 + ResValue::SIZE > chunk.end() {
                return Err(invalid(format!("value {} of type {} out of bounds", idx, id)));
            }
            entries.insert(idx, ResValue::read(&mut r)?);
        }
    }
    Ok(ResType {
        id,
        config,
        entries,
    })
}

/// Resolve the application label and icon of an opened `.apk`.
///
/// A missing resource table or icon is not an error: the icon comes back as
/// `None` and the label as an empty string.
pub fn resolve_icon_and_label<R: Read + Seek>(
    archive: &mut PackageArchive<R>,
    manifest: &XmlDocument,
    density: u16,
) -> Result<(Option<DynamicImage>, String)> {
    let label_attr = find_value_in(manifest, "application", "label");
    let icon_attr = find_value_in(manifest, "application", "icon");

    let table = match archive.read_by_name(RESOURCE_TABLE)? {
        Some(data) => match ResourceTable::parse(&data) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("{}", e);
                None
            }
        },
        None => {
            debug!("{} not found", RESOURCE_TABLE);
            None
        }
    };

    let label = match (label_attr, &table) {
        (Some(a), Some(t)) if a.value.is_reference() => t.resolve_string(a.value),
        (Some(a), _) if !a.value.is_reference() => Some(a.text.clone()),
        _ => None,
    }
    .unwrap_or_else(|| {
        debug!("no label resolved");
        String::new()
    });

    let paths = match (icon_attr, &table) {
        (Some(a), Some(t)) => t.resolve_paths(a.value, density),
        (Some(a), None) if a.value.is_string() => vec![a.text.clone()],
        _ => vec![],
    };
    let mut icon = None;
    for path in paths {
        if path.ends_with(".xml") {
            trace!("skipping drawable {}", path);
            continue;
        }
        let Some(data) = archive.read_by_name(&path)? else {
            warn!("icon {} listed but not in archive", path);
            continue;
        };
        match image::load_from_memory(&data) {
            Ok(img) => {
                debug!("icon {} {}x{}", path, img.width(), img.height());
                icon = Some(img);
                break;
            }
            Err(e) => warn!("icon {}: {}", path, e),
        }
    }
    Ok((icon, label))
}

/// Open the `.apk` at `path` and resolve its label and icon for `density`
pub fn icon_and_label(path: impl AsRef<Path>, density: u16) -> Result<(Option<DynamicImage>, String)> {
    let mut archive = PackageArchive::new(File::open(path)?)?;
    let manifest = archive
        .read_by_name(ANDROID_MANIFEST)?
        .ok_or(Error::ManifestMissing)?;
    let manifest = XmlDocument::parse(&manifest)?;
    resolve_icon_and_label(&mut archive, &manifest, density)
}


#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;
    use crate::res::{TYPE_INT_DEC, TYPE_REFERENCE, TYPE_STRING};

    const LABEL: u32 = 0x7f05_0000;
    const ICON: u32 = 0x7f02_0000;

    fn sample() -> ResourceTable {
        let data = table(
            &[
                "res/mipmap-mdpi/ic_launcher.png",
                "res/mipmap-xxxhdpi/ic_launcher.png",
                "res/mipmap-hdpi/ic_launcher.png",
                "HelloWorld",
                "HalloWelt",
                "res/mipmap-anydpi-v26/ic_launcher.xml",
            ],
            &[
                TypeChunk {
                    id: 2,
                    density: 160,
                    language: "",
                    entries: vec![(0, TYPE_STRING, 0), (1, TYPE_REFERENCE, LABEL)],
                },
                TypeChunk {
                    id: 2,
                    density: 640,
                    language: "",
                    entries: vec![(0, TYPE_STRING, 1)],
                },
                TypeChunk {
                    id: 2,
                    density: 240,
                    language: "",
                    entries: vec![(0, TYPE_STRING, 2)],
                },
                TypeChunk {
                    id: 5,
                    density: 0,
                    language: "de",
                    entries: vec![(0, TYPE_STRING, 4)],
                },
                TypeChunk {
                    id: 5,
                    density: 0,
                    language: "",
                    entries: vec![(0, TYPE_STRING, 3), (2, TYPE_INT_DEC, 7)],
                },
            ],
        );
        ResourceTable::parse(&data).unwrap()
    }

    #[test]
    fn parses_packages_and_types() {
        let t = sample();
        assert_eq!(t.packages.len(), 1);
        assert_eq!(t.packages[0].id, 0x7f);
        assert_eq!(t.packages[0].name, "com.example");
        assert_eq!(t.packages[0].types.len(), 5);
        assert_eq!(t.values(ICON).len(), 3);
        assert!(t.values(0x7f02_0005).is_empty());
        assert!(t.values(0x0102_0000).is_empty());
    }

    #[test]
    fn label_prefers_default_locale() {
        let t = sample();
        let label = ResValue {
            data_type: TYPE_REFERENCE,
            data: LABEL,
        };
        assert_eq!(t.resolve_string(label).as_deref(), Some("HelloWorld"));
        // 0x7f020001 -> label
        let indirect = ResValue {
            data_type: TYPE_REFERENCE,
            data: 0x7f02_0001,
        };
        assert_eq!(t.resolve_string(indirect).as_deref(), Some("HelloWorld"));
        let int = ResValue {
            data_type: TYPE_REFERENCE,
            data: 0x7f05_0002,
        };
        assert_eq!(t.resolve_string(int), None);
    }

    #[test]
    fn icon_paths_by_density() {
        let t = sample();
        let icon = ResValue {
            data_type: TYPE_REFERENCE,
            data: ICON,
        };
        assert_eq!(
            t.resolve_paths(icon, 720),
            vec![
                "res/mipmap-xxxhdpi/ic_launcher.png",
                "res/mipmap-hdpi/ic_launcher.png",
                "res/mipmap-mdpi/ic_launcher.png",
            ]
        );
        assert_eq!(
            t.resolve_paths(icon, 160)[0],
            "res/mipmap-mdpi/ic_launcher.png"
        );
        assert_eq!(
            t.resolve_paths(icon, 240)[0],
            "res/mipmap-hdpi/ic_launcher.png"
        );
    }

    #[test]
    fn density_preference() {
        let c = |density| ResConfig {
            density,
            ..Default::default()
        };
        assert!(c(DENSITY_ANY).is_better_density(&c(640), 720));
        assert!(c(640).is_better_density(&c(480), 720));
        assert!(!c(480).is_better_density(&c(640), 720));
        // both above the request, smaller wins
        assert!(c(320).is_better_density(&c(640), 240));
        // default density counts as mdpi
        assert!(c(240).is_better_density(&c(DENSITY_DEFAULT), 720));
        assert!(!c(160).is_better_density(&c(160), 720));
    }

    #[test]
    fn rejects_non_table() {
        assert!(matches!(
            ResourceTable::parse(&[3, 0, 8, 0, 8, 0, 0, 0]),
            Err(Error::MalformedBinaryFormat(_))
        ));
    }
}
