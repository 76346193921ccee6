use log::trace;
use regex::Regex;
use std::sync::LazyLock;

/// Entries whose path contains this marker are icon candidates
pub const ICON_MARKER: &str = "AppIcon";

static ICON_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AppIcon-(\d{3})").expect("Invalid icon size regex"));

/// An icon entry seen while scanning the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconCandidate {
    pub index: usize,
    pub name: String,
    /// Resolution parsed from the name, `None` when the name carries no size
    pub score: Option<u32>,
}

impl IconCandidate {
    pub fn new(index: usize, name: &str) -> Self {
        IconCandidate {
            index,
            name: name.to_string(),
            score: resolution_score(name),
        }
    }
}

/// Parse the three digit resolution out of names like `AppIcon-180.png`.
///
/// A digit group that does not parse scores 0, it never aborts a scan.
pub fn resolution_score(name: &str) -> Option<u32> {
    let caps = ICON_SIZE_RE.captures(name)?;
    Some(caps[1].parse().unwrap_or(0))
}

/// Tracks the best icon while entries stream past.
///
/// Scored candidates always beat unscored ones and only a strictly greater
/// score replaces the current best. Without any scored candidate the last
/// candidate seen wins.
#[derive(Debug, Default)]
pub struct IconPicker {
    best: Option<IconCandidate>,
    last: Option<IconCandidate>,
}

impl IconPicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an entry, names without [ICON_MARKER] are ignored
    pub fn offer(&mut self, index: usize, name: &str) {
        if !name.contains(ICON_MARKER) {
            return;
        }
        let candidate = IconCandidate::new(index, name);
        trace!("icon candidate {} score={:?}", name, candidate.score);
        if let Some(score) = candidate.score {
            let better = match &self.best {
                Some(IconCandidate {
                    score: Some(best), ..
                }) => score > *best,
                _ => true,
            };
            if better {
                self.best = Some(candidate.clone());
            }
        }
        self.last = Some(candidate);
    }

    pub fn finish(self) -> Option<IconCandidate> {
        self.best.or(self.last)
    }
}

/// Pick the best icon out of `(index, name)` pairs in scan order
#[cfg(test)]
fn pick_icon<'a>(names: impl IntoIterator<Item = (usize, &'a str)>) -> Option<IconCandidate> {
    let mut picker = IconPicker::new();
    for (index, name) in names {
        picker.offer(index, name);
    }
    picker.finish()
}
