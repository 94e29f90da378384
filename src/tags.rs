use std::collections::HashMap;
use std::fmt::Display;

use crate::model::{lock::FileRecord, ParseError};

/// One runtime target a wheel can support.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub interpreter: String,
    pub abi: String,
    pub platform: String,
}

impl Tag {
    pub fn new(
        interpreter: impl Into<String>,
        abi: impl Into<String>,
        platform: impl Into<String>,
    ) -> Tag {
        Tag {
            interpreter: interpreter.into(),
            abi: abi.into(),
            platform: platform.into(),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.interpreter, self.abi, self.platform)
    }
}

/// The runtime's supported tags, ranked strictly best-first. The rank is the
/// single source of tie-break truth when several wheels match.
#[derive(Debug, Clone)]
pub struct CompatibleTags {
    ranks: HashMap<Tag, usize>,
}

impl CompatibleTags {
    pub fn new(tags: impl IntoIterator<Item = Tag>) -> CompatibleTags {
        let mut ranks = HashMap::new();
        for (index, tag) in tags.into_iter().enumerate() {
            ranks.entry(tag).or_insert(index);
        }
        CompatibleTags { ranks }
    }

    /// Ranked tag list for an interpreter, mirroring the ordering of
    /// `packaging.tags.sys_tags()`: interpreter-specific tags first, then the
    /// generic `py*` fallbacks.
    pub fn for_interpreter(
        implementation: &str,
        version: (u32, u32),
        abis: &[String],
        platforms: &[String],
    ) -> CompatibleTags {
        let (major, minor) = version;
        let interpreter = format!("{implementation}{major}{minor}");
        let mut tags = Vec::new();

        let mut ranked_abis: Vec<String> = abis.to_vec();
        for abi in ["abi3", "none"] {
            if !ranked_abis.iter().any(|a| a == abi) {
                ranked_abis.push(abi.to_owned());
            }
        }
        for abi in &ranked_abis {
            for platform in platforms {
                tags.push(Tag::new(&interpreter, abi, platform));
            }
        }

        // Older interpreters remain usable through the stable ABI.
        if implementation == "cp" {
            for older in (2..minor).rev() {
                for platform in platforms {
                    tags.push(Tag::new(format!("cp{major}{older}"), "abi3", platform));
                }
            }
        }

        let mut generic = vec![format!("py{major}{minor}"), format!("py{major}")];
        generic.extend((0..minor).rev().map(|older| format!("py{major}{older}")));

        for version in &generic {
            for platform in platforms {
                tags.push(Tag::new(version, "none", platform));
            }
        }
        tags.push(Tag::new(&interpreter, "none", "any"));
        for version in &generic {
            tags.push(Tag::new(version, "none", "any"));
        }

        CompatibleTags::new(tags)
    }

    pub fn rank(&self, tag: &Tag) -> Option<usize> {
        self.ranks.get(tag).copied()
    }
}

/// The tag segments of a wheel filename,
/// `{name}-{version}(-{build})?-{interpreters}-{abis}-{platforms}.whl`,
/// where each segment may hold several dot-separated values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    interpreters: Vec<String>,
    abis: Vec<String>,
    platforms: Vec<String>,
}

impl WheelFilename {
    pub fn parse(filename: &str) -> Result<WheelFilename, ParseError> {
        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| ParseError::MalformedWheelFilename(filename.to_owned()))?;

        let mut segments = stem.rsplitn(4, '-');
        let platforms = segments.next();
        let abis = segments.next();
        let interpreters = segments.next();
        let (Some(platforms), Some(abis), Some(interpreters), Some(_)) =
            (platforms, abis, interpreters, segments.next())
        else {
            return Err(ParseError::MalformedWheelFilename(filename.to_owned()));
        };

        let split = |s: &str| s.split('.').map(str::to_owned).collect();
        Ok(WheelFilename {
            interpreters: split(interpreters),
            abis: split(abis),
            platforms: split(platforms),
        })
    }

    /// Full cross product of tags this wheel claims to support.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.interpreters.iter().flat_map(move |interpreter| {
            self.abis.iter().flat_map(move |abi| {
                self.platforms
                    .iter()
                    .map(move |platform| Tag::new(interpreter, abi, platform))
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Wheel,
    Source,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile<'a> {
    pub kind: ArtifactKind,
    pub file: &'a FileRecord,
}

/// Picks the single best file for the runtime: the wheel whose best matching
/// tag ranks highest, otherwise a source archive, otherwise nothing. `None`
/// is a legitimate outcome, e.g. a Windows-only package on Linux.
pub fn best_compatible_file<'a>(
    files: &'a [FileRecord],
    tags: &CompatibleTags,
) -> Result<Option<SelectedFile<'a>>, ParseError> {
    let mut source_dist = None;
    let mut best_wheel: Option<(&FileRecord, usize)> = None;

    for file in files {
        if file.file.ends_with(".whl") {
            let filename = WheelFilename::parse(&file.file)?;
            for tag in filename.tags() {
                if let Some(rank) = tags.rank(&tag) {
                    let improves = best_wheel.map(|(_, best)| rank < best).unwrap_or(true);
                    if improves {
                        best_wheel = Some((file, rank));
                    }
                }
            }
        } else if file.file.ends_with(".tar.gz") || file.file.ends_with(".zip") {
            // Deliberately last-wins when a release carries several archives.
            source_dist = Some(file);
        }
    }

    if let Some((file, _)) = best_wheel {
        return Ok(Some(SelectedFile {
            kind: ArtifactKind::Wheel,
            file,
        }));
    }
    Ok(source_dist.map(|file| SelectedFile {
        kind: ArtifactKind::Source,
        file,
    }))
}
