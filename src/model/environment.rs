use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::{
    model::ParseError,
    tags::{CompatibleTags, Tag},
};

/// Description of the target Python runtime: marker variable bindings for
/// dependency projection, and the interpreter identity used to rank
/// compatible wheel tags.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Environment {
    #[serde(default)]
    pub markers: BTreeMap<String, String>,
    pub interpreter: Interpreter,
    /// Explicit ranked tag list, best first. Overrides derivation from the
    /// interpreter description when present.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Interpreter {
    /// Tag prefix of the implementation, e.g. `cp` for CPython.
    #[serde(default = "default_implementation")]
    pub implementation: String,
    pub major: u32,
    pub minor: u32,
    #[serde(default)]
    pub abis: Vec<String>,
    /// Supported platform tags, ranked best first.
    pub platforms: Vec<String>,
}

fn default_implementation() -> String {
    "cp".to_owned()
}

impl Environment {
    pub fn from_file(file: &Path) -> Result<Environment, ParseError> {
        Environment::from_str(&std::fs::read_to_string(file)?)
    }

    pub fn from_str(s: &str) -> Result<Environment, ParseError> {
        toml::from_str(s).map_err(Into::into)
    }

    pub fn compatible_tags(&self) -> CompatibleTags {
        match &self.tags {
            Some(tags) => CompatibleTags::new(tags.iter().filter_map(|tag| {
                let mut parts = tag.splitn(3, '-');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(interpreter), Some(abi), Some(platform)) => {
                        Some(Tag::new(interpreter, abi, platform))
                    }
                    _ => {
                        log::warn!("Ignoring malformed tag `{tag}` in the environment file");
                        None
                    }
                }
            })),
            None => {
                let interpreter = &self.interpreter;
                let mut abis = interpreter.abis.clone();
                if abis.is_empty() {
                    abis.push(format!(
                        "{}{}{}",
                        interpreter.implementation, interpreter.major, interpreter.minor
                    ));
                }
                CompatibleTags::for_interpreter(
                    &interpreter.implementation,
                    (interpreter.major, interpreter.minor),
                    &abis,
                    &interpreter.platforms,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_environment() {
        let environment = Environment::from_str(
            r#"
[markers]
python_version = "3.8"
sys_platform = "linux"

[interpreter]
major = 3
minor = 8
platforms = ["manylinux1_x86_64"]
"#,
        )
        .unwrap();

        assert_eq!(environment.markers["python_version"], "3.8");
        assert_eq!(environment.interpreter.implementation, "cp");
        let tags = environment.compatible_tags();
        assert_eq!(
            tags.rank(&Tag::new("cp38", "cp38", "manylinux1_x86_64")),
            Some(0)
        );
    }

    #[test]
    fn explicit_tags_override_derivation() {
        let environment = Environment::from_str(
            r#"
tags = ["py3-none-any"]

[interpreter]
major = 3
minor = 8
platforms = ["linux_x86_64"]
"#,
        )
        .unwrap();

        let tags = environment.compatible_tags();
        assert_eq!(tags.rank(&Tag::new("py3", "none", "any")), Some(0));
        assert_eq!(tags.rank(&Tag::new("cp38", "cp38", "linux_x86_64")), None);
    }
}
