use clap::ValueEnum;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use sysinfo::System;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    #[value(alias = "macos")]
    #[serde(alias = "macos")]
    Osx,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Osx
        } else {
            Self::Linux
        }
    }

    /// The key used in version JSON (`os.name` and the `natives` map).
    pub fn get(&self) -> &'static str {
        match *self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Osx => "osx",
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86,
    #[value(name = "x86_64")]
    X86_64,
    Arm32,
    Arm64,
}

impl Arch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => Self::X86,
            "arm" => Self::Arm32,
            "aarch64" => Self::Arm64,
            _ => Self::X86_64,
        }
    }

    /// Parses the spellings used in `os.arch` rule qualifiers.
    pub fn from_rule(name: &str) -> Option<Self> {
        match name {
            "x86" | "i386" | "i686" => Some(Self::X86),
            "x86_64" | "x64" | "amd64" => Some(Self::X86_64),
            "arm" | "arm32" => Some(Self::Arm32),
            "arm64" | "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }

    /// Substitution for `${arch}` in native classifiers.
    pub fn bits(&self) -> &'static str {
        match *self {
            Self::X86 | Self::Arm32 => "32",
            Self::X86_64 | Self::Arm64 => "64",
        }
    }
}

/// The host facts rule evaluation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub os: OsFamily,
    pub arch: Arch,
    pub os_version: Option<String>,
    pub features: BTreeSet<String>,
}

impl PlatformDescriptor {
    pub fn new(os: OsFamily, arch: Arch) -> Self {
        Self {
            os,
            arch,
            os_version: None,
            features: BTreeSet::new(),
        }
    }

    /// The running host, with its OS version when the system reports one.
    pub fn current() -> Self {
        let platform = Self::new(OsFamily::current(), Arch::current());

        match System::os_version() {
            Some(version) => platform.with_os_version(version),
            None => platform,
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    pub fn with_os_version(mut self, version: impl Into<String>) -> Self {
        self.os_version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One `{ action, os?, features? }` record. A rule without qualifiers
/// matches every platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub action: RuleAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
}

impl Rule {
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            os: None,
            features: None,
        }
    }

    pub fn disallow() -> Self {
        Self {
            action: RuleAction::Disallow,
            os: None,
            features: None,
        }
    }

    pub fn for_os(mut self, os: OsFamily) -> Self {
        self.os.get_or_insert_with(OsRule::default).name = Some(os.get().into());
        self
    }

    pub fn matches(&self, platform: &PlatformDescriptor) -> bool {
        if let Some(os) = &self.os {
            if let Some(name) = &os.name {
                let wanted = if name == "macos" { "osx" } else { name.as_str() };

                if wanted != platform.os.get() {
                    return false;
                }
            }

            if let Some(arch) = &os.arch {
                if Arch::from_rule(arch) != Some(platform.arch) {
                    return false;
                }
            }

            if let Some(pattern) = &os.version {
                let Some(version) = &platform.os_version else {
                    return false;
                };

                match Regex::new(pattern) {
                    Ok(re) if re.is_match(version) => {}
                    Ok(_) => return false,
                    Err(e) => {
                        log::warn!("Ignoring rule with invalid os.version pattern {pattern:?}: {e}");
                        return false;
                    }
                }
            }
        }

        if let Some(features) = &self.features {
            for (feature, wanted) in features {
                if platform.features.contains(feature) != *wanted {
                    return false;
                }
            }
        }

        true
    }
}

/// Last matching rule decides; no matching rule means allowed.
pub fn is_allowed(rules: &[Rule], platform: &PlatformDescriptor) -> bool {
    rules
        .iter()
        .rev()
        .find(|rule| rule.matches(platform))
        .map(|rule| rule.action == RuleAction::Allow)
        .unwrap_or(true)
}
