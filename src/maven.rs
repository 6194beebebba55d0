use crate::error::{Error, Result};
use std::fmt;

/// A parsed `group:artifact:version[:classifier][@ext]` coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl Coordinate {
    pub fn parse(mvn: impl AsRef<str>) -> Result<Self> {
        let mvn = mvn.as_ref();
        let (first, ext) = match mvn.split_once('@') {
            Some((first, ext)) => (first, ext.to_string()),
            None => (mvn, "jar".into()),
        };

        let mut parts = first.split(':');
        let (Some(group), Some(artifact), Some(version)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidCoordinate(mvn.into()));
        };

        if group.is_empty() || artifact.is_empty() || version.is_empty() {
            return Err(Error::InvalidCoordinate(mvn.into()));
        }

        Ok(Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
            classifier: parts.next().map(|v| v.to_string()),
            extension: ext,
        })
    }

    /// The same coordinate with a different classifier.
    pub fn with_classifier(&self, classifier: impl Into<String>) -> Self {
        Self {
            classifier: Some(classifier.into()),
            ..self.clone()
        }
    }

    /// Identity used when merging library lists. The version is left out so a
    /// newer `B` replaces an older `B`; the classifier is kept so a natives
    /// jar never replaces its main jar.
    pub fn identity(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!("{}:{}:{}", self.group, self.artifact, classifier),
            None => format!("{}:{}", self.group, self.artifact),
        }
    }

    pub fn file_name(&self) -> String {
        let classifier = self
            .classifier
            .as_ref()
            .map(|v| format!("-{}", v))
            .unwrap_or_default();

        format!(
            "{}-{}{classifier}.{}",
            self.artifact, self.version, self.extension
        )
    }

    pub fn path(&self) -> String {
        let group = self.group.replace('.', "/");

        format!(
            "{group}/{}/{}/{}",
            self.artifact,
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;

        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }

        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }

        Ok(())
    }
}
