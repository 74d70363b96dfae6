use serde::Serialize;

/// A QEMU disk image uploaded to the `import` content of a storage.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QemuImage {
    pub name: String,
    pub version: String,
    pub storage_name: String,
}

impl QemuImage {
    /// Recognizes volumes named `{storage}:import/{name}-{version}.qcow2`.
    ///
    pub fn from_volume(storage: &str, name: &str, volid: &str) -> Option<Self> {
        let file = volid.strip_prefix(storage)?.strip_prefix(":import/")?;
        let version = file
            .strip_suffix(".qcow2")?
            .strip_prefix(name)?
            .strip_prefix('-')?;
        SemanticVersion::parse(version)?;

        Some(Self {
            name: name.to_owned(),
            version: version.to_owned(),
            storage_name: storage.to_owned(),
        })
    }

    /// Volume the image can be imported from, e.g. `import/debian-12.1.0.qcow2`.
    ///
    pub fn import_path(&self) -> String {
        format!("import/{}-{}.qcow2", self.name, self.version)
    }

    pub fn semantic_version(&self) -> SemanticVersion {
        SemanticVersion::parse(&self.version).unwrap_or_default()
    }
}

/// `major.minor.patch` version. Missing components count as zero.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemanticVersion(u64, u64, u64);

impl SemanticVersion {
    pub fn parse(version: &str) -> Option<Self> {
        let mut parts = version.split('.');
        let mut next = || -> Option<u64> {
            match parts.next() {
                Some(part) => part.parse().ok(),
                None => Some(0),
            }
        };
        let parsed = Self(next()?, next()?, next()?);
        parts.next().is_none().then_some(parsed)
    }
}

/// Picks the image with the highest version.
///
pub fn latest(images: Vec<QemuImage>) -> Option<QemuImage> {
    images.into_iter().max_by_key(QemuImage::semantic_version)
}
