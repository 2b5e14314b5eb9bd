//! Tag table mapping infrastructure subsystems to the images that belong to them.
//!
//! The table is built once, validated, and never mutated afterwards. Every
//! image name belongs to at most one tag, so a lookup has exactly one
//! possible answer.

use std::collections::HashMap;

pub const HEALTHCHECK: &str = "healthcheck";
pub const SCHEDULER: &str = "scheduler";
pub const NETWORK: &str = "network";
pub const IPSEC: &str = "ipsec";

/// The Rancher infrastructure stack images, grouped by subsystem.
const RANCHER_INFRA_IMAGES: &[(&str, &[&str])] = &[
    (HEALTHCHECK, &["rancher/healthcheck"]),
    (SCHEDULER, &["rancher/scheduler"]),
    (
        NETWORK,
        &["rancher/network-manager", "rancher/metadata", "rancher/dns"],
    ),
    (IPSEC, &["rancher/net"]),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TagTableError {
    #[error("Tag names cannot be empty")]
    EmptyTag,
    #[error("Image names cannot be empty (tag '{0}')")]
    EmptyImage(String),
    #[error("Image '{image}' is registered under both '{first}' and '{second}'")]
    DuplicateImage {
        image: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagEntry {
    tag: String,
    images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTable {
    entries: Vec<TagEntry>,
}

impl Default for TagTable {
    fn default() -> Self {
        Self::rancher_infrastructure()
    }
}

impl TagTable {
    /// The built-in table of Rancher infrastructure images.
    pub fn rancher_infrastructure() -> Self {
        Self::try_from_entries(
            RANCHER_INFRA_IMAGES
                .iter()
                .flat_map(|(tag, images)| images.iter().map(move |image| (*tag, *image))),
        )
        .expect("The built-in tag table is valid")
    }

    /// Builds a table from `(tag, image)` pairs.
    ///
    /// Pairs are appended in order. Tags keep the position of their first
    /// appearance.
    pub fn try_from_entries<I, T, M>(pairs: I) -> Result<Self, TagTableError>
    where
        I: IntoIterator<Item = (T, M)>,
        T: Into<String>,
        M: Into<String>,
    {
        let mut table = Self {
            entries: Vec::new(),
        };
        let mut owners: HashMap<String, String> = HashMap::new();

        for (tag, image) in pairs {
            let (tag, image) = (tag.into(), image.into());
            if tag.is_empty() {
                return Err(TagTableError::EmptyTag);
            }
            if image.is_empty() {
                return Err(TagTableError::EmptyImage(tag));
            }

            match owners.get(&image) {
                Some(owner) if *owner == tag => continue,
                Some(owner) => {
                    return Err(TagTableError::DuplicateImage {
                        image,
                        first: owner.clone(),
                        second: tag,
                    });
                }
                None => {
                    owners.insert(image.clone(), tag.clone());
                }
            }

            match table.entries.iter_mut().find(|entry| entry.tag == tag) {
                Some(entry) => entry.images.push(image),
                None => table.entries.push(TagEntry {
                    tag,
                    images: vec![image],
                }),
            }
        }

        Ok(table)
    }

    /// Returns a new table with `extra` appended to this one.
    pub fn extend<I, T, M>(&self, extra: I) -> Result<Self, TagTableError>
    where
        I: IntoIterator<Item = (T, M)>,
        T: Into<String>,
        M: Into<String>,
    {
        let current = self.entries.iter().flat_map(|entry| {
            entry
                .images
                .iter()
                .map(move |image| (entry.tag.clone(), image.clone()))
        });
        let extra = extra
            .into_iter()
            .map(|(tag, image)| (tag.into(), image.into()));

        Self::try_from_entries(current.chain(extra))
    }

    /// Returns the tag owning `image_name`, which must already be stripped
    /// of its `:tag` suffix.
    pub fn classify(&self, image_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.images.iter().any(|image| image == image_name))
            .map(|entry| entry.tag.as_str())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.tag.as_str())
    }

    pub fn images(&self, tag: &str) -> &[String] {
        self.entries
            .iter()
            .find(|entry| entry.tag == tag)
            .map(|entry| entry.images.as_slice())
            .unwrap_or(&[])
    }
}
