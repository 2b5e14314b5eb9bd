use crate::tags::TagTable;

/// Strips the `:tag` suffix from an image reference.
///
/// Everything from the first colon onwards is dropped. Registry hosts with
/// a port (`localhost:5000/image`) are not special-cased.
pub fn bare_image_name(reference: &str) -> &str {
    match reference.split_once(':') {
        Some((name, _)) => name,
        None => reference,
    }
}

/// Maps a container's image reference to the subsystem tag it belongs to.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: TagTable,
}

impl Classifier {
    pub fn new(table: TagTable) -> Self {
        Self { table }
    }

    pub fn classify(&self, image_reference: &str) -> Option<&str> {
        self.table.classify(bare_image_name(image_reference))
    }
}
