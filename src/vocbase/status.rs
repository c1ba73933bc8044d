use std::fmt;

/// Load state of a collection.
///
/// `Corrupted` and `Deleted` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionStatus {
    Corrupted,
    NewBorn,
    Unloaded,
    Loaded,
    Unloading,
    Deleted,
}

impl CollectionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            CollectionStatus::Corrupted => "corrupted",
            CollectionStatus::NewBorn => "new born",
            CollectionStatus::Unloaded => "unloaded",
            CollectionStatus::Loaded => "loaded",
            CollectionStatus::Unloading => "unloading",
            CollectionStatus::Deleted => "deleted",
        }
    }

    /// Whether live data may be attached.
    pub fn has_live_data(&self) -> bool {
        matches!(self, CollectionStatus::Loaded | CollectionStatus::Unloading)
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
