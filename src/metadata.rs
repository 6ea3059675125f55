/// Stream level metadata that can accompany a write.
///
/// Lists the names of the datasets contained in a multi dataset source.
/// Writers currently ignore it, it is accepted so callers can pass along what a reader produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamMetadata {
    pub dataset_names: Vec<String>,
}

impl StreamMetadata {
    pub fn with_dataset_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        StreamMetadata {
            dataset_names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dataset_count(&self) -> usize {
        self.dataset_names.len()
    }
}
