//! Store-once / consume-once results of one-shot URL loads.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct LoaderResultStore {
    results: DashMap<String, Vec<u8>>,
}

impl LoaderResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the response for `id`. A second result for the same id is ignored
    /// and false is returned.
    pub fn store(&self, id: &str, data: Vec<u8>) -> bool {
        match self.results.entry(id.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!("loader result for {id} already stored, ignoring duplicate");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(data);
                true
            }
        }
    }

    /// Remove and return the response for `id`.
    pub fn take(&self, id: &str) -> Option<Vec<u8>> {
        self.results.remove(id).map(|(_, data)| data)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&self) {
        self.results.clear();
    }
}
