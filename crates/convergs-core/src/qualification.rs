use std::collections::BTreeMap;

use convergs_schema::DEFAULT_QUALIFICATION_KEYS;

/// Lead attributes extracted by the remote agent over one session.
///
/// Fill is monotonic: a key, once set, is only ever overwritten by a newer
/// value, never removed, until the whole record is cleared with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualificationTracker {
    keys: Vec<String>,
    fields: BTreeMap<String, String>,
    complete: bool,
}

impl Default for QualificationTracker {
    fn default() -> Self {
        Self::new(default_qualification_keys())
    }
}

pub fn default_qualification_keys() -> Vec<String> {
    DEFAULT_QUALIFICATION_KEYS
        .iter()
        .map(|(key, _)| (*key).to_string())
        .collect()
}

impl QualificationTracker {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            fields: BTreeMap::new(),
            complete: false,
        }
    }

    /// Merge a backend update. Returns true if anything changed.
    ///
    /// Blank values are skipped. Keys outside the configured set are still
    /// recorded.
    pub fn merge(
        &mut self,
        fields: Option<&BTreeMap<String, String>>,
        complete: Option<bool>,
    ) -> bool {
        let mut changed = false;
        for (key, value) in fields.into_iter().flatten() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if self.fields.get(key).map(String::as_str) != Some(value) {
                self.fields.insert(key.clone(), value.to_string());
                changed = true;
            }
        }
        if let Some(complete) = complete {
            changed |= self.complete != complete;
            self.complete = complete;
        }
        changed
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Completeness as reported by the backend.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Configured keys not extracted yet, in configured order.
    pub fn pending_keys(&self) -> Vec<&str> {
        self.keys
            .iter()
            .filter(|key| !self.fields.contains_key(key.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && !self.complete
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.complete = false;
    }
}
