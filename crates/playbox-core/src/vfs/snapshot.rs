use std::collections::BTreeMap;
use std::sync::Arc;

use playbox_proto::{FileContent, SnapshotPayload};
use playbox_util::hash::Fingerprint;

/// Immutable path → content copy of a workspace, taken when a rebuild starts.
///
/// Contents are shared with the filesystem they came from, so taking a
/// snapshot only copies the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSnapshot {
    files: BTreeMap<String, Arc<[u8]>>,
}

impl BuildSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file. Used to seed snapshots outside a [`super::Vfs`].
    pub fn insert(&mut self, path: impl Into<String>, content: impl AsRef<[u8]>) {
        self.files
            .insert(super::path::normalize(&path.into()), Arc::from(content.as_ref()));
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.insert(path, content);
        self
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<[u8]>)> {
        self.files.iter()
    }

    /// BLAKE3 digest over every `(path, content)` pair in path order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        for (path, data) in &self.files {
            fp.entry(path, data);
        }
        fp.finish()
    }

    /// Wire form for the worker boundary.
    #[must_use]
    pub fn to_payload(&self) -> SnapshotPayload {
        self.files
            .iter()
            .map(|(path, data)| (path.clone(), FileContent::from_bytes(data.to_vec())))
            .collect()
    }

    #[must_use]
    pub fn from_payload(payload: SnapshotPayload) -> Self {
        let mut snapshot = Self::new();
        for (path, content) in payload.into_entries() {
            snapshot.insert(path, content.into_bytes());
        }
        snapshot
    }

    /// Serialize for the worker's `bundle` call.
    pub fn encode(&self) -> serde_json::Result<String> {
        playbox_proto::encode_snapshot(&self.to_payload())
    }

    /// Parse a serialized snapshot.
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        playbox_proto::decode_snapshot(payload).map(Self::from_payload)
    }
}

impl FromIterator<(String, Arc<[u8]>)> for BuildSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Arc<[u8]>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_keeps_text_and_binary() {
        let snapshot = BuildSnapshot::new()
            .with_file("/main.ts", "let x: number = 1")
            .with_file("/img.bin", [0u8, 0xff, 0x10]);

        let encoded = snapshot.encode().unwrap();
        assert!(encoded.starts_with(r#"{"dataType":"Map","value":"#));
        assert!(encoded.contains(r#"["/main.ts","let x: number = 1"]"#));

        assert_eq!(BuildSnapshot::decode(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn test_insert_normalizes_paths() {
        let snapshot = BuildSnapshot::new().with_file("src/./a.ts", "");
        assert!(snapshot.contains("/src/a.ts"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = BuildSnapshot::new().with_file("/a", "1");
        let b = BuildSnapshot::new().with_file("/a", "2");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
