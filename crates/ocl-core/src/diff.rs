//! Checksum based comparison of two container versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ocl_types::{ContainerVersionKey, ContentKind, ContentVersion};

use crate::store::TerminologyStore;
use crate::types::CoreResult;

/// Mnemonics grouped by how they changed between two versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDiff {
    /// Only in the newer version.
    pub new: Vec<String>,
    /// Only in the older version.
    pub removed: Vec<String>,
    /// Retired in the newer version, active in the older one.
    pub retired: Vec<String>,
    /// Smart checksum differs.
    pub changed_major: Vec<String>,
    /// Only the standard checksum differs.
    pub changed_minor: Vec<String>,
    /// Both checksums equal.
    pub same: Vec<String>,
}

impl VersionDiff {
    /// Returns true when nothing changed.
    pub fn is_unchanged(&self) -> bool {
        self.new.is_empty()
            && self.removed.is_empty()
            && self.retired.is_empty()
            && self.changed_major.is_empty()
            && self.changed_minor.is_empty()
    }
}

impl TerminologyStore {
    /// Compares the members of one kind between two container versions.
    pub fn diff_versions(
        &self,
        older: ContainerVersionKey,
        newer: ContainerVersionKey,
        kind: ContentKind,
    ) -> CoreResult<VersionDiff> {
        self.require_version(older)?;
        self.require_version(newer)?;
        let before = self.members_by_mnemonic(older, kind);
        let after = self.members_by_mnemonic(newer, kind);

        let mut diff = VersionDiff::default();
        for (mnemonic, current) in &after {
            let Some(previous) = before.get(mnemonic) else {
                diff.new.push(mnemonic.clone());
                continue;
            };
            let bucket = if current.retired() && !previous.retired() {
                &mut diff.retired
            } else if current.checksums.smart != previous.checksums.smart {
                &mut diff.changed_major
            } else if current.checksums.standard != previous.checksums.standard {
                &mut diff.changed_minor
            } else {
                &mut diff.same
            };
            bucket.push(mnemonic.clone());
        }
        diff.removed = before
            .keys()
            .filter(|mnemonic| !after.contains_key(*mnemonic))
            .cloned()
            .collect();
        Ok(diff)
    }

    fn members_by_mnemonic(&self, version: ContainerVersionKey, kind: ContentKind) -> BTreeMap<String, &ContentVersion> {
        self.graph
            .context_members(version)
            .into_iter()
            .filter_map(|key| self.graph.content_version(key))
            .filter(|member| member.kind() == kind)
            .map(|member| (member.mnemonic().to_string(), member))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WriteContext;
    use ocl_types::{ConceptPayload, OwnerKind, RepositoryIdentity, RepositoryMetadata, VersionMetadata};

    #[test]
    fn test_diff_versions() {
        let mut store = TerminologyStore::new();
        let ctx = WriteContext::new("tester");
        let identity = RepositoryIdentity::source(OwnerKind::Organization, "org", "src");
        store
            .create_repository(&ctx, identity.clone(), RepositoryMetadata::named("Source"))
            .unwrap();
        let mut firsts = std::collections::HashMap::new();
        for code in ["keep", "rename", "extra", "retire", "drop"] {
            let key = store
                .write_content(&ctx, &identity, ConceptPayload::new(code, "Misc", code), None)
                .unwrap();
            firsts.insert(code, key);
        }
        store.cut_version(&ctx, &identity, "v1", VersionMetadata::default()).unwrap();

        store
            .write_content(&ctx, &identity, ConceptPayload::new("rename", "Misc", "renamed"), Some(firsts["rename"]))
            .unwrap();
        let mut extra = ConceptPayload::new("extra", "Misc", "extra");
        extra.extras.insert("note".to_string(), serde_json::json!("minor"));
        store.write_content(&ctx, &identity, extra, Some(firsts["extra"])).unwrap();
        store
            .retire_content(&ctx, &identity, ContentKind::Concept, "retire", None)
            .unwrap();
        store
            .write_content(&ctx, &identity, ConceptPayload::new("fresh", "Misc", "fresh"), None)
            .unwrap();
        store.cut_version(&ctx, &identity, "v2", VersionMetadata::default()).unwrap();

        let v1 = store.version_key(&identity, "v1").unwrap();
        let v2 = store.version_key(&identity, "v2").unwrap();
        let diff = store.diff_versions(v1, v2, ContentKind::Concept).unwrap();
        assert_eq!(diff.new, vec!["fresh"]);
        assert!(diff.removed.is_empty());
        assert_eq!(diff.retired, vec!["retire"]);
        assert_eq!(diff.changed_major, vec!["rename"]);
        assert_eq!(diff.changed_minor, vec!["extra"]);
        assert_eq!(diff.same, vec!["drop", "keep"]);

        let reverse = store.diff_versions(v2, v1, ContentKind::Concept).unwrap();
        assert_eq!(reverse.removed, vec!["fresh"]);
        assert!(store.diff_versions(v1, v1, ContentKind::Concept).unwrap().is_unchanged());
    }
}
