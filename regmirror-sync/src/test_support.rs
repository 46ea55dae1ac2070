//! In-memory registry for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::registry::{ManifestDigest, RegistryClient, RegistryError};

/// `sha256:` digest made of one repeated hex character.
pub(crate) fn digest(c: char) -> String {
    format!("sha256:{}", c.to_string().repeat(64))
}

#[derive(Debug, Default)]
pub(crate) struct FakeRegistry {
    digests: Mutex<HashMap<String, String>>,
    tags: Mutex<BTreeMap<String, Vec<String>>>,
    failing_mirrors: Mutex<HashSet<String>>,
    failing_tag_listings: Mutex<HashSet<String>>,
    mirrored: Mutex<Vec<String>>,
    digest_calls: AtomicUsize,
}

impl FakeRegistry {
    pub(crate) fn set_digest(&self, reference: &str, digest: String) {
        self.digests
            .lock()
            .unwrap()
            .insert(reference.to_string(), digest);
    }

    pub(crate) fn add_repository(&self, repository: &str, tags: &[&str]) {
        self.tags.lock().unwrap().insert(
            repository.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub(crate) fn fail_mirror(&self, source_reference: &str) {
        self.failing_mirrors
            .lock()
            .unwrap()
            .insert(source_reference.to_string());
    }

    pub(crate) fn fail_tag_listing(&self, repository: &str) {
        self.failing_tag_listings
            .lock()
            .unwrap()
            .insert(repository.to_string());
    }

    pub(crate) fn digest_calls(&self) -> usize {
        self.digest_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn mirrored(&self) -> Vec<String> {
        self.mirrored.lock().unwrap().clone()
    }
}

impl RegistryClient for FakeRegistry {
    fn manifest_digest(&self, reference: &str) -> Result<ManifestDigest, RegistryError> {
        self.digest_calls.fetch_add(1, Ordering::SeqCst);
        let digests = self.digests.lock().unwrap();
        let raw = digests
            .get(reference)
            .ok_or_else(|| RegistryError::Unavailable {
                target: reference.to_string(),
                message: "manifest unknown".to_string(),
            })?;
        ManifestDigest::from_output(raw).ok_or_else(|| RegistryError::MalformedDigest {
            reference: reference.to_string(),
            output: raw.clone(),
        })
    }

    fn list_repositories(&self, _registry_host: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self.tags.lock().unwrap().keys().cloned().collect())
    }

    fn list_tags(
        &self,
        registry_host: &str,
        repository: &str,
    ) -> Result<Vec<String>, RegistryError> {
        if self.failing_tag_listings.lock().unwrap().contains(repository) {
            return Err(RegistryError::Unavailable {
                target: format!("{registry_host}/{repository}"),
                message: "unauthorized".to_string(),
            });
        }
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }

    fn mirror_all_platforms(
        &self,
        source_reference: &str,
        destination_host: &str,
    ) -> Result<(), RegistryError> {
        if self.failing_mirrors.lock().unwrap().contains(source_reference) {
            return Err(RegistryError::CommandFailed {
                program: "skopeo".to_string(),
                code: Some(1),
                diagnostic: format!("copying {source_reference}: access denied"),
            });
        }
        self.mirrored
            .lock()
            .unwrap()
            .push(source_reference.to_string());
        let copied = self.digests.lock().unwrap().get(source_reference).cloned();
        if let Some(digest) = copied {
            self.set_digest(&format!("{destination_host}/{source_reference}"), digest);
        }
        Ok(())
    }
}
