//! In-memory object store

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::DynamicObject;

use reclaim_common::infra::{MetadataChange, ObjectRef, ObjectStore};
use reclaim_common::{Error, Result};

type Key = (String, String, String);

fn key(reference: &ObjectRef) -> Key {
    (
        reference.kind.clone(),
        reference.namespace.clone().unwrap_or_default(),
        reference.name.clone(),
    )
}

/// `ObjectStore` keeping objects in a map
///
/// Patches honour `resourceVersion` like the API server: a stale version
/// fails with a 409 conflict and every successful patch bumps the version.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<HashMap<Key, DynamicObject>>>,
    patches: Arc<Mutex<Vec<MetadataChange>>>,
}

impl InMemoryObjectStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object
    pub fn insert(&self, reference: &ObjectRef, object: DynamicObject) {
        self.objects
            .lock()
            .expect("store lock poisoned")
            .insert(key(reference), object);
    }

    /// Current stored state of an object
    pub fn object(&self, reference: &ObjectRef) -> Option<DynamicObject> {
        self.objects
            .lock()
            .expect("store lock poisoned")
            .get(&key(reference))
            .cloned()
    }

    /// Every metadata change applied so far
    pub fn patches(&self) -> Vec<MetadataChange> {
        self.patches.lock().expect("store lock poisoned").clone()
    }

    /// Simulate another writer by bumping an object's resourceVersion
    pub fn touch(&self, reference: &ObjectRef) {
        if let Some(obj) = self
            .objects
            .lock()
            .expect("store lock poisoned")
            .get_mut(&key(reference))
        {
            obj.metadata.resource_version = Some(next_version(&obj.metadata.resource_version));
        }
    }
}

fn next_version(current: &Option<String>) -> String {
    let n: u64 = current.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

fn conflict(reference: &ObjectRef) -> Error {
    Error::from(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!(
            "Operation cannot be fulfilled on {} {}: the object has been modified",
            reference.kind, reference.name
        ),
        reason: "Conflict".to_string(),
        code: 409,
    }))
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, reference: &ObjectRef) -> Result<Option<DynamicObject>> {
        Ok(self.object(reference))
    }

    async fn patch_metadata(
        &self,
        reference: &ObjectRef,
        change: &MetadataChange,
    ) -> Result<DynamicObject> {
        let mut objects = self.objects.lock().expect("store lock poisoned");
        let obj = objects.get_mut(&key(reference)).ok_or_else(|| {
            Error::not_found(
                reference.kind.clone(),
                reference.namespace.clone().unwrap_or_default(),
                reference.name.clone(),
            )
        })?;

        if change.resource_version.is_some()
            && change.resource_version != obj.metadata.resource_version
        {
            return Err(conflict(reference));
        }

        for (k, v) in &change.annotations {
            let annotations = obj.metadata.annotations.get_or_insert_with(Default::default);
            match v {
                Some(v) => {
                    annotations.insert(k.clone(), v.clone());
                }
                None => {
                    annotations.remove(k);
                }
            }
        }
        if let Some(finalizers) = &change.finalizers {
            obj.metadata.finalizers = Some(finalizers.clone());
        }
        obj.metadata.resource_version = Some(next_version(&obj.metadata.resource_version));

        self.patches
            .lock()
            .expect("store lock poisoned")
            .push(change.clone());
        Ok(obj.clone())
    }
}
