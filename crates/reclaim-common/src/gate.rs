//! Annotation and finalizer gate
//!
//! In-memory edits of an object's metadata. Nothing here talks to the API
//! server; callers persist changes through [`crate::ClusterScope::patch_object`].

use kube::{Resource, ResourceExt};

use crate::task::{parse_task_list, GcTask};
use crate::{Error, Result, GC_ANNOTATION, GC_TASKS_ANNOTATION};

/// Annotation and finalizer accessors for any Kubernetes object
pub trait MetadataGate {
    /// Value of an annotation, if set
    fn annotation(&self, key: &str) -> Option<&str>;

    /// Whether an annotation is set, regardless of value
    fn has_annotation(&self, key: &str) -> bool {
        self.annotation(key).is_some()
    }

    /// Set an annotation, replacing any existing value
    fn set_annotation(&mut self, key: &str, value: &str);

    /// Remove an annotation. Returns true if it was present.
    fn remove_annotation(&mut self, key: &str) -> bool;

    /// Whether the finalizer list contains `finalizer`
    fn contains_finalizer(&self, finalizer: &str) -> bool;

    /// Add a finalizer. Returns true if the list changed.
    fn add_finalizer(&mut self, finalizer: &str) -> bool;

    /// Remove every occurrence of a finalizer. Returns true if the list changed.
    fn remove_finalizer(&mut self, finalizer: &str) -> bool;
}

impl<K: Resource> MetadataGate for K {
    fn annotation(&self, key: &str) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    fn set_annotation(&mut self, key: &str, value: &str) {
        self.meta_mut()
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
    }

    fn remove_annotation(&mut self, key: &str) -> bool {
        self.meta_mut()
            .annotations
            .as_mut()
            .map(|a| a.remove(key).is_some())
            .unwrap_or(false)
    }

    fn contains_finalizer(&self, finalizer: &str) -> bool {
        self.meta()
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.contains_finalizer(finalizer) {
            return false;
        }
        self.meta_mut()
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(finalizer.to_string());
        true
    }

    fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let Some(finalizers) = self.meta_mut().finalizers.as_mut() else {
            return false;
        };
        let before = finalizers.len();
        finalizers.retain(|f| f != finalizer);
        finalizers.len() != before
    }
}

/// Parse a boolean the way CAPA annotations are written
///
/// Accepts `1 t T TRUE true True 0 f F FALSE false False`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Whether external resource GC is enabled for this object
///
/// A missing annotation means enabled. A value that is not a boolean is an
/// error so that no cleanup runs on a misconfigured cluster.
pub fn gc_enabled<K: Resource>(obj: &K) -> Result<bool> {
    match obj.annotation(GC_ANNOTATION) {
        None => Ok(true),
        Some(value) => parse_bool(value).ok_or_else(|| {
            Error::validation_for_field(
                obj.name_any(),
                format!("metadata.annotations[{GC_ANNOTATION}]"),
                format!("converting value {value:?} of annotation {GC_ANNOTATION} to bool"),
            )
        }),
    }
}

/// The GC task selection stored on this object, `None` when unrestricted
pub fn gc_tasks<K: Resource>(obj: &K) -> Result<Option<Vec<GcTask>>> {
    match obj.annotation(GC_TASKS_ANNOTATION) {
        None => Ok(None),
        Some(value) => parse_task_list(value).map(Some).map_err(|e| match e {
            Error::Validation { message, .. } => Error::validation_for_field(
                obj.name_any(),
                format!("metadata.annotations[{GC_TASKS_ANNOTATION}]"),
                message,
            ),
            other => other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube_utils::build_api_resource;
    use crate::GC_FINALIZER;
    use kube::api::DynamicObject;

    fn infra_object() -> DynamicObject {
        let ar = build_api_resource("infrastructure.cluster.x-k8s.io/v1beta2", "AWSCluster");
        DynamicObject::new("cluster1", &ar).within("default")
    }

    #[test]
    fn annotations_set_get_and_remove() {
        let mut obj = infra_object();
        assert_eq!(obj.annotation(GC_ANNOTATION), None);
        assert!(!obj.has_annotation(GC_ANNOTATION));

        obj.set_annotation(GC_ANNOTATION, "true");
        assert_eq!(obj.annotation(GC_ANNOTATION), Some("true"));

        obj.set_annotation(GC_ANNOTATION, "false");
        assert_eq!(obj.annotation(GC_ANNOTATION), Some("false"));

        assert!(obj.remove_annotation(GC_ANNOTATION));
        assert!(!obj.remove_annotation(GC_ANNOTATION));
        assert!(!obj.has_annotation(GC_ANNOTATION));
    }

    #[test]
    fn finalizers_are_added_once_and_removed() {
        let mut obj = infra_object();
        assert!(!obj.contains_finalizer(GC_FINALIZER));
        assert!(!obj.remove_finalizer(GC_FINALIZER));

        assert!(obj.add_finalizer(GC_FINALIZER));
        assert!(!obj.add_finalizer(GC_FINALIZER));
        assert_eq!(obj.finalizers().len(), 1);

        obj.add_finalizer("other");
        assert!(obj.remove_finalizer(GC_FINALIZER));
        assert_eq!(obj.finalizers(), ["other".to_string()]);
    }

    #[test]
    fn gc_is_enabled_when_annotation_absent() {
        assert!(gc_enabled(&infra_object()).unwrap());
    }

    #[test]
    fn gc_annotation_accepts_boolean_spellings() {
        let mut obj = infra_object();
        for (value, expected) in [("true", true), ("1", true), ("T", true), ("False", false), ("0", false)] {
            obj.set_annotation(GC_ANNOTATION, value);
            assert_eq!(gc_enabled(&obj).unwrap(), expected, "value {value}");
        }
    }

    #[test]
    fn non_boolean_gc_annotation_is_an_error() {
        let mut obj = infra_object();
        obj.set_annotation(GC_ANNOTATION, "yes please");
        let err = gc_enabled(&obj).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.cluster(), Some("cluster1"));
    }

    #[test]
    fn task_selection_parses_annotation() {
        let mut obj = infra_object();
        assert_eq!(gc_tasks(&obj).unwrap(), None);

        obj.set_annotation(GC_TASKS_ANNOTATION, "security-group,load-balancer");
        assert_eq!(
            gc_tasks(&obj).unwrap(),
            Some(vec![GcTask::SecurityGroup, GcTask::LoadBalancer])
        );

        obj.set_annotation(GC_TASKS_ANNOTATION, "INVALID");
        let err = gc_tasks(&obj).unwrap_err();
        assert_eq!(err.cluster(), Some("cluster1"));
    }
}
