//! In-memory vector index.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;

use super::validate_name;
use crate::error::PortError;
use crate::ports::ClassSpec;
use crate::ports::PropertySpec;
use crate::ports::VectorIndex;
use crate::ports::VectorMeta;

/// A stored vector and its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub vector: Vec<f32>,
    pub meta: Option<VectorMeta>,
}

#[derive(Default)]
struct IndexState {
    classes: HashMap<String, ClassSpec>,
    vectors: HashMap<(String, String), StoredVector>,
}

/// Classes and vectors kept in maps, keyed by `(class, id)`.
#[derive(Default)]
pub struct InMemoryIndex {
    state: Mutex<IndexState>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(&self, name: &str) -> Option<ClassSpec> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).classes.get(name).cloned()
    }

    pub fn vector(&self, class: &str, id: &str) -> Option<StoredVector> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.vectors.get(&(class.to_string(), id.to_string())).cloned()
    }

    pub fn vector_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).vectors.len()
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex").finish_non_exhaustive()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_class(&self, class: &ClassSpec) -> Result<(), PortError> {
        validate_name(&class.name)?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.classes.entry(class.name.clone()).or_insert_with(|| class.clone());
        Ok(())
    }

    async fn ensure_properties(&self, class: &str, properties: &[PropertySpec]) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(existing) = state.classes.get_mut(class) else {
            return Err(PortError::ClassNotFound {
                class: class.to_string(),
            });
        };
        for prop in properties {
            if !existing.properties.iter().any(|p| p.name == prop.name) {
                existing.properties.push(prop.clone());
            }
        }
        Ok(())
    }

    async fn upsert_vector(
        &self,
        class: &str,
        id: &str,
        vector: &[f32],
        meta: Option<&VectorMeta>,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.vectors.insert((class.to_string(), id.to_string()), StoredVector {
            vector: vector.to_vec(),
            meta: meta.cloned(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(name: &str, data_type: &str) -> PropertySpec {
        PropertySpec {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    #[tokio::test]
    async fn test_properties_merge_without_duplicates() {
        let idx = InMemoryIndex::new();
        idx.ensure_class(&ClassSpec {
            name: "doc".into(),
            properties: vec![prop("title", "text")],
        })
        .await
        .unwrap();

        idx.ensure_properties("doc", &[prop("title", "string"), prop("body", "text")]).await.unwrap();
        idx.ensure_properties("doc", &[prop("body", "text")]).await.unwrap();

        let class = idx.class("doc").unwrap();
        assert_eq!(class.properties, vec![prop("title", "text"), prop("body", "text")]);
    }

    #[tokio::test]
    async fn test_ensure_class_keeps_existing_definition() {
        let idx = InMemoryIndex::new();
        idx.ensure_class(&ClassSpec {
            name: "doc".into(),
            properties: vec![prop("a", "text")],
        })
        .await
        .unwrap();
        idx.ensure_class(&ClassSpec {
            name: "doc".into(),
            properties: Vec::new(),
        })
        .await
        .unwrap();
        assert_eq!(idx.class("doc").unwrap().properties.len(), 1);
    }

    #[tokio::test]
    async fn test_properties_on_unknown_class_fail() {
        let idx = InMemoryIndex::new();
        assert!(matches!(idx.ensure_properties("ghost", &[]).await, Err(PortError::ClassNotFound { .. })));
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_class_and_id() {
        let idx = InMemoryIndex::new();
        let meta = VectorMeta::from([("source".to_string(), "cam1".to_string())]);

        idx.upsert_vector("doc", "id1", &[0.1, 0.2], None).await.unwrap();
        idx.upsert_vector("doc", "id1", &[0.3], Some(&meta)).await.unwrap();
        idx.upsert_vector("img", "id1", &[0.9], None).await.unwrap();

        let stored = idx.vector("doc", "id1").unwrap();
        assert_eq!(stored.vector, vec![0.3]);
        assert_eq!(stored.meta, Some(meta));
        assert_eq!(idx.vector_count(), 2);
    }
}
