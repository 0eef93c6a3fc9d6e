//! In-memory annotation store
//!
//! Insertion order is significant: it is both paint order and the reverse of
//! hit-test priority.

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch, TextLayout};
use crate::error::{EditorError, EditorResult, ValidationError};
use std::collections::HashMap;

/// Ordered collection of annotations with id lookup
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    index: HashMap<AnnotationId, usize>,
    revision: u64,
    text_layout: TextLayout,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that measures text with `text_layout`
    pub fn with_text_layout(text_layout: TextLayout) -> Self {
        Self { text_layout, ..Self::default() }
    }

    /// Append an annotation after validating it
    pub fn add(&mut self, annotation: Annotation) -> EditorResult<AnnotationId> {
        annotation.validate()?;
        if self.index.contains_key(&annotation.id) {
            return Err(ValidationError::DuplicateId(annotation.id.clone()).into());
        }

        let id = annotation.id.clone();
        self.index.insert(id.clone(), self.annotations.len());
        self.annotations.push(annotation);
        self.revision += 1;
        Ok(id)
    }

    /// Merge `patch` into the annotation with `id`
    ///
    /// The store is left unchanged when the patch is rejected.
    pub fn update(&mut self, id: &AnnotationId, patch: &AnnotationPatch) -> EditorResult<&Annotation> {
        let position = *self.index.get(id).ok_or_else(|| EditorError::NotFound(id.clone()))?;
        let merged = patch.apply(&self.annotations[position], &self.text_layout)?;

        self.annotations[position] = merged;
        self.revision += 1;
        Ok(&self.annotations[position])
    }

    /// Remove and return the annotation with `id`
    pub fn remove(&mut self, id: &AnnotationId) -> EditorResult<Annotation> {
        let position = self.index.remove(id).ok_or_else(|| EditorError::NotFound(id.clone()))?;
        let removed = self.annotations.remove(position);

        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        self.revision += 1;
        Ok(removed)
    }

    pub fn get(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.index.get(id).map(|&position| &self.annotations[position])
    }

    pub fn contains(&self, id: &AnnotationId) -> bool {
        self.index.contains_key(id)
    }

    /// Annotations visible on `page`, in insertion order
    ///
    /// Annotations without a page are visible everywhere.
    pub fn by_page(&self, page: u32) -> impl DoubleEndedIterator<Item = &Annotation> + Clone + '_ {
        self.annotations.iter().filter(move |annotation| annotation.is_on_page(page))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Annotation> + '_ {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Bumped on every successful mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn text_layout(&self) -> &TextLayout {
        &self.text_layout
    }

    /// Owned copy of the full set in insertion order, for persistence
    pub fn snapshot(&self) -> Vec<Annotation> {
        self.annotations.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Color;
    use crate::geometry::Rect;

    fn highlight(page: Option<u32>, x: f32) -> Annotation {
        Annotation::highlight(page, Rect::new(x, 0.0, 20.0, 20.0), Color::YELLOW, 0.3)
    }

    #[test]
    fn test_add_and_get() {
        let mut store = AnnotationStore::new();
        let annotation = highlight(Some(1), 0.0);
        let id = store.add(annotation.clone()).unwrap();

        assert_eq!(store.get(&id), Some(&annotation));
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut store = AnnotationStore::new();
        let annotation = highlight(Some(1), 0.0);
        store.add(annotation.clone()).unwrap();

        let result = store.add(annotation.clone());
        assert_eq!(result, Err(ValidationError::DuplicateId(annotation.id).into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_rejects_invalid_annotation() {
        let mut store = AnnotationStore::new();
        let mut annotation = highlight(Some(1), 0.0);
        annotation.x = f32::NAN;

        assert!(matches!(store.add(annotation), Err(EditorError::Validation(_))));
        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_by_page_includes_unscoped_in_insertion_order() {
        let mut store = AnnotationStore::new();
        let a = store.add(highlight(Some(1), 0.0)).unwrap();
        let b = store.add(highlight(Some(2), 10.0)).unwrap();
        let c = store.add(highlight(None, 20.0)).unwrap();

        let page_one: Vec<_> = store.by_page(1).map(|annotation| annotation.id.clone()).collect();
        let page_two: Vec<_> = store.by_page(2).map(|annotation| annotation.id.clone()).collect();

        assert_eq!(page_one, vec![a, c.clone()]);
        assert_eq!(page_two, vec![b, c]);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let mut store = AnnotationStore::new();
        let id = AnnotationId::generate();
        assert_eq!(
            store.update(&id, &AnnotationPatch::position(1.0, 1.0)).map(|_| ()),
            Err(EditorError::NotFound(id))
        );
    }

    #[test]
    fn test_rejected_update_leaves_store_unchanged() {
        let mut store = AnnotationStore::new();
        let annotation = highlight(Some(1), 0.0);
        let id = store.add(annotation.clone()).unwrap();

        let patch = AnnotationPatch { opacity: Some(2.0), ..AnnotationPatch::default() };
        assert!(store.update(&id, &patch).is_err());
        assert_eq!(store.get(&id), Some(&annotation));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_remove_keeps_order_and_index() {
        let mut store = AnnotationStore::new();
        let a = store.add(highlight(Some(1), 0.0)).unwrap();
        let b = store.add(highlight(Some(1), 10.0)).unwrap();
        let c = store.add(highlight(Some(1), 20.0)).unwrap();

        store.remove(&b).unwrap();

        let ids: Vec<_> = store.iter().map(|annotation| annotation.id.clone()).collect();
        assert_eq!(ids, vec![a, c.clone()]);
        assert_eq!(store.get(&c).map(|annotation| annotation.x), Some(20.0));
        assert_eq!(store.remove(&b), Err(EditorError::NotFound(b)));
    }
}
