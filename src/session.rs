use crate::document::Document;
use crate::rag::QueryEngine;

/// Artifacts carried between pipeline runs within one process
pub struct SessionState<E, L> {
    documents: Option<Vec<Document>>,
    query_engine: Option<QueryEngine<E, L>>,
}

impl<E, L> Default for SessionState<E, L> {
    fn default() -> Self {
        SessionState {
            documents: None,
            query_engine: None,
        }
    }
}

impl<E, L> SessionState<E, L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded documents, if any were loaded yet
    pub fn documents(&self) -> Option<&[Document]> {
        self.documents.as_deref()
    }

    pub fn has_documents(&self) -> bool {
        self.documents.as_ref().is_some_and(|docs| !docs.is_empty())
    }

    /// Store documents unless some are already present. Returns whether they were stored.
    pub fn set_documents(&mut self, documents: Vec<Document>) -> bool {
        if self.has_documents() {
            return false;
        }
        self.documents = Some(documents);
        true
    }

    pub fn query_engine(&self) -> Option<&QueryEngine<E, L>> {
        self.query_engine.as_ref()
    }

    pub fn set_query_engine(&mut self, engine: QueryEngine<E, L>) {
        self.query_engine = Some(engine);
    }
}
