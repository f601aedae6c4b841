use std::sync::Arc;

use crate::application::documents::DocumentService;
use crate::application::render::{BrowserControl, PageCounter};
use crate::infra::artifacts::ArtifactStore;

#[derive(Clone)]
pub struct ApiState {
    pub documents: DocumentService,
    pub artifacts: Arc<ArtifactStore>,
    pub browser: Arc<dyn BrowserControl>,
    pub pages: PageCounter,
}
