// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared services for a paging session: resource libraries, the model
//! loader and the cross-tile resource cache.

use crate::error::{Error, Result};
use crate::scene::{Drawable, ModelNode};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use skyline_core::{ModelResource, ResourceLibrary};
use skyline_geometry::Mesh;
use std::path::PathBuf;
use std::sync::Arc;

/// Turns a model resource into renderable geometry
pub trait ModelLoader: Send + Sync {
    fn load(&self, model: &ModelResource) -> Result<ModelNode>;
}

/// Loader over models registered in memory, keyed by uri
#[derive(Debug, Default)]
pub struct InMemoryModelLoader {
    models: RwLock<FxHashMap<String, ModelNode>>,
}

impl InMemoryModelLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, node: ModelNode) {
        self.models.write().insert(uri.into(), node);
    }
}

impl ModelLoader for InMemoryModelLoader {
    fn load(&self, model: &ModelResource) -> Result<ModelNode> {
        self.models
            .read()
            .get(&model.uri)
            .cloned()
            .ok_or_else(|| Error::ModelLoad(model.uri.clone()))
    }
}

/// Loads a JSON-serialized [`Mesh`] from `base_dir/uri`
#[derive(Debug, Clone)]
pub struct FileModelLoader {
    base_dir: PathBuf,
}

impl FileModelLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl ModelLoader for FileModelLoader {
    fn load(&self, model: &ModelResource) -> Result<ModelNode> {
        let path = self.base_dir.join(&model.uri);
        let bytes = std::fs::read(&path)?;
        let mesh: Mesh = serde_json::from_slice(&bytes)?;
        Ok(ModelNode::new(
            model.name.clone(),
            vec![Drawable::new(mesh, [1.0; 4])],
        ))
    }
}

/// Read-through cache of loaded models shared by all tile builds.
///
/// Loading happens outside the lock. When two builds race on the same
/// resource the first stored node wins and both receive it.
#[derive(Default)]
pub struct ResourceCache {
    nodes: RwLock<FxHashMap<ModelKey, Arc<ModelNode>>>,
}

/// Identity of a model resource: libraries may reuse a name for
/// different files
pub(crate) type ModelKey = (String, String);

pub(crate) fn model_key(model: &ModelResource) -> ModelKey {
    (model.name.clone(), model.uri.clone())
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Shared node for `model`, loading it on first use
    pub fn get_or_create_instance_node(
        &self,
        model: &ModelResource,
        loader: &dyn ModelLoader,
    ) -> Option<Arc<ModelNode>> {
        let key = model_key(model);
        if let Some(node) = self.nodes.read().get(&key) {
            return Some(node.clone());
        }

        let node = match loader.load(model) {
            Ok(node) => Arc::new(node),
            Err(e) => {
                tracing::warn!(model = %model.name, uri = %model.uri, error = %e, "Failed to load model");
                return None;
            }
        };

        let mut nodes = self.nodes.write();
        Some(nodes.entry(key).or_insert(node).clone())
    }

    /// Private copy of the shared node, safe to attach to one tile's graph
    pub fn clone_or_create_instance_node(
        &self,
        model: &ModelResource,
        loader: &dyn ModelLoader,
    ) -> Option<ModelNode> {
        self.get_or_create_instance_node(model, loader)
            .map(|node| (*node).clone())
    }

    pub fn clear(&self) {
        self.nodes.write().clear();
    }
}

/// Everything a tile build needs that outlives the tile
#[derive(Clone)]
pub struct Session {
    libraries: FxHashMap<String, Arc<ResourceLibrary>>,
    default_library: Option<String>,
    resource_cache: Arc<ResourceCache>,
    loader: Arc<dyn ModelLoader>,
}

impl Session {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            libraries: FxHashMap::default(),
            default_library: None,
            resource_cache: Arc::new(ResourceCache::new()),
            loader,
        }
    }

    /// Register a library. The first one added becomes the default.
    pub fn add_library(&mut self, library: ResourceLibrary) {
        let name = library.name().to_string();
        if self.default_library.is_none() {
            self.default_library = Some(name.clone());
        }
        self.libraries.insert(name, Arc::new(library));
    }

    pub fn library(&self, name: &str) -> Option<Arc<ResourceLibrary>> {
        self.libraries.get(name).cloned()
    }

    pub fn default_library(&self) -> Option<Arc<ResourceLibrary>> {
        self.default_library.as_deref().and_then(|n| self.library(n))
    }

    pub fn resource_cache(&self) -> &Arc<ResourceCache> {
        &self.resource_cache
    }

    pub fn loader(&self) -> &dyn ModelLoader {
        self.loader.as_ref()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryModelLoader::new()))
    }
}
