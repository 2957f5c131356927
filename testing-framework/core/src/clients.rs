use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::network::FabricClient;

/// Client handles of one connector context, keyed by wallet alias.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn FabricClient>>>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, alias: impl Into<String>, client: Arc<dyn FabricClient>) {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(alias.into(), client);
    }

    #[must_use]
    pub fn get(&self, alias: &str) -> Option<Arc<dyn FabricClient>> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(alias)
            .cloned()
    }

    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        aliases.sort();
        aliases
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the registry and returns the handles that were in it.
    pub fn drain(&self) -> Vec<Arc<dyn FabricClient>> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .map(|(_, client)| client)
            .collect()
    }
}
