//! Process-wide registry of descriptor pools.
//!
//! Lets a host resolve message and enum types by full name without threading
//! a pool through every call site. Pools registered later shadow earlier
//! ones for the same type name.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;

use crate::descriptor::{DescriptorPool, EnumDescriptor, MessageDescriptor};

/// Registry of type names to the pool that defines them.
pub struct TypeRegistry {
    messages: HashMap<String, MessageDescriptor>,
    enums: HashMap<String, EnumDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
            enums: HashMap::new(),
        }
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<TypeRegistry> {
        static REGISTRY: LazyLock<RwLock<TypeRegistry>> =
            LazyLock::new(|| RwLock::new(TypeRegistry::new()));
        &REGISTRY
    }

    /// Index every type of `pool`, returning how many names were added.
    pub fn register(&mut self, pool: &DescriptorPool) -> usize {
        let mut added = 0;
        for desc in pool.messages() {
            if self
                .messages
                .insert(desc.full_name().to_string(), desc)
                .is_none()
            {
                added += 1;
            }
        }
        for desc in pool.enums() {
            if self.enums.insert(desc.full_name().to_string(), desc).is_none() {
                added += 1;
            }
        }
        added
    }

    pub fn message(&self, full_name: &str) -> Option<MessageDescriptor> {
        self.messages
            .get(full_name.trim_start_matches('.'))
            .cloned()
    }

    pub fn enumeration(&self, full_name: &str) -> Option<EnumDescriptor> {
        self.enums.get(full_name.trim_start_matches('.')).cloned()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        let name = full_name.trim_start_matches('.');
        self.messages.contains_key(name) || self.enums.contains_key(name)
    }

    /// List all registered message type names.
    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len() + self.enums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.enums.clear();
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Convenience functions for working with the global registry

/// Register every type of `pool` in the global registry.
pub fn register_pool(pool: &DescriptorPool) -> usize {
    let added = TypeRegistry::global().write().register(pool);
    tracing::debug!("[REG] Registered {} new type names", added);
    added
}

/// Find a message type in the global registry.
pub fn find_message(full_name: &str) -> Option<MessageDescriptor> {
    TypeRegistry::global().read().message(full_name)
}

/// Find an enum type in the global registry.
pub fn find_enum(full_name: &str) -> Option<EnumDescriptor> {
    TypeRegistry::global().read().enumeration(full_name)
}
