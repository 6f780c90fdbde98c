//! Property store: the typed parameter values of one configured action.
//!
//! Readers take an immutable [`PropertySnapshot`]; writers validate through
//! the [`TypeRegistry`] and swap in a new snapshot. Writes are serialised by a
//! dedicated writer lock, so at most one mutation is in flight and readers
//! never observe a half-applied batch.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use phonebot_domain::error::ValidationError;
use phonebot_domain::property::{PropertyDescriptor, PropertyValue, Value};
use phonebot_domain::registry::TypeRegistry;

/// Immutable view of a store at one version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertySnapshot {
    version: u64,
    values: BTreeMap<String, PropertyValue>,
}

impl PropertySnapshot {
    /// Number of mutations committed before this snapshot was taken.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.values.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Plain values keyed by property name.
    #[must_use]
    pub fn to_values(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .map(|(name, pv)| (name.clone(), pv.value().clone()))
            .collect()
    }
}

/// Versioned, copy-on-write store of property values.
#[derive(Debug)]
pub struct PropertyStore {
    registry: Arc<TypeRegistry>,
    descriptors: BTreeMap<String, Arc<PropertyDescriptor>>,
    current: RwLock<Arc<PropertySnapshot>>,
    writer: Mutex<()>,
}

impl PropertyStore {
    /// Create a store for `descriptors`, seeded with their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a declared default does not satisfy
    /// its own descriptor.
    pub fn new(
        registry: Arc<TypeRegistry>,
        descriptors: impl IntoIterator<Item = Arc<PropertyDescriptor>>,
    ) -> Result<Self, ValidationError> {
        Self::seeded(registry, descriptors, std::iter::empty())
    }

    /// Create a store whose version-0 snapshot holds the defaults overlaid
    /// with `initial` raw values.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when an initial value names an unknown
    /// property or fails validation.
    pub fn seeded<'a>(
        registry: Arc<TypeRegistry>,
        descriptors: impl IntoIterator<Item = Arc<PropertyDescriptor>>,
        initial: impl IntoIterator<Item = (&'a str, &'a serde_json::Value)>,
    ) -> Result<Self, ValidationError> {
        let descriptors: BTreeMap<String, Arc<PropertyDescriptor>> = descriptors
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();

        let mut values = BTreeMap::new();
        for descriptor in descriptors.values() {
            if let Some(default) = descriptor.default_value() {
                let pv = registry.validate_value(descriptor, default)?;
                values.insert(descriptor.name().to_string(), pv);
            }
        }

        let store = Self {
            registry,
            descriptors,
            current: RwLock::new(Arc::new(PropertySnapshot::default())),
            writer: Mutex::new(()),
        };
        for (name, raw) in initial {
            let pv = store.validate(name, raw)?;
            values.insert(name.to_string(), pv);
        }
        *store.current.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(PropertySnapshot { version: 0, values });
        Ok(store)
    }

    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.descriptors.get(name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<PropertyDescriptor>> {
        self.descriptors.values()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.snapshot().get(name).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<PropertySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Validate `raw` for property `name` without committing it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownProperty`] for undeclared names, or
    /// the registry's error when the value does not fit the descriptor.
    pub fn validate(
        &self,
        name: &str,
        raw: &serde_json::Value,
    ) -> Result<PropertyValue, ValidationError> {
        let descriptor =
            self.descriptor(name)
                .ok_or_else(|| ValidationError::UnknownProperty {
                    property: name.to_string(),
                })?;
        self.registry.validate(descriptor, raw)
    }

    /// Same as [`validate`](Self::validate) for an already typed value.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn validate_value(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<PropertyValue, ValidationError> {
        self.validate(name, &value.to_json())
    }

    /// Set one property. Returns the new version.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate). A rejected value leaves the store
    /// and its version untouched.
    pub fn set(&self, name: &str, raw: &serde_json::Value) -> Result<u64, ValidationError> {
        self.set_many([(name, raw)])
    }

    /// Set several properties as one mutation. Returns the new version.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid entry; nothing is committed in that case.
    pub fn set_many<'a>(
        &self,
        changes: impl IntoIterator<Item = (&'a str, &'a serde_json::Value)>,
    ) -> Result<u64, ValidationError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let base = self.snapshot();
        let mut values = base.values.clone();
        for (name, raw) in changes {
            let pv = self.validate(name, raw)?;
            values.insert(name.to_string(), pv);
        }

        let next = Arc::new(PropertySnapshot {
            version: base.version + 1,
            values,
        });
        let version = next.version;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(version)
    }
}
