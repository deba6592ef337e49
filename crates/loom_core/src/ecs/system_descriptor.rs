use crate::ecs::{ComponentId, HookSet};

/// Metadata describing which lifecycle hooks a system implements and which
/// components it wants membership notifications for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemDescriptor {
    name: String,
    hooks: HookSet,
    watches: Vec<ComponentId>,
}

impl SystemDescriptor {
    /// Create a new descriptor with the provided name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: HookSet::NONE,
            watches: Vec::new(),
        }
    }

    /// Replace the declared hook set.
    pub fn with_hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }

    /// Restrict component notifications to `components`. Without a watch list
    /// the system hears about every component.
    pub fn watching<I>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = ComponentId>,
    {
        self.watches = Self::sanitize(components);
        self
    }

    /// Append a single watched component.
    pub fn add_watch(&mut self, component: ComponentId) {
        self.watches.push(component);
        self.watches = Self::sanitize(std::mem::take(&mut self.watches));
    }

    /// Unique system name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks(&self) -> HookSet {
        self.hooks
    }

    pub fn declares(&self, hook: HookSet) -> bool {
        self.hooks.contains(hook)
    }

    /// Explicit watch list; empty means "all components".
    pub fn watched_components(&self) -> &[ComponentId] {
        &self.watches
    }

    pub fn watches(&self, component: ComponentId) -> bool {
        self.watches.is_empty() || self.watches.binary_search(&component).is_ok()
    }

    /// Whether the descriptor declares no hooks at all.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn sanitize<I>(components: I) -> Vec<ComponentId>
    where
        I: IntoIterator<Item = ComponentId>,
    {
        let mut list: Vec<_> = components.into_iter().collect();
        list.sort_unstable();
        list.dedup();
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_list_is_sorted_and_deduped() {
        let mut descriptor = SystemDescriptor::new("scoring").watching([3, 1, 3]);
        descriptor.add_watch(2);
        descriptor.add_watch(1);
        assert_eq!(descriptor.watched_components(), &[1, 2, 3]);
        assert!(descriptor.watches(2));
        assert!(!descriptor.watches(9));
    }

    #[test]
    fn test_empty_watch_list_means_everything() {
        let descriptor =
            SystemDescriptor::new("observer").with_hooks(HookSet::COMPONENT_ADDED);
        assert!(descriptor.watches(42));
        assert!(descriptor.declares(HookSet::COMPONENT_ADDED));
        assert!(!descriptor.declares(HookSet::UPDATE));
        assert!(!descriptor.is_empty());
        assert!(SystemDescriptor::new("idle").is_empty());
    }
}
