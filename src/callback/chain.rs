use once_cell::sync::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::context::OperationContext;
use crate::error::OrmError;

/// A chain step. Errors are recorded on the context; the chain keeps running.
pub type StepFn = Arc<dyn Fn(&mut OperationContext) -> Result<(), OrmError> + Send + Sync>;

#[derive(Clone)]
pub struct CallbackEntry {
    pub name: String,
    step: StepFn,
    /// Anchors this entry must run before, in the order they were given
    pub before: Vec<String>,
    /// Anchors this entry must run after
    pub after: Vec<String>,
    /// Still runs after a step asked to skip the rest of the chain
    pub always: bool,
}

impl fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("name", &self.name)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("always", &self.always)
            .finish()
    }
}

/// One step of a resolved chain, in execution order.
#[derive(Clone)]
pub struct ResolvedCallback {
    pub name: String,
    pub always: bool,
    step: StepFn,
}

impl ResolvedCallback {
    pub fn call(&self, ctx: &mut OperationContext) -> Result<(), OrmError> {
        (self.step)(ctx)
    }
}

impl fmt::Debug for ResolvedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, if self.always { " (always)" } else { "" })
    }
}

/// Named, reorderable steps of one operation kind.
///
/// Registration order is kept; `before`/`after` constraints may name entries
/// that are registered later. The resolved order is cached until the next mutation.
#[derive(Clone)]
pub struct CallbackChain {
    kind: String,
    entries: Vec<CallbackEntry>,
    resolved: OnceCell<Vec<ResolvedCallback>>,
}

impl CallbackChain {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), entries: vec![], resolved: OnceCell::new() }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Register `name` at the end of the chain, or swap its step in place if it already exists.
    pub fn register<F>(&mut self, name: impl Into<String>, step: F) -> &mut Self
    where
        F: Fn(&mut OperationContext) -> Result<(), OrmError> + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(step), vec![], vec![], false);
        self
    }

    /// Start a registration that must run before `anchor`.
    pub fn before(&mut self, anchor: impl Into<String>) -> ChainBuilder<'_> {
        ChainBuilder::new(self).before(anchor)
    }

    /// Start a registration that must run after `anchor`.
    pub fn after(&mut self, anchor: impl Into<String>) -> ChainBuilder<'_> {
        ChainBuilder::new(self).after(anchor)
    }

    /// Start a registration that is exempt from skip-remaining.
    pub fn always(&mut self) -> ChainBuilder<'_> {
        ChainBuilder::new(self).always()
    }

    /// Swap the step of an existing entry, keeping position and constraints.
    /// Replacing an unknown name does nothing.
    pub fn replace<F>(&mut self, name: &str, step: F) -> &mut Self
    where
        F: Fn(&mut OperationContext) -> Result<(), OrmError> + Send + Sync + 'static,
    {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.step = Arc::new(step);
                self.resolved = OnceCell::new();
                tracing::debug!("Replaced callback '{}' in {} chain", name, self.kind);
            }
            None => tracing::warn!("Cannot replace unknown callback '{}' in {} chain", name, self.kind),
        }
        self
    }

    /// Delete `name` and every constraint that refers to it.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        if self.entries.len() == before {
            tracing::debug!("Callback '{}' not present in {} chain", name, self.kind);
            return self;
        }
        for entry in &mut self.entries {
            entry.before.retain(|anchor| anchor != name);
            entry.after.retain(|anchor| anchor != name);
        }
        self.resolved = OnceCell::new();
        tracing::debug!("Removed callback '{}' from {} chain", name, self.kind);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn entry(&self, name: &str) -> Option<&CallbackEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entry names in registration order
    pub fn registered_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Execution order honouring every constraint whose anchor exists.
    ///
    /// Fails with [`OrmError::CallbackCycle`] when the constraints cannot all hold.
    pub fn resolve(&self) -> Result<&[ResolvedCallback], OrmError> {
        self.resolved.get_or_try_init(|| self.sort()).map(Vec::as_slice)
    }

    /// Resolved names, for inspection and tests.
    pub fn resolved_names(&self) -> Result<Vec<String>, OrmError> {
        Ok(self.resolve()?.iter().map(|c| c.name.clone()).collect())
    }

    fn insert(&mut self, name: String, step: StepFn, before: Vec<String>, after: Vec<String>, always: bool) {
        self.resolved = OnceCell::new();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.step = step;
            entry.always |= always;
            for anchor in before {
                if !entry.before.contains(&anchor) {
                    entry.before.push(anchor);
                }
            }
            for anchor in after {
                if !entry.after.contains(&anchor) {
                    entry.after.push(anchor);
                }
            }
            tracing::debug!("Re-registered callback '{}' in {} chain", name, self.kind);
            return;
        }

        tracing::debug!(
            "Registered callback '{}' in {} chain (before: {:?}, after: {:?})",
            name,
            self.kind,
            before,
            after
        );
        self.entries.push(CallbackEntry { name, step, before, after, always });
    }

    /// Stable Kahn sort.
    ///
    /// Each entry gets a path key: its registration index, or for a constrained
    /// entry its anchor's key extended with `-1` (before) / `1` (after) and its own
    /// index. Ready entries are emitted smallest key first, so an entry lands
    /// right next to its anchor and unconstrained entries keep registration order.
    fn sort(&self) -> Result<Vec<ResolvedCallback>, OrmError> {
        let count = self.entries.len();
        let index: HashMap<&str, usize> =
            self.entries.iter().enumerate().map(|(i, e)| (e.name.as_str(), i)).collect();

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
        for (i, entry) in self.entries.iter().enumerate() {
            for anchor in &entry.before {
                if let Some(&j) = index.get(anchor.as_str()) {
                    if j != i {
                        successors[i].insert(j);
                    }
                }
            }
            for anchor in &entry.after {
                if let Some(&j) = index.get(anchor.as_str()) {
                    if j != i {
                        successors[j].insert(i);
                    }
                }
            }
        }

        let mut in_degree = vec![0usize; count];
        for targets in &successors {
            for &j in targets {
                in_degree[j] += 1;
            }
        }

        let keys: Vec<Vec<i64>> = (0..count)
            .map(|i| {
                let mut key = self.path_key(i, &index, &mut vec![]);
                key.push(0);
                key
            })
            .collect();

        let mut ready: BTreeSet<(&[i64], usize)> = BTreeSet::new();
        for i in 0..count {
            if in_degree[i] == 0 {
                ready.insert((keys[i].as_slice(), i));
            }
        }

        let mut order = Vec::with_capacity(count);
        while let Some(next) = ready.pop_first() {
            let (_, i) = next;
            order.push(i);
            for &j in &successors[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert((keys[j].as_slice(), j));
                }
            }
        }

        if order.len() < count {
            let names = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.entries[i].name.clone())
                .collect();
            return Err(OrmError::CallbackCycle { chain: self.kind.clone(), names });
        }

        let resolved: Vec<ResolvedCallback> = order
            .into_iter()
            .map(|i| {
                let entry = &self.entries[i];
                ResolvedCallback { name: entry.name.clone(), always: entry.always, step: entry.step.clone() }
            })
            .collect();
        tracing::debug!("Resolved {} chain: {:?}", self.kind, resolved);
        Ok(resolved)
    }

    fn path_key(&self, i: usize, index: &HashMap<&str, usize>, visiting: &mut Vec<usize>) -> Vec<i64> {
        let own = i as i64;
        visiting.push(i);
        let entry = &self.entries[i];
        let usable = |anchor: &String| index.get(anchor.as_str()).copied().filter(|j| !visiting.contains(j));

        let anchored = if let Some(j) = entry.before.iter().find_map(usable) {
            Some((j, -1))
        } else {
            entry.after.iter().find_map(usable).map(|j| (j, 1))
        };

        let key = match anchored {
            Some((j, side)) => {
                let mut key = self.path_key(j, index, visiting);
                key.push(side);
                key.push(own);
                key
            }
            None => vec![own],
        };
        visiting.pop();
        key
    }
}

impl fmt::Debug for CallbackChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackChain").field("kind", &self.kind).field("entries", &self.entries).finish()
    }
}

/// Collects ordering constraints for one registration.
pub struct ChainBuilder<'a> {
    chain: &'a mut CallbackChain,
    before: Vec<String>,
    after: Vec<String>,
    always: bool,
}

impl<'a> ChainBuilder<'a> {
    fn new(chain: &'a mut CallbackChain) -> Self {
        Self { chain, before: vec![], after: vec![], always: false }
    }

    #[must_use]
    pub fn before(mut self, anchor: impl Into<String>) -> Self {
        self.before.push(anchor.into());
        self
    }

    #[must_use]
    pub fn after(mut self, anchor: impl Into<String>) -> Self {
        self.after.push(anchor.into());
        self
    }

    #[must_use]
    pub fn always(mut self) -> Self {
        self.always = true;
        self
    }

    pub fn register<F>(self, name: impl Into<String>, step: F) -> &'a mut CallbackChain
    where
        F: Fn(&mut OperationContext) -> Result<(), OrmError> + Send + Sync + 'static,
    {
        let ChainBuilder { chain, before, after, always } = self;
        chain.insert(name.into(), Arc::new(step), before, after, always);
        chain
    }
}
