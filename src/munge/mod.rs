//! Deciding where generated code lives, and sharing identical generated methods
//!
//! Generated methods are hosted in the bound class when possible. When it isn't (the class can't
//! be modified or is an interface), they go in a modifiable subclass, or failing that in a single
//! catch-all adapter class. Each host keeps a map from method keys to generated methods, so
//! generating byte-identical code twice yields one method. Generated methods from earlier runs
//! that nothing asks for again get deleted at the end.

mod dedup;
mod disposition;
mod host;
mod verify;

pub use disposition::Dispositions;
pub use host::HostDecision;

use crate::jvm::code::MethodKey;
use crate::jvm::{BinaryName, Name, UnqualifiedName};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

/// Generated method known to a host class
#[derive(Debug)]
struct GeneratedMethod {
    name: UnqualifiedName,
    descriptor: String,

    /// Asked for during this run
    used: bool,

    /// Already in the class when it was first munged
    existing: bool,
    deleted: bool,
}

/// Generated methods of one host class
#[derive(Debug, Default)]
struct MungedClass {
    methods: Vec<GeneratedMethod>,
    by_key: HashMap<MethodKey, usize>,
}

impl MungedClass {
    fn insert(&mut self, key: MethodKey, method: GeneratedMethod) {
        let live = match self.by_key.get(&key) {
            Some(&idx) => !self.methods[idx].deleted,
            None => false,
        };
        if !live {
            self.by_key.insert(key, self.methods.len());
        }
        self.methods.push(method);
    }

    /// Find a live method with the same key, marking it as used
    fn take(&mut self, key: &MethodKey) -> Option<(UnqualifiedName, String)> {
        let method = self.methods.get_mut(*self.by_key.get(key)?)?;
        if method.deleted {
            return None;
        }
        method.used = true;
        Some((method.name.clone(), method.descriptor.clone()))
    }

    /// Generated method from an earlier run which hasn't been asked for so far
    fn obsolete(&mut self, name: &str, descriptor: &str) -> Option<&mut GeneratedMethod> {
        self.methods.iter_mut().find(|method| {
            method.existing
                && !method.used
                && !method.deleted
                && method.name.as_str() == name
                && method.descriptor == descriptor
        })
    }
}

/// Munging state of a session
#[derive(Default)]
pub(crate) struct MungeState {
    /// Generated methods, by host class name
    classes: RefCell<BTreeMap<String, MungedClass>>,

    /// Hosting decisions, by target and context class names
    hosts: RefCell<HashMap<(String, Option<String>), HostDecision>>,

    /// Name of the adapter class, once there is one
    adapter: RefCell<Option<BinaryName>>,

    /// Package and root of the first modifiable class bound
    first_bound: RefCell<Option<(String, PathBuf)>>,

    /// Every class munging has touched (hosts and targets)
    touched: RefCell<BTreeSet<String>>,
}
