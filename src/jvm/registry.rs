use super::class_file::{Attribute, ClassFile};
use super::{
    java_lib, BaseType, BinaryName, ClassModel, ClassOrigin, ConfigError, Error, FieldAccessFlags,
    FieldType, InternalErrorKind, MemberItem, MemberType, MethodAccessFlags, Name,
    RenderDescriptor, SignatureCache, UnqualifiedName,
};
use crate::settings::Settings;
use elsa::map::FrozenMap;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Every class the weaver has looked at during a run
///
/// Classes are loaded lazily on first lookup and then cached by name for the rest of the run.
/// The cache only ever grows, so class references handed out stay valid as long as the registry
/// does. Throwing the registry away (see `Session::reset`) is the only way to forget a class.
pub struct ClassRegistry {
    settings: Settings,
    classes: FrozenMap<String, Box<ClassModel>>,

    /// Names which were looked up and not found anywhere
    missing: RefCell<HashSet<String>>,

    /// Classes whose superclass chain is still being resolved
    loading: RefCell<HashSet<String>>,
    preserve: RefCell<HashSet<String>>,
    modified: RefCell<BTreeSet<String>>,

    /// Classes created during the run (which have no file yet)
    pending: RefCell<BTreeSet<String>>,
    writable_roots: RefCell<HashMap<PathBuf, bool>>,
    signatures: SignatureCache,
}

impl ClassRegistry {
    pub fn new(settings: Settings) -> ClassRegistry {
        let preserve = settings
            .preserve
            .iter()
            .map(|name| name.as_str().to_owned())
            .collect();
        ClassRegistry {
            settings,
            classes: FrozenMap::new(),
            missing: RefCell::new(HashSet::new()),
            loading: RefCell::new(HashSet::new()),
            preserve: RefCell::new(preserve),
            modified: RefCell::new(BTreeSet::new()),
            pending: RefCell::new(BTreeSet::new()),
            writable_roots: RefCell::new(HashMap::new()),
            signatures: SignatureCache::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn signatures(&self) -> &SignatureCache {
        &self.signatures
    }

    /// Find a class by binary name, loading it (and its superclass chain) if needed
    ///
    /// Primitive names (`int`) and array descriptors (`[I`) get placeholder classes. Otherwise
    /// the writable search paths are tried first, then the read-only classpath, then the built-in
    /// library declarations.
    pub fn lookup_class(&self, name: &str) -> Result<Option<&ClassModel>, Error> {
        if let Some(class) = self.classes.get(name) {
            return Ok(Some(class));
        }
        if self.missing.borrow().contains(name) {
            return Ok(None);
        }

        let model = if name.starts_with('[') || BaseType::from_keyword(name).is_some() {
            Some(ClassModel::placeholder(name))
        } else {
            BinaryName::check_valid(name).map_err(ConfigError::MalformedName)?;
            match self.load_from_roots(name)? {
                Some(model) => Some(model),
                None => java_lib::builtin_class(name, &self.signatures)?,
            }
        };

        match model {
            None => {
                log::trace!("Class {} not found", name);
                self.missing.borrow_mut().insert(name.to_owned());
                Ok(None)
            }
            Some(model) => {
                log::trace!("Loaded {:?}", model);
                if !self.loading.borrow_mut().insert(name.to_owned()) {
                    return Err(Error::ClassFormat {
                        class: name.to_owned(),
                        message: String::from("class is its own superclass"),
                    });
                }
                let linked = self.link_superclass(&model);
                self.loading.borrow_mut().remove(name);
                linked?;
                Ok(Some(self.classes.insert(name.to_owned(), Box::new(model))))
            }
        }
    }

    /// Find a class, treating its absence as a configuration error
    pub fn require_class(&self, name: &str) -> Result<&ClassModel, Error> {
        self.lookup_class(name)?
            .ok_or_else(|| ConfigError::MissingClass(name.to_owned()).into())
    }

    fn link_superclass(&self, class: &ClassModel) -> Result<(), Error> {
        if let Some(superclass) = class.superclass_name() {
            if self.lookup_class(superclass.as_str())?.is_none() {
                return Err(ConfigError::MissingSuperclass {
                    class: class.name().as_str().to_owned(),
                    superclass: superclass.as_str().to_owned(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn load_from_roots(&self, name: &str) -> Result<Option<ClassModel>, Error> {
        let writable = self.settings.search_paths.iter().map(|root| (root, true));
        let read_only = self.settings.classpath.iter().map(|root| (root, false));

        for (root, writable) in writable.chain(read_only) {
            let path = root.join(format!("{}.class", name));
            if !path.is_file() {
                continue;
            }

            let bytes = fs::read(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            let class_format = |message: String| Error::ClassFormat {
                class: name.to_owned(),
                message,
            };
            let class_file = ClassFile::parse(&bytes).map_err(|err| class_format(err.to_string()))?;
            match class_file.class_name() {
                Some(declared) if declared == name => (),
                declared => {
                    let msg = format!("{} declares class {:?}", path.display(), declared);
                    return Err(class_format(msg));
                }
            }

            let modifiable = writable
                && self.is_writable_root(root)
                && !is_read_only_file(&path)
                && !self.is_preserved(name)
                && class_file.version.major_version < self.settings.extension_cutover;
            if writable && !modifiable {
                log::debug!("{} (version {}) is not modifiable", name, class_file.version);
            }

            let origin = ClassOrigin::File {
                root: root.clone(),
                path,
            };
            return ClassModel::from_class_file(class_file, origin, modifiable, &self.signatures)
                .map(Some)
                .map_err(class_format);
        }
        Ok(None)
    }

    fn is_writable_root(&self, root: &Path) -> bool {
        if let Some(writable) = self.writable_roots.borrow().get(root) {
            return *writable;
        }
        let writable = fs::metadata(root)
            .map(|metadata| metadata.is_dir() && !metadata.permissions().readonly())
            .unwrap_or(false);
        self.writable_roots
            .borrow_mut()
            .insert(root.to_path_buf(), writable);
        writable
    }

    pub fn is_preserved(&self, name: &str) -> bool {
        self.preserve.borrow().contains(name)
    }

    /// Keep a class from being modified
    ///
    /// Errors if the class has already been changed.
    pub fn preserve(&self, name: &str) -> Result<(), Error> {
        if let Some(class) = self.classes.get(name) {
            self.freeze_unmodifiable(class)?;
        }
        self.preserve.borrow_mut().insert(name.to_owned());
        Ok(())
    }

    /// Mark a class as unmodifiable for the rest of the run
    pub fn freeze_unmodifiable(&self, class: &ClassModel) -> Result<(), Error> {
        if class.is_modified() {
            let err = Error::internal(InternalErrorKind::FrozenAfterChange);
            return Err(err.in_method(class.name().as_str(), "-"));
        }
        class.set_modifiable(false);
        Ok(())
    }

    /// Names of the class, all its ancestors, and all the interfaces any of those implement
    pub fn instance_of<'a>(&'a self, class: &'a ClassModel) -> Result<&'a BTreeSet<String>, Error> {
        if let Some(names) = class.instance_of.get() {
            return Ok(names);
        }

        let mut names = BTreeSet::new();
        let mut to_visit: Vec<&ClassModel> = vec![class];
        while let Some(next) = to_visit.pop() {
            if !names.insert(next.name().as_str().to_owned()) {
                continue;
            }
            if let Some(superclass) = next.superclass_name() {
                to_visit.push(self.require_class(superclass.as_str())?);
            }
            for interface in next.interface_names() {
                to_visit.push(self.require_class(interface.as_str())?);
            }
        }

        Ok(class.instance_of.get_or_init(|| names))
    }

    /// Is `class` the same as, a subclass of, or an implementation of `target`?
    pub fn is_instance_of(&self, class: &str, target: &str) -> Result<bool, Error> {
        let class = self.require_class(class)?;
        Ok(self.instance_of(class)?.contains(target))
    }

    /// Is `ancestor` a strict superclass of `class`?
    pub fn is_superclass_of(&self, ancestor: &str, class: &str) -> Result<bool, Error> {
        let mut current = self.require_class(class)?;
        while let Some(superclass) = current.superclass_name() {
            if superclass.as_str() == ancestor {
                return Ok(true);
            }
            current = self.require_class(superclass.as_str())?;
        }
        Ok(false)
    }

    /// Number of superclasses above the class (`java/lang/Object` has depth 0)
    pub fn inheritance_depth(&self, class: &ClassModel) -> Result<usize, Error> {
        let mut depth = 0;
        let mut current = class;
        while let Some(superclass) = current.superclass_name() {
            depth += 1;
            current = self.require_class(superclass.as_str())?;
        }
        Ok(depth)
    }

    /// Record that a class is being changed
    pub fn mark_modified(&self, class: &ClassModel) -> Result<(), Error> {
        if !class.is_modifiable() {
            return Err(ConfigError::Unmodifiable(class.name().as_str().to_owned()).into());
        }
        class.touch();
        if self.modified.borrow_mut().insert(class.name().as_str().to_owned()) {
            log::debug!("Modifying {}", class.name());
        }
        Ok(())
    }

    /// Add a new field to a class
    pub fn add_field<'a>(
        &self,
        class: &'a ClassModel,
        name: UnqualifiedName,
        field_type: FieldType<BinaryName>,
        access_flags: FieldAccessFlags,
    ) -> Result<&'a MemberItem, Error> {
        if class.declared_field(name.as_str()).is_some() {
            return Err(ConfigError::DuplicateField {
                class: class.name().as_str().to_owned(),
                field: name.as_str().to_owned(),
            }
            .into());
        }
        self.mark_modified(class)?;

        let descriptor = field_type.render();
        let pool_indices = {
            let mut constants = class.constants_mut();
            (
                constants.get_utf8(name.as_str())?,
                constants.get_utf8(&descriptor)?,
            )
        };
        Ok(class.push_field(MemberItem::new(
            class.name().clone(),
            name,
            descriptor,
            MemberType::Field(field_type),
            access_flags.bits(),
            vec![],
            vec![],
            Some(pool_indices),
        )))
    }

    /// Add a new method to a class
    ///
    /// The attributes must already be encoded against the constant pool of the class.
    pub fn add_method<'a>(
        &self,
        class: &'a ClassModel,
        name: UnqualifiedName,
        descriptor: &str,
        access_flags: MethodAccessFlags,
        exceptions: Vec<BinaryName>,
        attributes: Vec<Attribute>,
    ) -> Result<&'a MemberItem, Error> {
        if class.declared_method(name.as_str(), descriptor).is_some() {
            return Err(ConfigError::DuplicateMethod {
                class: class.name().as_str().to_owned(),
                method: format!("{}{}", name, descriptor),
            }
            .into());
        }
        let method_type = self
            .signatures
            .method(descriptor)
            .map_err(|err| Error::internal(InternalErrorKind::BadDescriptor(err.to_string())))?
            .clone();
        self.mark_modified(class)?;

        let pool_indices = {
            let mut constants = class.constants_mut();
            (
                constants.get_utf8(name.as_str())?,
                constants.get_utf8(descriptor)?,
            )
        };
        Ok(class.push_method(MemberItem::new(
            class.name().clone(),
            name,
            descriptor.to_owned(),
            MemberType::Method(method_type),
            access_flags.bits(),
            exceptions,
            attributes,
            Some(pool_indices),
        )))
    }

    /// Delete a field declared in a class, returning whether there was one
    pub fn delete_field(&self, class: &ClassModel, name: &str) -> Result<bool, Error> {
        match class.declared_field(name) {
            None => Ok(false),
            Some(field) => {
                self.mark_modified(class)?;
                field.mark_deleted();
                Ok(true)
            }
        }
    }

    /// Delete a method declared in a class, returning whether there was one
    pub fn delete_method(&self, class: &ClassModel, name: &str, descriptor: &str) -> Result<bool, Error> {
        match class.declared_method(name, descriptor) {
            None => Ok(false),
            Some(method) => {
                self.mark_modified(class)?;
                log::debug!("Deleting {}", method);
                method.mark_deleted();
                Ok(true)
            }
        }
    }

    /// Register a class created during the run
    pub fn add_class(&self, model: ClassModel) -> Result<&ClassModel, Error> {
        let name = model.name().as_str().to_owned();
        if self.classes.get(&name).is_some() {
            return Err(ConfigError::DuplicateClass(name).into());
        }
        if !model.is_modifiable() {
            return Err(ConfigError::Unmodifiable(name).into());
        }
        self.link_superclass(&model)?;
        self.missing.borrow_mut().remove(&name);
        let class = self.classes.insert(name.clone(), Box::new(model));
        self.mark_modified(class)?;
        self.pending.borrow_mut().insert(name);
        Ok(class)
    }

    /// Drop a class created during the run, so it never gets written
    pub fn discard_class(&self, name: &str) {
        self.pending.borrow_mut().remove(name);
        self.modified.borrow_mut().remove(name);
    }

    /// Was the class created during this run (and not discarded)?
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.borrow().contains(name)
    }

    /// Every class changed during the run, sorted by name
    pub fn modified_classes(&self) -> Vec<&ClassModel> {
        self.modified
            .borrow()
            .iter()
            .filter_map(|name| self.classes.get(name.as_str()))
            .collect()
    }
}

fn is_read_only_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.permissions().readonly())
        .unwrap_or(true)
}
