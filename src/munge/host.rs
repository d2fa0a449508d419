use crate::jvm::{BinaryName, ClassAccessFlags, ClassModel, ConfigError, Error, Name};
use crate::session::Session;

/// Where the generated code for a class goes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostDecision {
    /// In the class itself
    Direct,

    /// In a modifiable subclass of the class
    Surrogate(BinaryName),

    /// In the catch-all adapter class
    Adapter(BinaryName),
}

impl HostDecision {
    /// Is the generated code in the class it works on (so it can use `this`)?
    pub fn is_direct(&self) -> bool {
        matches!(self, HostDecision::Direct)
    }
}

impl Session {
    /// Note a class that has a mapping
    ///
    /// The first modifiable class noted picks the package (and root directory) of the adapter,
    /// unless the settings override it.
    pub fn note_bound_class(&self, class: &ClassModel) -> Result<(), Error> {
        self.munge
            .touched
            .borrow_mut()
            .insert(class.name().as_str().to_owned());
        if !class.is_modifiable() {
            return Ok(());
        }
        self.index_generated_methods(class)?;

        let mut first_bound = self.munge.first_bound.borrow_mut();
        if first_bound.is_none() {
            if let Some(root) = class.root() {
                *first_bound = Some((class.package().to_owned(), root.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Decide where the generated code for `target` goes
    ///
    /// `context` is the class that wants to use the code, if any: when it is a modifiable
    /// subclass of the target, it can host code that the target can't.
    pub fn resolve_host(
        &self,
        target: &ClassModel,
        context: Option<&ClassModel>,
    ) -> Result<HostDecision, Error> {
        let key = (
            target.name().as_str().to_owned(),
            context.map(|class| class.name().as_str().to_owned()),
        );
        if let Some(decision) = self.munge.hosts.borrow().get(&key) {
            return Ok(decision.clone());
        }

        let decision = if target.is_modifiable() && !target.is_interface() {
            HostDecision::Direct
        } else {
            match context {
                Some(context)
                    if context.is_modifiable()
                        && !context.is_interface()
                        && self
                            .registry()
                            .is_superclass_of(target.name().as_str(), context.name().as_str())? =>
                {
                    HostDecision::Surrogate(context.name().clone())
                }
                _ => HostDecision::Adapter(self.adapter()?.name().clone()),
            }
        };
        log::debug!("Code for {} hosted as {:?}", target.name(), decision);
        self.munge.hosts.borrow_mut().insert(key, decision.clone());
        Ok(decision)
    }

    /// Class holding the code for `target`, following a hosting decision
    pub fn host_class<'s>(
        &'s self,
        target: &'s ClassModel,
        decision: &HostDecision,
    ) -> Result<&'s ClassModel, Error> {
        match decision {
            HostDecision::Direct => Ok(target),
            HostDecision::Surrogate(name) | HostDecision::Adapter(name) => {
                self.registry().require_class(name.as_str())
            }
        }
    }

    /// Name of the adapter class, if its package can be decided yet
    fn adapter_name(&self) -> Result<Option<BinaryName>, Error> {
        let settings = self.settings();
        let package = match (&settings.adapter_package, &*self.munge.first_bound.borrow()) {
            (Some(package), _) => package.trim_end_matches('/').to_owned(),
            (None, Some((package, _))) => package.clone(),
            (None, None) => return Ok(None),
        };
        let name = if package.is_empty() {
            settings.adapter_class_name.clone()
        } else {
            format!("{}/{}", package, settings.adapter_class_name)
        };
        BinaryName::from_string(name)
            .map(Some)
            .map_err(|err| ConfigError::MalformedName(err).into())
    }

    /// The catch-all adapter class, created the first time it is needed
    ///
    /// An adapter left on a writable root by an earlier run is reused.
    pub fn adapter(&self) -> Result<&ClassModel, Error> {
        if let Some(name) = self.munge.adapter.borrow().as_ref() {
            return self.registry().require_class(name.as_str());
        }

        let name = self.adapter_name()?.ok_or(ConfigError::NoAdapterPackage)?;
        let adapter = match self.registry().lookup_class(name.as_str())? {
            Some(existing) => {
                if !existing.is_modifiable() {
                    return Err(ConfigError::Unmodifiable(name.as_str().to_owned()).into());
                }
                log::info!("Reusing adapter class {}", name);
                existing
            }
            None => {
                let settings = self.settings();
                let root = self
                    .munge
                    .first_bound
                    .borrow()
                    .as_ref()
                    .map(|(_, root)| root.clone())
                    .or_else(|| settings.search_paths.first().cloned())
                    .ok_or(ConfigError::NoAdapterPackage)?;
                log::info!("Creating adapter class {}", name);
                let model = ClassModel::synthetic(
                    name.clone(),
                    BinaryName::OBJECT,
                    ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT | ClassAccessFlags::SUPER,
                    settings.generated_version,
                    root,
                )?;
                self.registry().add_class(model)?
            }
        };
        self.claim_adapter(adapter)?;
        Ok(adapter)
    }

    /// Pick up an adapter class left by an earlier run, even if this run never needed it
    ///
    /// Its stale methods then get purged like any others, and once empty it gets deleted.
    pub fn adopt_stale_adapter(&self) -> Result<(), Error> {
        if self.munge.adapter.borrow().is_some() {
            return Ok(());
        }
        let name = match self.adapter_name()? {
            Some(name) => name,
            None => return Ok(()),
        };
        if let Some(existing) = self.registry().lookup_class(name.as_str())? {
            if existing.is_modifiable() {
                log::debug!("Found adapter class {} from an earlier run", name);
                self.claim_adapter(existing)?;
            }
        }
        Ok(())
    }

    fn claim_adapter(&self, adapter: &ClassModel) -> Result<(), Error> {
        self.index_generated_methods(adapter)?;
        self.munge
            .touched
            .borrow_mut()
            .insert(adapter.name().as_str().to_owned());
        *self.munge.adapter.borrow_mut() = Some(adapter.name().clone());
        Ok(())
    }
}
