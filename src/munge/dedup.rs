use super::{GeneratedMethod, MungedClass};
use crate::jvm::code::{MethodAssembler, MethodKey};
use crate::jvm::{ClassModel, Error, MemberItem, Name, UnqualifiedName};
use crate::session::Session;

impl Session {
    /// Add a generated method to its class, unless an identical method is already there
    ///
    /// Identical means same `MethodKey`: the name doesn't matter, so the method returned may have
    /// a different name than the one asked for. With `rename`, a new method's name is suffixed
    /// with the inheritance depth of its class, so methods generated for a class and its
    /// subclasses don't override each other.
    pub fn get_unique_method<'s>(
        &'s self,
        assembler: MethodAssembler<'s>,
        rename: bool,
    ) -> Result<&'s MemberItem, Error> {
        let mut method = assembler.complete()?;
        let class = method.class();
        self.index_generated_methods(class)?;
        self.munge
            .touched
            .borrow_mut()
            .insert(class.name().as_str().to_owned());

        let existing = self
            .munge
            .classes
            .borrow_mut()
            .get_mut(class.name().as_str())
            .and_then(|munged| munged.take(method.key()));
        if let Some((name, descriptor)) = existing {
            if let Some(existing) = class.declared_method(name.as_str(), &descriptor) {
                log::debug!("Sharing {} in place of {}", existing, method.name());
                return Ok(existing);
            }
        }

        let mut name = method.name().clone();
        if rename {
            let depth = self.registry().inheritance_depth(class)?;
            name = name.with_suffix(depth);
        }
        let name = self.free_method_name(class, name, method.descriptor())?;
        method.set_name(name.clone());

        let key = method.key().clone();
        let descriptor = method.descriptor().to_owned();
        let added = method.add_to_class()?;
        log::debug!("Added {}", added);

        let mut classes = self.munge.classes.borrow_mut();
        let munged = classes
            .entry(class.name().as_str().to_owned())
            .or_insert_with(MungedClass::default);
        munged.insert(
            key,
            GeneratedMethod {
                name,
                descriptor,
                used: true,
                existing: false,
                deleted: false,
            },
        );
        Ok(added)
    }

    /// Pick a name for a new method which won't collide with anything live
    ///
    /// An obsolete generated method in the way gets deleted. Otherwise, the name gets a numeric
    /// suffix.
    fn free_method_name(
        &self,
        class: &ClassModel,
        name: UnqualifiedName,
        descriptor: &str,
    ) -> Result<UnqualifiedName, Error> {
        let mut candidate = name.clone();
        let mut suffix = 0;
        loop {
            if class.declared_method(candidate.as_str(), descriptor).is_none() {
                return Ok(candidate);
            }

            let obsolete = {
                let mut classes = self.munge.classes.borrow_mut();
                match classes
                    .get_mut(class.name().as_str())
                    .and_then(|munged| munged.obsolete(candidate.as_str(), descriptor))
                {
                    Some(method) => {
                        method.deleted = true;
                        true
                    }
                    None => false,
                }
            };
            if obsolete {
                self.registry()
                    .delete_method(class, candidate.as_str(), descriptor)?;
                return Ok(candidate);
            }

            suffix += 1;
            candidate = name.with_suffix(suffix);
        }
    }

    /// Index the generated methods a class already has, the first time it is munged
    pub(crate) fn index_generated_methods(&self, class: &ClassModel) -> Result<(), Error> {
        let name = class.name().as_str();
        if self.munge.classes.borrow().contains_key(name) {
            return Ok(());
        }

        let prefix = &self.settings().method_prefix;
        let mut munged = MungedClass::default();
        for method in class.methods() {
            if !method.name().as_str().starts_with(prefix.as_str()) {
                continue;
            }
            if let Some(key) = MethodKey::of_member(class, method) {
                munged.insert(
                    key,
                    GeneratedMethod {
                        name: method.name().clone(),
                        descriptor: method.descriptor().to_owned(),
                        used: false,
                        existing: true,
                        deleted: false,
                    },
                );
            }
        }
        log::trace!(
            "{} has {} generated method(s) from earlier runs",
            class.name(),
            munged.methods.len()
        );
        self.munge
            .classes
            .borrow_mut()
            .insert(name.to_owned(), munged);
        Ok(())
    }
}
