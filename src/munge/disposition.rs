use crate::jvm::{BinaryName, ConfigError, Error, Name};
use crate::session::Session;
use std::collections::BTreeSet;
use std::fs;

/// What happens to every class a run touched, each list sorted by name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dispositions {
    /// Classes to write out
    pub modified: Vec<BinaryName>,

    /// Classes left as they are
    pub unchanged: Vec<BinaryName>,

    /// Classes whose files should be deleted
    pub deleted: Vec<BinaryName>,
}

impl Session {
    /// Delete generated methods from earlier runs which weren't generated again in this run
    ///
    /// Returns how many methods were deleted.
    pub fn purge_unused_methods(&self) -> Result<usize, Error> {
        let mut purged = 0;
        let mut classes = self.munge.classes.borrow_mut();
        for (class_name, munged) in classes.iter_mut() {
            let class = self.registry().require_class(class_name)?;
            for method in munged.methods.iter_mut() {
                if method.used || method.deleted {
                    continue;
                }
                method.deleted = true;
                if self
                    .registry()
                    .delete_method(class, method.name.as_str(), &method.descriptor)?
                {
                    purged += 1;
                }
            }
        }
        if purged > 0 {
            log::info!("Purged {} unused generated method(s)", purged);
        }
        Ok(purged)
    }

    /// Sort the classes touched during the run into modified, unchanged, and deleted
    ///
    /// Modified classes get completed. An adapter class left without methods is deleted if it
    /// exists on disk, and forgotten otherwise.
    pub fn finalize_dispositions(&self) -> Result<Dispositions, Error> {
        let mut names: BTreeSet<String> = self.munge.touched.borrow().clone();
        names.extend(
            self.registry()
                .modified_classes()
                .into_iter()
                .map(|class| class.name().as_str().to_owned()),
        );
        let adapter = self.munge.adapter.borrow().clone();

        let mut dispositions = Dispositions::default();
        for name in names {
            let class = self.registry().require_class(&name)?;
            let is_adapter = adapter.as_ref() == Some(class.name());
            if is_adapter && class.methods().next().is_none() {
                if self.registry().is_pending(&name) {
                    log::debug!("Dropping empty adapter class {}", name);
                    self.registry().discard_class(&name);
                } else {
                    log::info!("Deleting empty adapter class {}", name);
                    dispositions.deleted.push(class.name().clone());
                }
                continue;
            }

            if class.is_modified() {
                class.code_complete();
                dispositions.modified.push(class.name().clone());
            } else {
                dispositions.unchanged.push(class.name().clone());
            }
        }
        log::info!(
            "{} class(es) modified, {} unchanged, {} deleted",
            dispositions.modified.len(),
            dispositions.unchanged.len(),
            dispositions.deleted.len()
        );
        Ok(dispositions)
    }

    /// Write out modified classes and delete obsolete ones
    ///
    /// This is the last step of a run: nothing touches the disk before it.
    pub fn commit(&self, dispositions: &Dispositions) -> Result<(), Error> {
        if self.settings().verify {
            self.verify_classes(&dispositions.modified)?;
        }

        for name in &dispositions.modified {
            let class = self.registry().require_class(name.as_str())?;
            let path = class
                .output_path()
                .ok_or_else(|| ConfigError::Unmodifiable(name.as_str().to_owned()))?;
            class
                .to_class_file()?
                .save_to_path(&path, true)
                .map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })?;
            log::debug!("Wrote {}", path.display());
        }

        for name in &dispositions.deleted {
            let class = self.registry().require_class(name.as_str())?;
            if let Some(path) = class.output_path() {
                fs::remove_file(&path).map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })?;
                log::debug!("Deleted {}", path.display());
            }
        }

        log::info!(
            "Wrote {} class file(s), deleted {}",
            dispositions.modified.len(),
            dispositions.deleted.len()
        );
        Ok(())
    }
}
