use crate::jvm::code::{AssemblerConfig, MethodAssembler};
use crate::jvm::{ClassModel, ClassRegistry, Error, MethodAccessFlags, UnqualifiedName};
use crate::munge::MungeState;
use crate::settings::Settings;

/// State of one weaving run
///
/// Everything learned during a run (loaded classes, decoded descriptors, hosting decisions,
/// generated method maps, the adapter class) hangs off of the session, and goes away with
/// `reset`. Nothing is shared between sessions.
pub struct Session {
    registry: ClassRegistry,
    pub(crate) munge: MungeState,
}

impl Session {
    pub fn new(settings: Settings) -> Session {
        Session {
            registry: ClassRegistry::new(settings),
            munge: MungeState::default(),
        }
    }

    /// Forget everything about the run so far, keeping the same settings
    pub fn reset(&mut self) {
        let settings = self.registry.settings().clone();
        self.reset_with(settings);
    }

    /// Forget everything about the run so far and start over with new settings
    pub fn reset_with(&mut self, settings: Settings) {
        log::debug!("Resetting session");
        *self = Session::new(settings);
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        self.registry.settings()
    }

    /// Start building a method in a class
    pub fn method_assembler<'s>(
        &'s self,
        class: &'s ClassModel,
        name: UnqualifiedName,
        descriptor: &str,
        access_flags: MethodAccessFlags,
        config: AssemblerConfig,
    ) -> Result<MethodAssembler<'s>, Error> {
        MethodAssembler::new(&self.registry, class, name, descriptor, access_flags, config)
    }
}
