use crate::jvm::class_file::Version;
use crate::jvm::{BinaryName, ConfigError, Error, Name, RUNTIME_PACKAGE};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Directories holding the classes to modify, searched first
    pub search_paths: Vec<PathBuf>,

    /// Directories with classes that may be referenced but are never modified
    pub classpath: Vec<PathBuf>,

    /// Classes which must not be modified even if they are on a writable root
    pub preserve: Vec<BinaryName>,

    /// Package for the catch-all adapter class (eg. `com/example`)
    ///
    /// When this is not set, the adapter goes in the package of the first modifiable class that
    /// gets bound.
    pub adapter_package: Option<String>,

    /// Simple name of the catch-all adapter class
    pub adapter_class_name: String,

    /// Prefix of every generated method name
    ///
    /// Existing methods with this prefix are assumed to come from a previous run: they get
    /// reused when an identical method is generated again, and deleted otherwise.
    pub method_prefix: String,

    /// Class files with this major version or later are never modified
    ///
    /// Version 51 is the first one where the JVM insists on `StackMapTable` attributes, and those
    /// are never generated.
    pub extension_cutover: u16,

    /// Version of classes created from scratch
    pub generated_version: Version,

    /// Context passed to marshal methods
    pub marshalling_context: BinaryName,

    /// Context passed to unmarshal methods
    pub unmarshalling_context: BinaryName,

    /// Runtime class with the static text conversions (`serialize`, `parseInt`, ...)
    pub utility_class: BinaryName,

    /// Re-read and check every modified class before writing it out
    pub verify: bool,

    /// Log every branch creation and resolution
    pub track_branches: bool,
}

impl Settings {
    pub fn new(search_paths: Vec<PathBuf>) -> Result<Settings, Error> {
        fn make_name<N: Name>(name: impl Into<String>) -> Result<N, Error> {
            N::from_string(name.into()).map_err(|err| ConfigError::MalformedName(err).into())
        }

        Ok(Settings {
            search_paths,
            classpath: vec![],
            preserve: vec![],
            adapter_package: None,
            adapter_class_name: String::from("BindMungeAdapter"),
            method_prefix: String::from("bind_"),
            extension_cutover: Version::JAVA7.major_version,
            generated_version: Version::JAVA5,
            marshalling_context: make_name(format!("{}/MarshallingContext", RUNTIME_PACKAGE))?,
            unmarshalling_context: make_name(format!("{}/UnmarshallingContext", RUNTIME_PACKAGE))?,
            utility_class: make_name(format!("{}/Utility", RUNTIME_PACKAGE))?,
            verify: false,
            track_branches: false,
        })
    }

    /// Add a class to the preserve list, checking its name
    pub fn preserve_class(&mut self, name: impl Into<String>) -> Result<(), Error> {
        let name = BinaryName::from_string(name.into()).map_err(ConfigError::MalformedName)?;
        self.preserve.push(name);
        Ok(())
    }
}
