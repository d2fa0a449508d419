use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, written with slashes (eg. `java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Binary name is empty"))
        } else {
            name.split('/').try_for_each(UnqualifiedName::check_valid)
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    /// Concatenate the contents of two unqualified names to produce a third
    pub fn concat(&self, other: &UnqualifiedName) -> UnqualifiedName {
        UnqualifiedName(Cow::Owned(format!("{}{}", self.as_str(), other.as_str())))
    }

    /// Append a `_n` suffix
    pub fn with_suffix(&self, n: usize) -> UnqualifiedName {
        UnqualifiedName(Cow::Owned(format!("{}_{}", self.as_str(), n)))
    }

    pub(crate) const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    // JDK names
    pub const ADD: Self = Self::name("add");
    pub const HASNEXT: Self = Self::name("hasNext");
    pub const ITERATOR: Self = Self::name("iterator");
    pub const NEXT: Self = Self::name("next");
    pub const SIZE: Self = Self::name("size");
}

impl BinaryName {
    /// Join segments from the other name onto the end of this binary name
    pub fn join(&self, other: impl Name) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}/{}", self.as_str(), other.as_str())))
    }

    /// Name in a package (the empty package is allowed)
    pub fn in_package(package: &str, simple_name: &UnqualifiedName) -> BinaryName {
        if package.is_empty() {
            BinaryName(simple_name.0.clone())
        } else {
            BinaryName(Cow::Owned(format!("{}/{}", package, simple_name.as_str())))
        }
    }

    /// Parse a name written the Java source way (eg. `java.lang.Object`)
    pub fn from_java_name(name: &str) -> Result<BinaryName, String> {
        BinaryName::from_string(name.replace('.', "/"))
    }

    /// Names which are used as class cache keys but aren't real binary names (primitive
    /// keywords like `int` and array descriptors like `[I`)
    pub(crate) fn placeholder(name: &str) -> BinaryName {
        BinaryName(Cow::Owned(name.to_owned()))
    }

    /// Package part of the name, with slashes (empty for the default package)
    pub fn package(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[..idx],
            None => "",
        }
    }

    /// Last segment of the name
    pub fn simple_name(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[idx + 1..],
            None => self.as_str(),
        }
    }

    /// Name written the Java source way
    pub fn java_name(&self) -> String {
        self.as_str().replace('/', ".")
    }

    pub(crate) const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // JDK names
    pub const ARRAYLIST: Self = Self::name("java/util/ArrayList");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const COLLECTION: Self = Self::name("java/util/Collection");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const ITERABLE: Self = Self::name("java/lang/Iterable");
    pub const ITERATOR: Self = Self::name("java/util/Iterator");
    pub const LIST: Self = Self::name("java/util/List");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validates_names() {
        assert!(UnqualifiedName::from_string(String::from("orderNumber")).is_ok());
        assert!(UnqualifiedName::from_string(String::from("a.b")).is_err());
        assert!(UnqualifiedName::from_string(String::new()).is_err());
        assert!(BinaryName::from_string(String::from("com/example/Order")).is_ok());
        assert!(BinaryName::from_string(String::from("com//Order")).is_err());
        assert!(BinaryName::from_string(String::from("[I")).is_err());
    }

    #[test]
    fn package_and_simple_name() {
        let order = BinaryName::from_java_name("com.example.Order").unwrap();
        assert_eq!(order.as_str(), "com/example/Order");
        assert_eq!(order.package(), "com/example");
        assert_eq!(order.simple_name(), "Order");
        assert_eq!(order.java_name(), "com.example.Order");

        let toplevel = BinaryName::from_string(String::from("Order")).unwrap();
        assert_eq!(toplevel.package(), "");
        assert_eq!(toplevel.simple_name(), "Order");
    }

    #[test]
    fn suffixes_and_packages() {
        let adapter = UnqualifiedName::from_string(String::from("Adapter")).unwrap();
        assert_eq!(
            BinaryName::in_package("com/example", &adapter).as_str(),
            "com/example/Adapter"
        );
        assert_eq!(BinaryName::in_package("", &adapter).as_str(), "Adapter");
        assert_eq!(adapter.with_suffix(2).as_str(), "Adapter_2");
    }
}
