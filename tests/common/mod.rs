#![allow(dead_code)]

use bindweave::jvm::class_file::{ClassFile, Code, ConstantsPool, Field, Method, Version};
use bindweave::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use bindweave::{Session, Settings};
use std::fs;
use std::path::{Path, PathBuf};

/// Class file to write into a test directory
pub struct Fixture {
    name: String,
    superclass: String,
    access_flags: ClassAccessFlags,
    version: Version,
    fields: Vec<(FieldAccessFlags, String, String)>,
    constructor: bool,
}

impl Fixture {
    /// Public class extending `Object`, with a public no-args constructor
    pub fn class(name: &str) -> Fixture {
        Fixture {
            name: name.to_owned(),
            superclass: String::from("java/lang/Object"),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            version: Version::JAVA5,
            fields: vec![],
            constructor: true,
        }
    }

    pub fn extends(mut self, superclass: &str) -> Fixture {
        self.superclass = superclass.to_owned();
        self
    }

    pub fn version(mut self, major_version: u16) -> Fixture {
        self.version = Version {
            major_version,
            minor_version: 0,
        };
        self
    }

    pub fn abstract_class(mut self) -> Fixture {
        self.access_flags |= ClassAccessFlags::ABSTRACT;
        self
    }

    pub fn without_constructor(mut self) -> Fixture {
        self.constructor = false;
        self
    }

    pub fn field(self, name: &str, descriptor: &str) -> Fixture {
        self.field_with(FieldAccessFlags::PUBLIC, name, descriptor)
    }

    pub fn field_with(mut self, access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> Fixture {
        self.fields
            .push((access_flags, name.to_owned(), descriptor.to_owned()));
        self
    }

    pub fn class_file(&self) -> ClassFile {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class(&self.name).unwrap();
        let super_class = constants.get_class(&self.superclass).unwrap();

        let fields = self
            .fields
            .iter()
            .map(|(access_flags, name, descriptor)| Field {
                access_flags: *access_flags,
                name_index: constants.get_utf8(name).unwrap(),
                descriptor_index: constants.get_utf8(descriptor).unwrap(),
                attributes: vec![],
            })
            .collect();

        let mut methods = vec![];
        if self.constructor {
            let super_init = constants
                .get_method_ref(&self.superclass, "<init>", "()V", false)
                .unwrap();
            let [hi, lo] = (super_init.0).0.to_be_bytes();
            let code = Code {
                max_stack: 1,
                max_locals: 1,
                code_array: vec![0x2a, 0xb7, hi, lo, 0xb1],
                exception_table: vec![],
                attributes: vec![],
            };
            methods.push(Method {
                access_flags: MethodAccessFlags::PUBLIC,
                name_index: constants.get_utf8("<init>").unwrap(),
                descriptor_index: constants.get_utf8("()V").unwrap(),
                attributes: vec![constants.get_attribute(&code).unwrap()],
            });
        }

        ClassFile {
            version: self.version,
            constants,
            access_flags: self.access_flags,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields,
            methods,
            attributes: vec![],
        }
    }

    /// Write the class under `root`, returning the path of the class file
    pub fn write(&self, root: &Path) -> PathBuf {
        let path = class_path(root, &self.name);
        self.class_file().save_to_path(&path, true).unwrap();
        path
    }
}

pub fn class_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{}.class", name))
}

pub fn read_class(root: &Path, name: &str) -> ClassFile {
    let bytes = fs::read(class_path(root, name)).unwrap();
    ClassFile::parse(&bytes).unwrap()
}

/// Names and descriptors of the methods in a class file, in order
pub fn method_signatures(class: &ClassFile) -> Vec<(String, String)> {
    class
        .methods
        .iter()
        .map(|method| {
            (
                class.constants.utf8(method.name_index).unwrap().to_owned(),
                class.constants.utf8(method.descriptor_index).unwrap().to_owned(),
            )
        })
        .collect()
}

pub fn method_names(class: &ClassFile) -> Vec<String> {
    method_signatures(class)
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

pub fn session(search_paths: &[&Path]) -> Session {
    Session::new(settings(search_paths))
}

pub fn settings(search_paths: &[&Path]) -> Settings {
    let mut settings = Settings::new(search_paths.iter().map(|path| path.to_path_buf()).collect())
        .unwrap();
    settings.verify = true;
    settings
}

/// `Order` holding a list of `Item`s, both in `com/example`
pub fn write_order_item(root: &Path) {
    Fixture::class("com/example/Item")
        .field("name", "Ljava/lang/String;")
        .field("quantity", "I")
        .write(root);
    Fixture::class("com/example/Order")
        .field("id", "Ljava/lang/String;")
        .field("total", "J")
        .field("paid", "Z")
        .field("items", "Ljava/util/List;")
        .write(root);
}

pub const ITEM_MAPPING: &str = "com.example.Item=item:name,quantity@qty";
pub const ORDER_MAPPING: &str = "com.example.Order=order:id,total,paid,items/collection=item";
