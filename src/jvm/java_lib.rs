//! Built-in declarations for the JDK core types and the binding runtime
//!
//! These stand in for classes which are normally only found in the JDK or in the runtime jar,
//! neither of which gets searched. Only the members generated code actually references are
//! declared.

use super::{
    BinaryName, ClassAccessFlags, ClassModel, Error, InternalErrorKind, MemberItem, MemberType,
    SignatureCache, UnqualifiedName,
};

/// Package of the binding runtime API
pub const RUNTIME_PACKAGE: &str = "org/bindweave/runtime";

struct Builtin {
    name: &'static str,
    superclass: Option<&'static str>,
    interfaces: &'static [&'static str],
    access_flags: u16,
    methods: &'static [BuiltinMethod],
}

struct BuiltinMethod {
    name: &'static str,
    descriptor: &'static str,
    access_flags: u16,
    exceptions: &'static [&'static str],
}

const PUBLIC: u16 = 0x0001;
const PUBLIC_STATIC: u16 = 0x0009;
const PUBLIC_ABSTRACT: u16 = 0x0401;
const INTERFACE: u16 = 0x0601;
const CLASS: u16 = 0x0021;

const BINDING_EXCEPTION: &[&str] = &["org/bindweave/runtime/BindingException"];

const fn method(name: &'static str, descriptor: &'static str, access_flags: u16) -> BuiltinMethod {
    BuiltinMethod {
        name,
        descriptor,
        access_flags,
        exceptions: &[],
    }
}

const fn throwing(name: &'static str, descriptor: &'static str) -> BuiltinMethod {
    BuiltinMethod {
        name,
        descriptor,
        access_flags: PUBLIC,
        exceptions: BINDING_EXCEPTION,
    }
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "java/lang/Object",
        superclass: None,
        interfaces: &[],
        access_flags: CLASS,
        methods: &[
            method("<init>", "()V", PUBLIC),
            method("toString", "()Ljava/lang/String;", PUBLIC),
            method("hashCode", "()I", PUBLIC),
            method("equals", "(Ljava/lang/Object;)Z", PUBLIC),
        ],
    },
    Builtin {
        name: "java/lang/String",
        superclass: Some("java/lang/Object"),
        interfaces: &["java/io/Serializable"],
        access_flags: CLASS | 0x0010,
        methods: &[
            method("length", "()I", PUBLIC),
            method("equals", "(Ljava/lang/Object;)Z", PUBLIC),
        ],
    },
    Builtin {
        name: "java/io/Serializable",
        superclass: Some("java/lang/Object"),
        interfaces: &[],
        access_flags: INTERFACE,
        methods: &[],
    },
    Builtin {
        name: "java/lang/Cloneable",
        superclass: Some("java/lang/Object"),
        interfaces: &[],
        access_flags: INTERFACE,
        methods: &[],
    },
    Builtin {
        name: "java/lang/Throwable",
        superclass: Some("java/lang/Object"),
        interfaces: &["java/io/Serializable"],
        access_flags: CLASS,
        methods: &[
            method("<init>", "()V", PUBLIC),
            method("<init>", "(Ljava/lang/String;)V", PUBLIC),
            method("getMessage", "()Ljava/lang/String;", PUBLIC),
        ],
    },
    Builtin {
        name: "java/lang/Exception",
        superclass: Some("java/lang/Throwable"),
        interfaces: &[],
        access_flags: CLASS,
        methods: &[
            method("<init>", "()V", PUBLIC),
            method("<init>", "(Ljava/lang/String;)V", PUBLIC),
        ],
    },
    Builtin {
        name: "java/lang/Iterable",
        superclass: Some("java/lang/Object"),
        interfaces: &[],
        access_flags: INTERFACE,
        methods: &[method("iterator", "()Ljava/util/Iterator;", PUBLIC_ABSTRACT)],
    },
    Builtin {
        name: "java/util/Collection",
        superclass: Some("java/lang/Object"),
        interfaces: &["java/lang/Iterable"],
        access_flags: INTERFACE,
        methods: &[
            method("add", "(Ljava/lang/Object;)Z", PUBLIC_ABSTRACT),
            method("size", "()I", PUBLIC_ABSTRACT),
            method("iterator", "()Ljava/util/Iterator;", PUBLIC_ABSTRACT),
        ],
    },
    Builtin {
        name: "java/util/List",
        superclass: Some("java/lang/Object"),
        interfaces: &["java/util/Collection"],
        access_flags: INTERFACE,
        methods: &[
            method("add", "(Ljava/lang/Object;)Z", PUBLIC_ABSTRACT),
            method("get", "(I)Ljava/lang/Object;", PUBLIC_ABSTRACT),
            method("size", "()I", PUBLIC_ABSTRACT),
        ],
    },
    Builtin {
        name: "java/util/ArrayList",
        superclass: Some("java/lang/Object"),
        interfaces: &[
            "java/util/List",
            "java/lang/Cloneable",
            "java/io/Serializable",
        ],
        access_flags: CLASS,
        methods: &[
            method("<init>", "()V", PUBLIC),
            method("add", "(Ljava/lang/Object;)Z", PUBLIC),
            method("size", "()I", PUBLIC),
            method("iterator", "()Ljava/util/Iterator;", PUBLIC),
        ],
    },
    Builtin {
        name: "java/util/Iterator",
        superclass: Some("java/lang/Object"),
        interfaces: &[],
        access_flags: INTERFACE,
        methods: &[
            method("hasNext", "()Z", PUBLIC_ABSTRACT),
            method("next", "()Ljava/lang/Object;", PUBLIC_ABSTRACT),
        ],
    },
    Builtin {
        name: "org/bindweave/runtime/MarshallingContext",
        superclass: Some("java/lang/Object"),
        interfaces: &[],
        access_flags: CLASS,
        methods: &[
            throwing("startElement", "(Ljava/lang/String;)V"),
            throwing("endElement", "(Ljava/lang/String;)V"),
            throwing("writeElement", "(Ljava/lang/String;Ljava/lang/String;)V"),
            throwing("marshalObject", "(Ljava/lang/Object;)V"),
        ],
    },
    Builtin {
        name: "org/bindweave/runtime/UnmarshallingContext",
        superclass: Some("java/lang/Object"),
        interfaces: &[],
        access_flags: CLASS,
        methods: &[
            throwing("parsePastStartTag", "(Ljava/lang/String;)V"),
            throwing("parsePastEndTag", "(Ljava/lang/String;)V"),
            throwing("parseElementText", "(Ljava/lang/String;)Ljava/lang/String;"),
            throwing("isAt", "(Ljava/lang/String;)Z"),
            throwing("unmarshalElement", "()Ljava/lang/Object;"),
        ],
    },
    Builtin {
        name: "org/bindweave/runtime/Utility",
        superclass: Some("java/lang/Object"),
        interfaces: &[],
        access_flags: CLASS,
        methods: &[
            // Order matters: `short` and `byte` values tie between these, and the first one wins
            method("serialize", "(I)Ljava/lang/String;", PUBLIC_STATIC),
            method("serialize", "(J)Ljava/lang/String;", PUBLIC_STATIC),
            method("serialize", "(D)Ljava/lang/String;", PUBLIC_STATIC),
            method("serialize", "(Z)Ljava/lang/String;", PUBLIC_STATIC),
            method("serialize", "(C)Ljava/lang/String;", PUBLIC_STATIC),
            method("serialize", "(F)Ljava/lang/String;", PUBLIC_STATIC),
            method("parseInt", "(Ljava/lang/String;)I", PUBLIC_STATIC),
            method("parseLong", "(Ljava/lang/String;)J", PUBLIC_STATIC),
            method("parseShort", "(Ljava/lang/String;)S", PUBLIC_STATIC),
            method("parseByte", "(Ljava/lang/String;)B", PUBLIC_STATIC),
            method("parseChar", "(Ljava/lang/String;)C", PUBLIC_STATIC),
            method("parseBoolean", "(Ljava/lang/String;)Z", PUBLIC_STATIC),
            method("parseFloat", "(Ljava/lang/String;)F", PUBLIC_STATIC),
            method("parseDouble", "(Ljava/lang/String;)D", PUBLIC_STATIC),
        ],
    },
    Builtin {
        name: "org/bindweave/runtime/BindingException",
        superclass: Some("java/lang/Exception"),
        interfaces: &[],
        access_flags: CLASS,
        methods: &[
            method("<init>", "()V", PUBLIC),
            method("<init>", "(Ljava/lang/String;)V", PUBLIC),
        ],
    },
];

/// Model of a built-in class, if there is one by that name
pub fn builtin_class(
    name: &str,
    signatures: &SignatureCache,
) -> Result<Option<ClassModel>, Error> {
    let builtin = match BUILTINS.iter().find(|builtin| builtin.name == name) {
        Some(builtin) => builtin,
        None => return Ok(None),
    };
    let class_name = BinaryName::name(builtin.name);

    let class = ClassModel::builtin(
        class_name.clone(),
        builtin.superclass.map(BinaryName::name),
        builtin.interfaces.iter().copied().map(BinaryName::name).collect(),
        ClassAccessFlags::from_bits_truncate(builtin.access_flags),
    );
    for method in builtin.methods {
        let descriptor = signatures
            .method(method.descriptor)
            .map_err(|err| Error::internal(InternalErrorKind::BadDescriptor(err.to_string())))?;
        class.push_builtin_member(MemberItem::new(
            class_name.clone(),
            UnqualifiedName::name(method.name),
            method.descriptor.to_owned(),
            MemberType::Method(descriptor.clone()),
            method.access_flags,
            method.exceptions.iter().copied().map(BinaryName::name).collect(),
            vec![],
            None,
        ));
    }
    Ok(Some(class))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    #[test]
    fn runtime_classes_are_in_the_runtime_package() {
        for builtin in BUILTINS {
            if builtin.name.starts_with("org/") {
                assert_eq!(BinaryName::name(builtin.name).package(), RUNTIME_PACKAGE);
            }
        }
    }

    #[test]
    fn builtin_members() {
        let signatures = SignatureCache::new();
        let list = builtin_class("java/util/ArrayList", &signatures)
            .unwrap()
            .unwrap();
        assert!(list.declared_method("<init>", "()V").is_some());
        assert_eq!(list.interface_names().len(), 3);
        assert!(!list.is_modifiable());

        let marshal = builtin_class("org/bindweave/runtime/MarshallingContext", &signatures)
            .unwrap()
            .unwrap();
        let start = marshal
            .declared_method("startElement", "(Ljava/lang/String;)V")
            .unwrap();
        assert_eq!(start.exceptions()[0].as_str(), "org/bindweave/runtime/BindingException");

        assert!(builtin_class("com/example/Order", &signatures).unwrap().is_none());
    }
}
