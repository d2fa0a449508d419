mod common;

use bindweave::binding::{BindingDefinition, Mapping, Weaver};
use bindweave::jvm::code::AssemblerConfig;
use bindweave::jvm::{
    BinaryName, ConfigError, Error, ErrorCategory, FieldAccessFlags, FieldType, MethodAccessFlags,
    Name, UnqualifiedName,
};
use bindweave::munge::HostDecision;
use bindweave::Session;
use common::*;
use std::path::Path;
use tempfile::TempDir;

fn binding(mappings: &[&str]) -> BindingDefinition {
    BindingDefinition {
        name: String::from("b"),
        mappings: mappings
            .iter()
            .map(|mapping| mapping.parse::<Mapping>().unwrap())
            .collect(),
    }
}

fn name(name: &str) -> BinaryName {
    BinaryName::from_string(name.to_owned()).unwrap()
}

/// Session with one writable root and one read-only root
fn split_session(writable: &Path, read_only: &Path) -> Session {
    let mut settings = settings(&[writable]);
    settings.classpath.push(read_only.to_path_buf());
    Session::new(settings)
}

#[test]
fn modifiable_class_hosts_itself() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());
    let session = session(&[dir.path()]);

    let item = session.registry().require_class("com/example/Item").unwrap();
    assert!(item.is_modifiable());
    assert_eq!(session.resolve_host(item, None).unwrap(), HostDecision::Direct);
}

#[test]
fn subclass_hosts_for_read_only_class() {
    let writable = TempDir::new().unwrap();
    let read_only = TempDir::new().unwrap();
    Fixture::class("com/lib/Base")
        .field("id", "Ljava/lang/String;")
        .write(read_only.path());
    Fixture::class("com/example/Derived")
        .extends("com/lib/Base")
        .write(writable.path());
    let session = split_session(writable.path(), read_only.path());

    let derived = session.registry().require_class("com/example/Derived").unwrap();
    let base = session.registry().require_class("com/lib/Base").unwrap();
    assert!(!base.is_modifiable());
    assert_eq!(
        session.resolve_host(base, Some(derived)).unwrap(),
        HostDecision::Surrogate(name("com/example/Derived"))
    );

    // Without a subclass at hand, there is no adapter package to fall back on
    let err = session.resolve_host(base, None).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::NoAdapterPackage)));
}

#[test]
fn bound_subclass_hosts_read_only_base() {
    let writable = TempDir::new().unwrap();
    let read_only = TempDir::new().unwrap();
    Fixture::class("com/lib/Base")
        .field("id", "Ljava/lang/String;")
        .write(read_only.path());
    Fixture::class("com/example/Derived")
        .extends("com/lib/Base")
        .field("level", "I")
        .write(writable.path());

    let session = split_session(writable.path(), read_only.path());
    let report = Weaver::new(&session)
        .weave(&[binding(&["com.lib.Base=base:id", "com.example.Derived=derived:id,level"])])
        .unwrap();
    assert_eq!(report.dispositions.modified, vec![name("com/example/Derived")]);
    assert_eq!(report.dispositions.unchanged, vec![name("com/lib/Base")]);
    session.commit(&report.dispositions).unwrap();

    let derived = read_class(writable.path(), "com/example/Derived");
    assert_eq!(
        method_signatures(&derived),
        vec![
            (String::from("<init>"), String::from("()V")),
            (
                String::from("bind_b_marshal"),
                String::from("(Lcom/lib/Base;Lorg/bindweave/runtime/MarshallingContext;)V")
            ),
            (
                String::from("bind_b_unmarshal"),
                String::from("(Lcom/lib/Base;Lorg/bindweave/runtime/UnmarshallingContext;)V")
            ),
            (String::from("bind_b_newinstance"), String::from("()Lcom/lib/Base;")),
            (
                String::from("bind_b_marshal_2"),
                String::from("(Lorg/bindweave/runtime/MarshallingContext;)V")
            ),
            (
                String::from("bind_b_unmarshal_2"),
                String::from("(Lorg/bindweave/runtime/UnmarshallingContext;)V")
            ),
            (
                String::from("bind_b_newinstance"),
                String::from("()Lcom/example/Derived;")
            ),
        ]
    );
    assert!(!class_path(writable.path(), "com/example/BindMungeAdapter").exists());
    assert!(!class_path(read_only.path(), "com/example/Derived").exists());
}

#[test]
fn subclass_cannot_reach_protected_fields_of_other_objects() {
    let writable = TempDir::new().unwrap();
    let read_only = TempDir::new().unwrap();
    Fixture::class("com/lib/Guarded")
        .field_with(FieldAccessFlags::PROTECTED, "level", "I")
        .write(read_only.path());
    Fixture::class("com/example/Watcher")
        .extends("com/lib/Guarded")
        .field("name", "Ljava/lang/String;")
        .write(writable.path());

    // The surrogate method gets a `Guarded`, which need not be a `Watcher`
    let session = split_session(writable.path(), read_only.path());
    let err = Weaver::new(&session)
        .weave(&[binding(&[
            "com.lib.Guarded=guarded:level",
            "com.example.Watcher=watcher:name,level",
        ])])
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Inaccessible { .. })));

    // Through its own instances, the subclass is fine
    let session = split_session(writable.path(), read_only.path());
    let report = Weaver::new(&session)
        .weave(&[binding(&["com.example.Watcher=watcher:name,level"])])
        .unwrap();
    assert_eq!(report.dispositions.modified, vec![name("com/example/Watcher")]);
}

#[test]
fn adapter_hosts_read_only_class() {
    let writable = TempDir::new().unwrap();
    let read_only = TempDir::new().unwrap();
    Fixture::class("com/example/Local")
        .field("x", "Ljava/lang/String;")
        .write(writable.path());
    Fixture::class("com/lib/Item")
        .field("name", "Ljava/lang/String;")
        .field("quantity", "I")
        .write(read_only.path());
    let adapter = "com/example/BindMungeAdapter";

    let session = split_session(writable.path(), read_only.path());
    let report = Weaver::new(&session)
        .weave(&[binding(&["com.example.Local=local:x", "com.lib.Item=item:name,quantity"])])
        .unwrap();
    let item = session.registry().require_class("com/lib/Item").unwrap();
    assert_eq!(
        session.resolve_host(item, None).unwrap(),
        HostDecision::Adapter(name(adapter))
    );
    assert_eq!(
        report.dispositions.modified,
        vec![name(adapter), name("com/example/Local")]
    );
    assert_eq!(report.dispositions.unchanged, vec![name("com/lib/Item")]);
    session.commit(&report.dispositions).unwrap();

    let written = read_class(writable.path(), adapter);
    assert_eq!(written.version.major_version, 49);
    assert_eq!(
        method_signatures(&written),
        vec![
            (
                String::from("bind_b_marshal"),
                String::from("(Lcom/lib/Item;Lorg/bindweave/runtime/MarshallingContext;)V")
            ),
            (
                String::from("bind_b_unmarshal"),
                String::from("(Lcom/lib/Item;Lorg/bindweave/runtime/UnmarshallingContext;)V")
            ),
            (String::from("bind_b_newinstance"), String::from("()Lcom/lib/Item;")),
        ]
    );
    assert!(!class_path(read_only.path(), adapter).exists());

    // Once nothing needs the adapter, it goes away
    let session = split_session(writable.path(), read_only.path());
    let report = Weaver::new(&session)
        .weave(&[binding(&["com.example.Local=local:x"])])
        .unwrap();
    assert_eq!(report.purged, 3);
    assert_eq!(report.dispositions.deleted, vec![name(adapter)]);
    session.commit(&report.dispositions).unwrap();
    assert!(!class_path(writable.path(), adapter).exists());
    assert!(class_path(writable.path(), "com/example/Local").exists());
}

#[test]
fn unused_new_adapter_is_never_written() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());
    let mut settings = settings(&[dir.path()]);
    settings.adapter_package = Some(String::from("com/example/gen"));
    let session = Session::new(settings);

    let adapter = session.adapter().unwrap();
    assert_eq!(adapter.name().as_str(), "com/example/gen/BindMungeAdapter");
    let report = Weaver::new(&session)
        .weave(&[binding(&[ITEM_MAPPING])])
        .unwrap();
    assert!(report.dispositions.deleted.is_empty());
    assert_eq!(report.dispositions.modified, vec![name("com/example/Item")]);
    session.commit(&report.dispositions).unwrap();
    assert!(!class_path(dir.path(), "com/example/gen/BindMungeAdapter").exists());
}

#[test]
fn new_class_versions_are_not_modified() {
    let dir = TempDir::new().unwrap();
    Fixture::class("com/example/Modern")
        .version(51)
        .field("x", "I")
        .write(dir.path());
    Fixture::class("com/example/Kept")
        .field("x", "I")
        .write(dir.path());
    let mut settings = settings(&[dir.path()]);
    settings.adapter_package = Some(String::from("com/example"));
    settings.preserve_class("com/example/Kept").unwrap();
    let session = Session::new(settings);

    for class in ["com/example/Modern", "com/example/Kept"] {
        let class = session.registry().require_class(class).unwrap();
        assert!(!class.is_modifiable());
        assert_eq!(
            session.resolve_host(class, None).unwrap(),
            HostDecision::Adapter(name("com/example/BindMungeAdapter"))
        );
    }
}

#[test]
fn adapter_needs_visible_fields() {
    let writable = TempDir::new().unwrap();
    let read_only = TempDir::new().unwrap();
    Fixture::class("com/example/Local")
        .field("x", "Ljava/lang/String;")
        .write(writable.path());
    Fixture::class("com/lib/Hidden")
        .field_with(FieldAccessFlags::empty(), "secret", "Ljava/lang/String;")
        .write(read_only.path());

    let session = split_session(writable.path(), read_only.path());
    let err = Weaver::new(&session)
        .weave(&[binding(&["com.example.Local=local:x", "com.lib.Hidden=hidden:secret"])])
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Inaccessible { .. })));
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(!class_path(writable.path(), "com/example/BindMungeAdapter").exists());
}

#[test]
fn visibility_rules() {
    let writable = TempDir::new().unwrap();
    let read_only = TempDir::new().unwrap();
    Fixture::class("com/lib/Base")
        .field_with(FieldAccessFlags::PROTECTED, "guarded", "I")
        .field_with(FieldAccessFlags::empty(), "local", "I")
        .field_with(FieldAccessFlags::PRIVATE, "mine", "I")
        .write(read_only.path());
    Fixture::class("com/example/Derived")
        .extends("com/lib/Base")
        .write(writable.path());
    Fixture::class("com/lib/Neighbor").write(read_only.path());
    Fixture::class("com/example/Stranger").write(writable.path());

    let session = split_session(writable.path(), read_only.path());
    let registry = session.registry();
    let base = registry.require_class("com/lib/Base").unwrap();
    let derived = registry.require_class("com/example/Derived").unwrap();
    let neighbor = registry.require_class("com/lib/Neighbor").unwrap();
    let stranger = registry.require_class("com/example/Stranger").unwrap();
    let field = |name: &str| base.declared_field(name).unwrap();

    let accessible = |field_name: &str, accessor| {
        registry
            .is_accessible_from(field(field_name), accessor)
            .unwrap()
    };
    assert!(accessible("guarded", derived));
    assert!(accessible("guarded", neighbor));
    assert!(!accessible("guarded", stranger));
    assert!(accessible("local", neighbor));
    assert!(!accessible("local", derived));
    assert!(!accessible("mine", neighbor));
    assert!(accessible("mine", base));

    // Protected access from another package only works on the accessor's own instances
    let through = |accessor, receiver| {
        registry
            .is_accessible_through(field("guarded"), accessor, receiver)
            .unwrap()
    };
    assert!(through(derived, derived));
    assert!(!through(derived, base));
    assert!(through(neighbor, base));

    // Inherited fields are found through the subclass, unless they are private
    assert!(registry.find_field(derived, "guarded").unwrap().is_some());
    assert!(registry.find_field(derived, "mine").unwrap().is_none());
}

#[test]
fn structural_hash_and_equality() {
    let dir = TempDir::new().unwrap();
    Fixture::class("com/example/First").field("x", "I").write(dir.path());
    Fixture::class("com/example/Second").field("x", "I").write(dir.path());
    Fixture::class("com/example/Third")
        .field("x", "I")
        .field("y", "I")
        .write(dir.path());
    let session = session(&[dir.path()]);
    let registry = session.registry();

    let first = registry.require_class("com/example/First").unwrap();
    let second = registry.require_class("com/example/Second").unwrap();
    let third = registry.require_class("com/example/Third").unwrap();

    // Nothing to compare before completion
    assert_eq!(first.structural_hash(), None);
    assert!(!first.structurally_equal(second));

    for class in [first, second, third] {
        class.code_complete();
        class.code_complete();
    }
    assert_eq!(first.structural_hash(), second.structural_hash());
    assert!(first.structurally_equal(second));
    assert!(!first.structurally_equal(third));

    // Changing a class undoes completion
    registry.delete_field(second, "x").unwrap();
    assert!(!second.is_complete());
    assert_eq!(second.structural_hash(), None);
    assert!(!first.structurally_equal(second));
}

#[test]
fn adapter_methods_compare_structurally() {
    let read_only = TempDir::new().unwrap();
    Fixture::class("com/lib/Item")
        .field("name", "Ljava/lang/String;")
        .field("quantity", "I")
        .write(read_only.path());

    let adapter_session = |adapter_name: &str, mapping: &str| {
        let writable = TempDir::new().unwrap();
        let mut settings = settings(&[writable.path()]);
        settings.classpath.push(read_only.path().to_path_buf());
        settings.adapter_package = Some(String::from("com/example"));
        settings.adapter_class_name = adapter_name.to_owned();
        let session = Session::new(settings);
        Weaver::new(&session).weave(&[binding(&[mapping])]).unwrap();
        (writable, session)
    };
    let (_dir1, first) = adapter_session("BindMungeAdapter", "com.lib.Item=item:name,quantity");
    let (_dir2, second) = adapter_session("OtherAdapter", "com.lib.Item=item:name,quantity");
    let (_dir3, third) = adapter_session("BindMungeAdapter", "com.lib.Item=item:name");

    let first = first.adapter().unwrap();
    let second = second.adapter().unwrap();
    let third = third.adapter().unwrap();
    assert!(first.is_complete());
    assert_eq!(first.methods().count(), 3);

    // Same generated code under a different class name
    assert_eq!(first.structural_hash(), second.structural_hash());
    assert!(first.structurally_equal(second));
    assert!(!first.structurally_equal(third));
}

#[test]
fn missing_superclass_is_not_cached() {
    let dir = TempDir::new().unwrap();
    Fixture::class("com/example/Orphan")
        .extends("com/example/Gone")
        .write(dir.path());
    Fixture::class("com/example/Chicken")
        .extends("com/example/Egg")
        .write(dir.path());
    Fixture::class("com/example/Egg")
        .extends("com/example/Chicken")
        .write(dir.path());
    let session = session(&[dir.path()]);
    let registry = session.registry();

    for _ in 0..2 {
        let err = registry.lookup_class("com/example/Orphan").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::MissingSuperclass { .. })));
    }
    assert!(registry.is_instance_of("com/example/Orphan", "java/lang/Object").is_err());

    for _ in 0..2 {
        let err = registry.lookup_class("com/example/Chicken").unwrap_err();
        assert!(matches!(err, Error::ClassFormat { .. }));
    }
}

#[test]
fn preserving_a_changed_class_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());
    let session = session(&[dir.path()]);
    let registry = session.registry();
    let extra = |name: &str| UnqualifiedName::from_string(name.to_owned()).unwrap();

    let item = registry.require_class("com/example/Item").unwrap();
    registry
        .add_field(item, extra("extra"), FieldType::int(), FieldAccessFlags::PRIVATE)
        .unwrap();
    let err = registry.preserve("com/example/Item").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Internal);
    assert!(!registry.is_preserved("com/example/Item"));
    assert!(item.is_modifiable());
    registry
        .add_field(item, extra("more"), FieldType::int(), FieldAccessFlags::PRIVATE)
        .unwrap();

    // An untouched class freezes
    let order = registry.require_class("com/example/Order").unwrap();
    registry.preserve("com/example/Order").unwrap();
    assert!(registry.is_preserved("com/example/Order"));
    assert!(!order.is_modifiable());
    let err = registry
        .add_field(order, extra("extra"), FieldType::int(), FieldAccessFlags::PRIVATE)
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Unmodifiable(_))));
}

#[test]
fn broken_code_leaves_class_alone() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());
    let session = session(&[dir.path()]);
    let item = session.registry().require_class("com/example/Item").unwrap();
    let method_name = || UnqualifiedName::from_string(String::from("bind_broken")).unwrap();

    // Returning an int from a method returning a string
    let mut asm = session
        .method_assembler(
            item,
            method_name(),
            "()Ljava/lang/String;",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            AssemblerConfig::default(),
        )
        .unwrap();
    asm.append_push_int(7).unwrap();
    let err = asm.append_return().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Internal);

    // Running off the end
    let mut asm = session
        .method_assembler(
            item,
            method_name(),
            "()V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            AssemblerConfig::default(),
        )
        .unwrap();
    asm.append_push_int(7).unwrap();
    asm.append_pop().unwrap();
    let err = session.get_unique_method(asm, false).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Internal);

    assert!(!item.is_modified());
    assert!(item.declared_method("bind_broken", "()V").is_none());
}

#[test]
fn reset_forgets_everything() {
    let writable = TempDir::new().unwrap();
    let read_only = TempDir::new().unwrap();
    for class in ["com/example/X", "com/example/Y", "com/example/Z"] {
        Fixture::class(class).field("v", "I").write(writable.path());
    }
    Fixture::class("com/lib/R").field("v", "I").write(read_only.path());
    let adapter = "com/example/BindMungeAdapter";
    let mut session = split_session(writable.path(), read_only.path());

    let report = Weaver::new(&session)
        .weave(&[binding(&[
            "com.example.X=x:v",
            "com.example.Y=y:v",
            "com.lib.R=r:v",
        ])])
        .unwrap();
    assert_eq!(
        report.dispositions.modified,
        vec![name(adapter), name("com/example/X"), name("com/example/Y")]
    );
    assert!(session.registry().is_pending(adapter));

    // Nothing was committed, so only what is on disk survives
    session.reset();
    assert!(session.registry().modified_classes().is_empty());
    assert!(!session.registry().is_pending(adapter));
    assert!(matches!(
        session.adapter(),
        Err(Error::Config(ConfigError::NoAdapterPackage))
    ));

    let report = Weaver::new(&session)
        .weave(&[binding(&["com.example.Z=z:v"])])
        .unwrap();
    assert_eq!(report.dispositions.modified, vec![name("com/example/Z")]);
    assert!(report.dispositions.unchanged.is_empty());
    assert!(report.dispositions.deleted.is_empty());
    assert_eq!(report.purged, 0);
    assert!(session.registry().lookup_class(adapter).unwrap().is_none());
    for class in ["com/example/X", "com/example/Y"] {
        let class = session.registry().require_class(class).unwrap();
        assert!(!class.is_modified());
        assert_eq!(class.methods().count(), 1);
    }
    session.commit(&report.dispositions).unwrap();
    assert!(!class_path(writable.path(), adapter).exists());
    assert_eq!(method_names(&read_class(writable.path(), "com/example/X")), vec!["<init>"]);

    // New settings take effect, and the run starts over
    let mut settings = settings(&[writable.path()]);
    settings.method_prefix = String::from("weave_");
    session.reset_with(settings);
    assert_eq!(session.settings().method_prefix, "weave_");
    let report = Weaver::new(&session)
        .weave(&[binding(&["com.example.Y=y:v"])])
        .unwrap();
    assert_eq!(
        report.methods[0],
        "com/example/Y.weave_b_marshal_1(Lorg/bindweave/runtime/MarshallingContext;)V"
    );
}
