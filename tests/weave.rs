mod common;

use bindweave::binding::{BindingDefinition, Mapping, Weaver};
use bindweave::jvm::class_file::{AttributeLike, ClassFile, Code, Exceptions};
use bindweave::jvm::{BinaryName, ConfigError, Error, ErrorCategory, FieldAccessFlags, Name};
use common::*;
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

fn binding(name: &str, mappings: &[&str]) -> BindingDefinition {
    BindingDefinition {
        name: name.to_owned(),
        mappings: mappings
            .iter()
            .map(|mapping| mapping.parse::<Mapping>().unwrap())
            .collect(),
    }
}

fn names(names: &[&str]) -> Vec<BinaryName> {
    names
        .iter()
        .map(|name| BinaryName::from_string(name.to_string()).unwrap())
        .collect()
}

const MARSHAL: &str = "(Lorg/bindweave/runtime/MarshallingContext;)V";
const UNMARSHAL: &str = "(Lorg/bindweave/runtime/UnmarshallingContext;)V";

#[test]
fn order_and_items() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());

    let session = session(&[dir.path()]);
    let report = Weaver::new(&session)
        .weave(&[binding("b", &[ITEM_MAPPING, ORDER_MAPPING])])
        .unwrap();
    session.commit(&report.dispositions).unwrap();

    assert_eq!(
        report.dispositions.modified,
        names(&["com/example/Item", "com/example/Order"])
    );
    assert!(report.dispositions.unchanged.is_empty());
    assert!(report.dispositions.deleted.is_empty());
    assert_eq!(report.purged, 0);
    assert_eq!(report.methods.len(), 6);
    assert_eq!(
        report.methods[0],
        format!("com/example/Item.bind_b_marshal_1{}", MARSHAL)
    );

    let order = read_class(dir.path(), "com/example/Order");
    assert_eq!(order.version.major_version, 49);
    assert_eq!(
        method_signatures(&order),
        vec![
            (String::from("<init>"), String::from("()V")),
            (String::from("bind_b_marshal_1"), String::from(MARSHAL)),
            (String::from("bind_b_unmarshal_1"), String::from(UNMARSHAL)),
            (
                String::from("bind_b_newinstance"),
                String::from("()Lcom/example/Order;")
            ),
        ]
    );

    // Context calls can throw, so the marshaller says so
    let marshal = &order.methods[1];
    let attribute_names: Vec<&str> = marshal
        .attributes
        .iter()
        .filter_map(|attribute| order.constants.attribute_name(attribute))
        .collect();
    assert_eq!(attribute_names, vec![Code::NAME, Exceptions::NAME]);
    let exceptions: Exceptions = marshal.attributes[1].decode().unwrap();
    assert_eq!(exceptions.0.len(), 1);
    assert_eq!(
        order.constants.class_name(exceptions.0[0]),
        Some("org/bindweave/runtime/BindingException")
    );

    // The factory is the one method that never throws
    let factory = &order.methods[3];
    assert_eq!(factory.attributes.len(), 1);
}

#[test]
fn weaving_is_deterministic() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    for dir in [&first, &second] {
        write_order_item(dir.path());
        let session = session(&[dir.path()]);
        let report = Weaver::new(&session)
            .weave(&[binding("b", &[ORDER_MAPPING, ITEM_MAPPING])])
            .unwrap();
        session.commit(&report.dispositions).unwrap();
    }

    for class in ["com/example/Item", "com/example/Order"] {
        let first = fs::read(class_path(first.path(), class)).unwrap();
        let second = fs::read(class_path(second.path(), class)).unwrap();
        assert_eq!(first, second, "{} differs between runs", class);
    }
}

#[test]
fn rerun_changes_nothing() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());
    let bindings = [binding("b", &[ITEM_MAPPING, ORDER_MAPPING])];

    let session1 = session(&[dir.path()]);
    let report = Weaver::new(&session1).weave(&bindings).unwrap();
    session1.commit(&report.dispositions).unwrap();
    let item = fs::read(class_path(dir.path(), "com/example/Item")).unwrap();
    let order = fs::read(class_path(dir.path(), "com/example/Order")).unwrap();

    let session2 = session(&[dir.path()]);
    let report2 = Weaver::new(&session2).weave(&bindings).unwrap();
    assert!(report2.dispositions.modified.is_empty());
    assert_eq!(
        report2.dispositions.unchanged,
        names(&["com/example/Item", "com/example/Order"])
    );
    assert_eq!(report2.purged, 0);
    assert_eq!(report.methods, report2.methods);
    session2.commit(&report2.dispositions).unwrap();

    assert_eq!(item, fs::read(class_path(dir.path(), "com/example/Item")).unwrap());
    assert_eq!(order, fs::read(class_path(dir.path(), "com/example/Order")).unwrap());
}

#[test]
fn identical_methods_are_shared() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());

    let session = session(&[dir.path()]);
    let report = Weaver::new(&session)
        .weave(&[binding("a", &[ITEM_MAPPING]), binding("b", &[ITEM_MAPPING])])
        .unwrap();
    session.commit(&report.dispositions).unwrap();

    assert_eq!(report.methods.len(), 6);
    assert_eq!(report.methods[..3], report.methods[3..]);
    let item = read_class(dir.path(), "com/example/Item");
    assert_eq!(
        method_names(&item),
        vec!["<init>", "bind_a_marshal_1", "bind_a_unmarshal_1", "bind_a_newinstance"]
    );
}

#[test]
fn stale_methods_are_purged() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());

    let session1 = session(&[dir.path()]);
    let report = Weaver::new(&session1)
        .weave(&[binding("a", &[ITEM_MAPPING])])
        .unwrap();
    session1.commit(&report.dispositions).unwrap();

    // Different fields make for different code, but the factory comes out the same
    let session2 = session(&[dir.path()]);
    let report = Weaver::new(&session2)
        .weave(&[binding("b", &["com.example.Item=item:name"])])
        .unwrap();
    assert_eq!(report.purged, 2);
    assert_eq!(report.dispositions.modified, names(&["com/example/Item"]));
    session2.commit(&report.dispositions).unwrap();

    let item = read_class(dir.path(), "com/example/Item");
    let methods: BTreeSet<String> = method_names(&item).into_iter().collect();
    let expected: BTreeSet<String> = [
        "<init>",
        "bind_a_newinstance",
        "bind_b_marshal_1",
        "bind_b_unmarshal_1",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();
    assert_eq!(methods, expected);
}

#[test]
fn obsolete_method_gives_up_its_name() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());

    let session1 = session(&[dir.path()]);
    let report = Weaver::new(&session1)
        .weave(&[binding("a", &[ITEM_MAPPING])])
        .unwrap();
    session1.commit(&report.dispositions).unwrap();
    let before = read_class(dir.path(), "com/example/Item");

    let session2 = session(&[dir.path()]);
    let report = Weaver::new(&session2)
        .weave(&[binding("a", &["com.example.Item=item:name"])])
        .unwrap();
    assert_eq!(report.purged, 0);
    session2.commit(&report.dispositions).unwrap();
    let after = read_class(dir.path(), "com/example/Item");

    let mut before_names = method_names(&before);
    let mut after_names = method_names(&after);
    before_names.sort();
    after_names.sort();
    assert_eq!(before_names, after_names);

    // Same name, new body
    let marshal_code = |class: &ClassFile| -> Code {
        let idx = method_names(class)
            .iter()
            .position(|name| name == "bind_a_marshal_1")
            .unwrap();
        class.methods[idx].attributes[0].decode().unwrap()
    };
    assert!(marshal_code(&after).code_array.len() < marshal_code(&before).code_array.len());
}

#[test]
fn subclass_methods_get_deeper_suffix() {
    let dir = TempDir::new().unwrap();
    Fixture::class("com/example/Base")
        .field("id", "Ljava/lang/String;")
        .write(dir.path());
    Fixture::class("com/example/Special")
        .extends("com/example/Base")
        .field("level", "I")
        .write(dir.path());

    let session = session(&[dir.path()]);
    let report = Weaver::new(&session)
        .weave(&[binding(
            "b",
            &["com.example.Base=base:id", "com.example.Special=special:id,level"],
        )])
        .unwrap();
    session.commit(&report.dispositions).unwrap();

    let special = read_class(dir.path(), "com/example/Special");
    let names = method_names(&special);
    assert!(names.contains(&String::from("bind_b_marshal_2")));
    assert!(names.contains(&String::from("bind_b_unmarshal_2")));
}

#[test]
fn abstract_class_gets_no_factory() {
    let dir = TempDir::new().unwrap();
    Fixture::class("com/example/Shape")
        .abstract_class()
        .field("sides", "I")
        .write(dir.path());

    let session = session(&[dir.path()]);
    let report = Weaver::new(&session)
        .weave(&[binding("b", &["com.example.Shape=shape:sides"])])
        .unwrap();
    assert_eq!(report.methods.len(), 2);
}

#[test]
fn private_fields_work_in_place() {
    let dir = TempDir::new().unwrap();
    Fixture::class("com/example/Secret")
        .field_with(FieldAccessFlags::PRIVATE, "code", "Ljava/lang/String;")
        .write(dir.path());

    let session = session(&[dir.path()]);
    let report = Weaver::new(&session)
        .weave(&[binding("b", &["com.example.Secret=secret:code"])])
        .unwrap();
    assert_eq!(report.dispositions.modified, names(&["com/example/Secret"]));
}

#[test]
fn binding_errors_are_configuration_errors() {
    let dir = TempDir::new().unwrap();
    write_order_item(dir.path());
    let session = session(&[dir.path()]);
    let weaver = Weaver::new(&session);

    let err = weaver
        .weave(&[binding("b", &["com.example.Item=item:missing"])])
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::MissingMember { .. })));
    assert_eq!(err.category(), ErrorCategory::Configuration);

    let err = weaver
        .weave(&[binding("b", &["com.example.Nowhere=x"])])
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::MissingClass(_))));

    // Lists can't be written as text
    let err = weaver
        .weave(&[binding("b", &["com.example.Order=order:items"])])
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::UnsupportedBinding { .. })));

    let err = weaver
        .weave(&[binding("no.good", &[ITEM_MAPPING])])
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::UnsupportedBinding { .. })));

    // Nothing was written out
    let item = read_class(dir.path(), "com/example/Item");
    assert_eq!(method_names(&item), vec!["<init>"]);
}
