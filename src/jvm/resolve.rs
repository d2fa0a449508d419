//! Member lookup through the class hierarchy

use super::{
    BaseType, BinaryName, ClassModel, ClassRegistry, Error, FieldType, MemberItem,
    MethodDescriptor, Name, RefType, RenderDescriptor, Visibility,
};
use std::collections::HashSet;

impl ClassRegistry {
    /// Find a field by name, in the class or else in the nearest superclass where it is visible
    pub fn find_field<'a>(
        &'a self,
        class: &'a ClassModel,
        name: &str,
    ) -> Result<Option<&'a MemberItem>, Error> {
        let package = class.package();
        let mut current = Some(class);
        let mut inherited = false;
        while let Some(cls) = current {
            if let Some(field) = cls.declared_field(name) {
                if !inherited || visible_from(field, package) {
                    return Ok(Some(field));
                }
            }
            inherited = true;
            current = match cls.superclass_name() {
                Some(superclass) => Some(self.require_class(superclass.as_str())?),
                None => None,
            };
        }
        Ok(None)
    }

    /// Find a method by name and descriptor prefix (eg. `(Ljava/lang/String;` or even just `(`)
    ///
    /// Interfaces are only searched for abstract classes and interfaces, since a concrete class
    /// must implement (or inherit) everything its interfaces declare.
    pub fn find_method<'a>(
        &'a self,
        class: &'a ClassModel,
        name: &str,
        descriptor_prefix: &str,
    ) -> Result<Option<&'a MemberItem>, Error> {
        let package = class.package();
        for (idx, cls) in self.lookup_order(class)?.into_iter().enumerate() {
            let found = cls.methods().find(|method| {
                method.name().as_str() == name
                    && method.descriptor().starts_with(descriptor_prefix)
                    && (idx == 0 || visible_from(method, package))
            });
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Find the method which best fits a call with the given argument types
    ///
    /// An exact match is always preferred. Otherwise, every candidate whose parameters accept the
    /// arguments (and whose return type is assignable to the desired return type, if there is one)
    /// is ranked by how many arguments need coercion. Ties go to the first candidate found, in
    /// lookup order (the class itself, then its superclasses, then interfaces).
    pub fn find_best_method<'a>(
        &'a self,
        class: &'a ClassModel,
        name: &str,
        desired_return: Option<&FieldType<BinaryName>>,
        desired_args: &[FieldType<BinaryName>],
    ) -> Result<Option<&'a MemberItem>, Error> {
        let package = class.package();
        let mut best: Option<(usize, &MemberItem)> = None;

        for (idx, cls) in self.lookup_order(class)?.into_iter().enumerate() {
            for method in cls.methods() {
                if method.name().as_str() != name || (idx > 0 && !visible_from(method, package)) {
                    continue;
                }
                let descriptor = match method.method_descriptor() {
                    Some(descriptor) => descriptor,
                    None => continue,
                };
                if descriptor.parameters.len() != desired_args.len() {
                    continue;
                }

                let return_fits = match (desired_return, &descriptor.return_type) {
                    (None, _) => true,
                    (Some(desired), Some(actual)) => self.is_assignable(actual, desired)?,
                    (Some(_), None) => false,
                };
                if !return_fits {
                    continue;
                }

                let mut coerced = 0;
                let mut fits = true;
                for (desired, parameter) in desired_args.iter().zip(&descriptor.parameters) {
                    if desired == parameter {
                        continue;
                    }
                    if !self.is_assignable(desired, parameter)? {
                        fits = false;
                        break;
                    }
                    coerced += 1;
                }
                if !fits {
                    continue;
                }

                let exact = coerced == 0
                    && desired_return.map_or(true, |ret| descriptor.return_type.as_ref() == Some(ret));
                if exact {
                    return Ok(Some(method));
                }
                if best.map_or(true, |(best_coerced, _)| coerced < best_coerced) {
                    best = Some((coerced, method));
                }
            }
        }

        if let Some((coerced, method)) = best {
            log::debug!("Best fit for {}.{} is {} ({} coerced)", class.name(), name, method, coerced);
        }
        Ok(best.map(|(_, method)| method))
    }

    /// Classes searched for members of a class, in order
    fn lookup_order<'a>(&'a self, class: &'a ClassModel) -> Result<Vec<&'a ClassModel>, Error> {
        let mut order = vec![class];
        let mut current = class;
        while let Some(superclass) = current.superclass_name() {
            current = self.require_class(superclass.as_str())?;
            order.push(current);
        }

        if class.is_abstract() || class.is_interface() {
            let mut seen: HashSet<&str> = order.iter().map(|cls| cls.name().as_str()).collect();
            let mut next = 0;
            while next < order.len() {
                let cls = order[next];
                for interface in cls.interface_names() {
                    if seen.insert(interface.as_str()) {
                        order.push(self.require_class(interface.as_str())?);
                    }
                }
                next += 1;
            }
        }
        Ok(order)
    }

    /// Can a value of type `from` be used where `to` is expected?
    ///
    /// Primitives follow the widening conversions, references follow the class hierarchy, and the
    /// two never mix.
    pub fn is_assignable(
        &self,
        from: &FieldType<BinaryName>,
        to: &FieldType<BinaryName>,
    ) -> Result<bool, Error> {
        match (from, to) {
            (FieldType::Base(from), FieldType::Base(to)) => Ok(widens_to(*from, *to)),
            (FieldType::Ref(from), FieldType::Ref(to)) => self.is_ref_assignable(from, to),
            _ => Ok(false),
        }
    }

    pub fn is_ref_assignable(
        &self,
        from: &RefType<BinaryName>,
        to: &RefType<BinaryName>,
    ) -> Result<bool, Error> {
        match (from, to) {
            (RefType::Object(from), RefType::Object(to)) => {
                if from == to {
                    return Ok(true);
                }
                self.is_instance_of(from.as_str(), to.as_str())
            }

            // Superclass and interfaces of all arrays
            (_, RefType::Object(to)) => Ok(*to == BinaryName::OBJECT
                || *to == BinaryName::CLONEABLE
                || *to == BinaryName::SERIALIZABLE),

            (RefType::Object(_), _) => Ok(false),

            // Arrays are covariant in their (reference) element type
            (from, to) => match (from.element_type(), to.element_type()) {
                (Some(FieldType::Ref(from)), Some(FieldType::Ref(to))) => {
                    self.is_ref_assignable(&from, &to)
                }
                (Some(from), Some(to)) => Ok(from == to),
                _ => Ok(false),
            },
        }
    }
}

impl ClassRegistry {
    /// Can code in `accessor` use the member directly?
    pub fn is_accessible_from(&self, member: &MemberItem, accessor: &ClassModel) -> Result<bool, Error> {
        let owner = member.class_name();
        if owner == accessor.name() {
            return Ok(true);
        }
        Ok(match member.visibility() {
            Visibility::Public => true,
            Visibility::Private => false,
            Visibility::Package => owner.package() == accessor.package(),
            Visibility::Protected => {
                owner.package() == accessor.package()
                    || self.is_superclass_of(owner.as_str(), accessor.name().as_str())?
            }
        })
    }

    /// Can code in `accessor` use an instance member of an object of type `receiver`?
    ///
    /// Protected members reached only through inheritance need the object to be an instance of
    /// the accessor itself, not just of the class declaring the member.
    pub fn is_accessible_through(
        &self,
        member: &MemberItem,
        accessor: &ClassModel,
        receiver: &ClassModel,
    ) -> Result<bool, Error> {
        if !self.is_accessible_from(member, accessor)? {
            return Ok(false);
        }
        let owner = member.class_name();
        if member.visibility() != Visibility::Protected
            || member.is_static()
            || owner == accessor.name()
            || owner.package() == accessor.package()
        {
            return Ok(true);
        }
        self.is_instance_of(receiver.name().as_str(), accessor.name().as_str())
    }
}

fn visible_from(member: &MemberItem, package: &str) -> bool {
    match member.visibility() {
        Visibility::Public | Visibility::Protected => true,
        Visibility::Package => member.class_name().package() == package,
        Visibility::Private => false,
    }
}

/// Primitive widening (plus identity)
fn widens_to(from: BaseType, to: BaseType) -> bool {
    use BaseType::*;

    if from == to {
        return true;
    }
    match from {
        Byte => matches!(to, Short | Int | Long | Float | Double),
        Short | Char => matches!(to, Int | Long | Float | Double),
        Int => matches!(to, Long | Float | Double),
        Long => matches!(to, Float | Double),
        Float => to == Double,
        Double | Boolean => false,
    }
}

/// Descriptor of a method with the given signature
pub fn method_descriptor(
    parameters: Vec<FieldType<BinaryName>>,
    return_type: Option<FieldType<BinaryName>>,
) -> String {
    MethodDescriptor {
        parameters,
        return_type,
    }
    .render()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::{ClassAccessFlags, MethodAccessFlags, UnqualifiedName};
    use crate::settings::Settings;
    use std::path::PathBuf;

    /// Class declaring the given methods, in order
    fn class_with<'r>(
        registry: &'r ClassRegistry,
        name: &str,
        methods: &[(&str, &str)],
    ) -> &'r ClassModel {
        let model = ClassModel::synthetic(
            BinaryName::from_string(name.to_owned()).unwrap(),
            BinaryName::OBJECT,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            Version::JAVA5,
            PathBuf::from("out"),
        )
        .unwrap();
        let class = registry.add_class(model).unwrap();
        for (method, descriptor) in methods {
            registry
                .add_method(
                    class,
                    UnqualifiedName::from_string(method.to_string()).unwrap(),
                    descriptor,
                    MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                    vec![],
                    vec![],
                )
                .unwrap();
        }
        class
    }

    fn best<'r>(
        registry: &'r ClassRegistry,
        class: &'r ClassModel,
        name: &str,
        args: &[FieldType<BinaryName>],
    ) -> Option<&'r str> {
        registry
            .find_best_method(class, name, None, args)
            .unwrap()
            .map(|method| method.descriptor())
    }

    fn string() -> FieldType<BinaryName> {
        FieldType::object(BinaryName::STRING)
    }

    #[test]
    fn fewest_coercions_win() {
        let registry = ClassRegistry::new(Settings::new(vec![]).unwrap());
        let sink = class_with(
            &registry,
            "com/example/Sink",
            &[
                ("accept", "(JLjava/lang/Object;)V"),
                ("accept", "(ILjava/lang/Object;)V"),
                ("take", "(J)V"),
                ("take", "(I)V"),
                ("take", "(Z)V"),
            ],
        );
        let int = FieldType::Base(BaseType::Int);

        assert_eq!(
            best(&registry, sink, "accept", &[int.clone(), string()]),
            Some("(ILjava/lang/Object;)V")
        );

        // An exact match wins even when declared last
        assert_eq!(best(&registry, sink, "take", &[int.clone()]), Some("(I)V"));
        assert_eq!(
            best(&registry, sink, "take", &[FieldType::Base(BaseType::Char)]),
            Some("(J)V")
        );
        assert_eq!(best(&registry, sink, "take", &[FieldType::Base(BaseType::Double)]), None);
        assert_eq!(best(&registry, sink, "accept", &[int]), None);
    }

    #[test]
    fn ties_go_to_first_declared() {
        let registry = ClassRegistry::new(Settings::new(vec![]).unwrap());
        let sink = class_with(
            &registry,
            "com/example/Sink",
            &[("put", "(FLjava/lang/String;)V"), ("put", "(JLjava/lang/String;)V")],
        );
        assert_eq!(
            best(&registry, sink, "put", &[FieldType::Base(BaseType::Int), string()]),
            Some("(FLjava/lang/String;)V")
        );
    }

    #[test]
    fn short_serializes_as_int() {
        let registry = ClassRegistry::new(Settings::new(vec![]).unwrap());
        let utility = registry
            .require_class(registry.settings().utility_class.as_str())
            .unwrap();
        let serialize = registry
            .find_best_method(
                utility,
                "serialize",
                Some(&string()),
                &[FieldType::Base(BaseType::Short)],
            )
            .unwrap()
            .unwrap();
        assert_eq!(serialize.descriptor(), "(I)Ljava/lang/String;");
    }

    #[test]
    fn primitive_widening() {
        assert!(widens_to(BaseType::Byte, BaseType::Int));
        assert!(widens_to(BaseType::Char, BaseType::Long));
        assert!(widens_to(BaseType::Int, BaseType::Double));
        assert!(!widens_to(BaseType::Char, BaseType::Short));
        assert!(!widens_to(BaseType::Short, BaseType::Char));
        assert!(!widens_to(BaseType::Boolean, BaseType::Int));
        assert!(!widens_to(BaseType::Int, BaseType::Boolean));
        assert!(!widens_to(BaseType::Double, BaseType::Float));
        assert!(widens_to(BaseType::Boolean, BaseType::Boolean));
    }
}
