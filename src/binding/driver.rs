use super::{BindingDefinition, Mapping, MemberBinding, ValueStyle};
use crate::jvm::code::{AssemblerConfig, EqComparison, MethodAssembler, OrdComparison};
use crate::jvm::{
    method_descriptor, BaseType, BinaryName, ClassModel, ConfigError, Error, FieldType, MemberItem,
    MethodAccessFlags, Name, RefType, UnqualifiedName,
};
use crate::munge::Dispositions;
use crate::session::Session;

/// What a weaving run did
#[derive(Debug)]
pub struct WeaveReport {
    /// Every generated method, whether new or shared
    pub methods: Vec<String>,

    /// Generated methods from earlier runs which were deleted
    pub purged: usize,
    pub dispositions: Dispositions,
}

/// Generates marshal, unmarshal, and factory methods for binding definitions
pub struct Weaver<'s> {
    session: &'s Session,
}

impl<'s> Weaver<'s> {
    pub fn new(session: &'s Session) -> Weaver<'s> {
        Weaver { session }
    }

    /// Weave all the bindings into their classes
    ///
    /// This ends with the dispositions of the touched classes, but leaves the commit to the
    /// caller.
    pub fn weave(&self, bindings: &[BindingDefinition]) -> Result<WeaveReport, Error> {
        // Note every class before hosting anything, so the adapter package is predictable
        let mut mappings = vec![];
        for binding in bindings {
            if UnqualifiedName::check_valid(&binding.name).is_err() || binding.name.contains('<') {
                return Err(unsupported(&binding.name, "binding name is not a valid identifier"));
            }
            for mapping in &binding.mappings {
                let target = self.target_class(mapping)?;
                self.session.note_bound_class(target)?;
                mappings.push((binding, mapping, target));
            }
        }

        let bound: Vec<&ClassModel> = mappings.iter().map(|(_, _, target)| *target).collect();
        let mut methods = vec![];
        for &(binding, mapping, target) in &mappings {
            log::info!("Weaving <{}> into {}", mapping.element, target.name());
            let context = self.bound_subclass(target, &bound)?;
            let decision = self.session.resolve_host(target, context)?;
            let generator = MappingWeaver {
                session: self.session,
                binding,
                mapping,
                target,
                host: self.session.host_class(target, &decision)?,
                direct: decision.is_direct(),
            };
            methods.push(generator.marshaller()?.to_string());
            methods.push(generator.unmarshaller()?.to_string());
            if let Some(factory) = generator.factory()? {
                methods.push(factory.to_string());
            }
        }

        self.session.adopt_stale_adapter()?;
        let purged = self.session.purge_unused_methods()?;
        let dispositions = self.session.finalize_dispositions()?;
        Ok(WeaveReport {
            methods,
            purged,
            dispositions,
        })
    }

    /// First bound class able to host code for a target which can't host its own
    fn bound_subclass(
        &self,
        target: &ClassModel,
        bound: &[&'s ClassModel],
    ) -> Result<Option<&'s ClassModel>, Error> {
        if target.is_modifiable() {
            return Ok(None);
        }
        let registry = self.session.registry();
        for class in bound {
            if class.is_modifiable()
                && registry.is_superclass_of(target.name().as_str(), class.name().as_str())?
            {
                return Ok(Some(*class));
            }
        }
        Ok(None)
    }

    fn target_class(&self, mapping: &Mapping) -> Result<&'s ClassModel, Error> {
        let name = if mapping.class.contains('/') {
            BinaryName::from_string(mapping.class.clone())
        } else {
            BinaryName::from_java_name(&mapping.class)
        };
        let name = name.map_err(ConfigError::MalformedName)?;
        self.session.registry().require_class(name.as_str())
    }
}

fn unsupported(binding: &str, message: impl Into<String>) -> Error {
    ConfigError::UnsupportedBinding {
        binding: binding.to_owned(),
        message: message.into(),
    }
    .into()
}

fn missing_member(class: &ClassModel, member: &str) -> Error {
    ConfigError::MissingMember {
        class: class.name().as_str().to_owned(),
        member: member.to_owned(),
    }
    .into()
}

/// Method generation for one mapping
struct MappingWeaver<'s, 'b> {
    session: &'s Session,
    binding: &'b BindingDefinition,
    mapping: &'b Mapping,
    target: &'s ClassModel,
    host: &'s ClassModel,

    /// Code goes in the target itself, as instance methods
    direct: bool,
}

impl<'s, 'b> MappingWeaver<'s, 'b> {
    fn method_name(&self, suffix: &str) -> Result<UnqualifiedName, Error> {
        let name = format!(
            "{}{}_{}",
            self.session.settings().method_prefix,
            self.binding.name,
            suffix
        );
        UnqualifiedName::from_string(name).map_err(|err| ConfigError::MalformedName(err).into())
    }

    /// Descriptor and flags of a method working on the target object and a context
    ///
    /// When hosted in the target, this is an instance method. Elsewhere, the object becomes the
    /// first argument of a static method. Either way, the object is in slot 0 and the context is
    /// in slot 1.
    fn signature(&self, context: &BinaryName) -> (String, MethodAccessFlags) {
        let context = FieldType::object(context.clone());
        if self.direct {
            (method_descriptor(vec![context], None), MethodAccessFlags::PUBLIC)
        } else {
            let object = FieldType::object(self.target.name().clone());
            (
                method_descriptor(vec![object, context], None),
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )
        }
    }

    fn assembler(&self, suffix: &str, context: &BinaryName) -> Result<MethodAssembler<'s>, Error> {
        let (descriptor, access_flags) = self.signature(context);
        let config = AssemblerConfig {
            accumulate_exceptions: true,
            object_slot: Some(0),
            context_slot: Some(1),
        };
        self.session.method_assembler(
            self.host,
            self.method_name(suffix)?,
            &descriptor,
            access_flags,
            config,
        )
    }

    fn class(&self, name: &BinaryName) -> Result<&'s ClassModel, Error> {
        self.session.registry().require_class(name.as_str())
    }

    fn method(
        &self,
        class: &'s ClassModel,
        name: &str,
        descriptor_prefix: &str,
    ) -> Result<&'s MemberItem, Error> {
        self.session
            .registry()
            .find_method(class, name, descriptor_prefix)?
            .ok_or_else(|| missing_member(class, &format!("{}{}", name, descriptor_prefix)))
    }

    /// Field of the target, checked to be usable from the host
    fn field(&self, member: &MemberBinding) -> Result<(&'s MemberItem, FieldType<BinaryName>), Error> {
        let registry = self.session.registry();
        let field = registry
            .find_field(self.target, &member.field)?
            .ok_or_else(|| missing_member(self.target, &member.field))?;
        if field.is_static() {
            return Err(unsupported(
                &self.binding.name,
                format!("field {} is static", field),
            ));
        }
        if !registry.is_accessible_through(field, self.host, self.target)? {
            return Err(ConfigError::Inaccessible {
                class: self.host.name().as_str().to_owned(),
                member: field.to_string(),
            }
            .into());
        }
        let field_type = field
            .field_type()
            .cloned()
            .ok_or_else(|| missing_member(self.target, &member.field))?;
        Ok((field, field_type))
    }

    /// Generate `<prefix><binding>_marshal`
    fn marshaller(&self) -> Result<&'s MemberItem, Error> {
        let settings = self.session.settings();
        let context = self.class(&settings.marshalling_context)?;
        let mut asm = self.assembler("marshal", &settings.marshalling_context)?;

        let start = self.method(context, "startElement", "(Ljava/lang/String;)V")?;
        let end = self.method(context, "endElement", "(Ljava/lang/String;)V")?;

        asm.load_context()?;
        asm.append_ldc_string(&self.mapping.element)?;
        asm.append_call(start)?;
        for member in &self.mapping.members {
            let (field, field_type) = self.field(member)?;
            match &member.style {
                ValueStyle::Text => self.marshal_text(&mut asm, context, member, field, &field_type)?,
                ValueStyle::Structure => self.marshal_structure(&mut asm, context, field)?,
                ValueStyle::Collection { .. } => {
                    self.marshal_collection(&mut asm, context, member, field, &field_type)?
                }
            }
        }
        asm.load_context()?;
        asm.append_ldc_string(&self.mapping.element)?;
        asm.append_call(end)?;
        asm.append_return()?;

        self.session.get_unique_method(asm, self.direct)
    }

    fn marshal_text(
        &self,
        asm: &mut MethodAssembler<'s>,
        context: &'s ClassModel,
        member: &MemberBinding,
        field: &'s MemberItem,
        field_type: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        let write = self.method(
            context,
            "writeElement",
            "(Ljava/lang/String;Ljava/lang/String;)V",
        )?;
        let string = FieldType::object(BinaryName::STRING);

        match field_type {
            FieldType::Base(_) => {
                let utility = self.class(&self.session.settings().utility_class)?;
                let serialize = self
                    .session
                    .registry()
                    .find_best_method(utility, "serialize", Some(&string), &[field_type.clone()])?
                    .ok_or_else(|| {
                        unsupported(&self.binding.name, format!("no conversion to text for {}", field))
                    })?;
                asm.load_context()?;
                asm.append_ldc_string(&member.element)?;
                asm.load_object()?;
                asm.append_get_field(field)?;
                asm.append_call(serialize)?;
                asm.append_call(write)?;
            }
            _ if *field_type == string => {
                // Absent strings get no element at all
                let value = asm.add_local(string);
                asm.load_object()?;
                asm.append_get_field(field)?;
                asm.append_store_local(value)?;
                asm.append_load_local(value)?;
                let skip = asm.append_ifnull(EqComparison::EQ)?;
                asm.load_context()?;
                asm.append_ldc_string(&member.element)?;
                asm.append_load_local(value)?;
                asm.append_call(write)?;
                asm.target_next(skip);
            }
            _ => {
                return Err(unsupported(
                    &self.binding.name,
                    format!("text value {} must be a primitive or a string", field),
                ))
            }
        }
        Ok(())
    }

    fn marshal_structure(
        &self,
        asm: &mut MethodAssembler<'s>,
        context: &'s ClassModel,
        field: &'s MemberItem,
    ) -> Result<(), Error> {
        let marshal = self.method(context, "marshalObject", "(Ljava/lang/Object;)V")?;

        // The null check leaves the value behind on the skip path
        asm.load_object()?;
        asm.append_get_field(field)?;
        asm.append_dup()?;
        let skip = asm.append_ifnull(EqComparison::EQ)?;
        asm.load_context()?;
        asm.append_swap()?;
        asm.append_call(marshal)?;
        asm.target_next(skip);
        Ok(())
    }

    fn marshal_collection(
        &self,
        asm: &mut MethodAssembler<'s>,
        context: &'s ClassModel,
        member: &MemberBinding,
        field: &'s MemberItem,
        field_type: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        let registry = self.session.registry();
        let collection_type = FieldType::object(BinaryName::COLLECTION);
        if !registry.is_assignable(field_type, &collection_type)? {
            return Err(unsupported(
                &self.binding.name,
                format!("collection {} is not a java.util.Collection", field),
            ));
        }
        let collection = match field_type {
            FieldType::Ref(RefType::Object(name)) => self.class(name)?,
            _ => self.class(&BinaryName::COLLECTION)?,
        };
        let iterator_class = self.class(&BinaryName::ITERATOR)?;
        let iterator = self.method(collection, "iterator", "()")?;
        let has_next = self.method(iterator_class, "hasNext", "()Z")?;
        let next = self.method(iterator_class, "next", "()")?;
        let start = self.method(context, "startElement", "(Ljava/lang/String;)V")?;
        let end = self.method(context, "endElement", "(Ljava/lang/String;)V")?;
        let marshal = self.method(context, "marshalObject", "(Ljava/lang/Object;)V")?;

        asm.load_object()?;
        asm.append_get_field(field)?;
        asm.append_dup()?;
        let skip = asm.append_ifnull(EqComparison::EQ)?;
        let items = asm.add_local(FieldType::object(BinaryName::ITERATOR));
        asm.append_call(iterator)?;
        asm.append_store_local(items)?;
        asm.load_context()?;
        asm.append_ldc_string(&member.element)?;
        asm.append_call(start)?;

        let top = asm.define_target()?;
        asm.append_load_local(items)?;
        asm.append_call(has_next)?;
        let done = asm.append_if(OrdComparison::EQ)?;
        asm.load_context()?;
        asm.append_load_local(items)?;
        asm.append_call(next)?;
        asm.append_call(marshal)?;
        asm.append_goto_target(top)?;

        asm.target_next(done);
        asm.load_context()?;
        asm.append_ldc_string(&member.element)?;
        asm.append_call(end)?;
        asm.target_next(skip);
        Ok(())
    }

    /// Generate `<prefix><binding>_unmarshal`
    fn unmarshaller(&self) -> Result<&'s MemberItem, Error> {
        let settings = self.session.settings();
        let context = self.class(&settings.unmarshalling_context)?;
        let mut asm = self.assembler("unmarshal", &settings.unmarshalling_context)?;

        let start = self.method(context, "parsePastStartTag", "(Ljava/lang/String;)V")?;
        let end = self.method(context, "parsePastEndTag", "(Ljava/lang/String;)V")?;

        asm.load_context()?;
        asm.append_ldc_string(&self.mapping.element)?;
        asm.append_call(start)?;
        for member in &self.mapping.members {
            let (field, field_type) = self.field(member)?;
            match &member.style {
                ValueStyle::Text => {
                    self.unmarshal_text(&mut asm, context, member, field, &field_type)?
                }
                ValueStyle::Structure => {
                    self.unmarshal_structure(&mut asm, context, member, field, &field_type)?
                }
                ValueStyle::Collection { item_element } => self.unmarshal_collection(
                    &mut asm,
                    context,
                    member,
                    item_element,
                    field,
                    &field_type,
                )?,
            }
        }
        asm.load_context()?;
        asm.append_ldc_string(&self.mapping.element)?;
        asm.append_call(end)?;
        asm.append_return()?;

        self.session.get_unique_method(asm, self.direct)
    }

    fn unmarshal_text(
        &self,
        asm: &mut MethodAssembler<'s>,
        context: &'s ClassModel,
        member: &MemberBinding,
        field: &'s MemberItem,
        field_type: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        let text = self.method(
            context,
            "parseElementText",
            "(Ljava/lang/String;)Ljava/lang/String;",
        )?;
        let string = FieldType::object(BinaryName::STRING);
        let conversion = match field_type {
            FieldType::Base(base) => {
                let utility = self.class(&self.session.settings().utility_class)?;
                let name = parse_method_name(*base);
                let parse = self
                    .session
                    .registry()
                    .find_best_method(utility, &name, Some(field_type), &[string])?
                    .ok_or_else(|| {
                        unsupported(&self.binding.name, format!("no conversion from text for {}", field))
                    })?;
                Some(parse)
            }
            _ if *field_type == string => None,
            _ => {
                return Err(unsupported(
                    &self.binding.name,
                    format!("text value {} must be a primitive or a string", field),
                ))
            }
        };

        asm.load_object()?;
        asm.load_context()?;
        asm.append_ldc_string(&member.element)?;
        asm.append_call(text)?;
        if let Some(parse) = conversion {
            asm.append_call(parse)?;
        }
        asm.append_put_field(field)
    }

    fn unmarshal_structure(
        &self,
        asm: &mut MethodAssembler<'s>,
        context: &'s ClassModel,
        member: &MemberBinding,
        field: &'s MemberItem,
        field_type: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        let is_at = self.method(context, "isAt", "(Ljava/lang/String;)Z")?;
        let unmarshal = self.method(context, "unmarshalElement", "()")?;
        let value_type = match field_type {
            FieldType::Ref(ref_type) => ref_type.clone(),
            FieldType::Base(_) => {
                return Err(unsupported(
                    &self.binding.name,
                    format!("structure {} must be an object", field),
                ))
            }
        };

        // Missing optional structures leave the field alone
        asm.load_context()?;
        asm.append_ldc_string(&member.element)?;
        asm.append_call(is_at)?;
        let skip = asm.append_if(OrdComparison::EQ)?;
        asm.load_object()?;
        asm.load_context()?;
        asm.append_call(unmarshal)?;
        asm.append_checkcast(value_type)?;
        asm.append_put_field(field)?;
        asm.target_next(skip);
        Ok(())
    }

    fn unmarshal_collection(
        &self,
        asm: &mut MethodAssembler<'s>,
        context: &'s ClassModel,
        member: &MemberBinding,
        item_element: &str,
        field: &'s MemberItem,
        field_type: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        let registry = self.session.registry();
        let list_type = FieldType::object(BinaryName::ARRAYLIST);
        if !registry.is_assignable(&list_type, field_type)? {
            return Err(unsupported(
                &self.binding.name,
                format!("collection {} cannot hold a java.util.ArrayList", field),
            ));
        }
        let list = self.class(&BinaryName::ARRAYLIST)?;
        let constructor = list
            .declared_method(UnqualifiedName::INIT.as_str(), "()V")
            .ok_or_else(|| missing_member(list, "<init>()V"))?;
        let add = self.method(list, "add", "(Ljava/lang/Object;)Z")?;
        let start = self.method(context, "parsePastStartTag", "(Ljava/lang/String;)V")?;
        let end = self.method(context, "parsePastEndTag", "(Ljava/lang/String;)V")?;
        let is_at = self.method(context, "isAt", "(Ljava/lang/String;)Z")?;
        let unmarshal = self.method(context, "unmarshalElement", "()")?;

        asm.load_context()?;
        asm.append_ldc_string(&member.element)?;
        asm.append_call(start)?;
        let items = asm.add_local(list_type);
        asm.append_new(list.name())?;
        asm.append_dup()?;
        asm.append_call(constructor)?;
        asm.append_store_local(items)?;

        let top = asm.define_target()?;
        asm.load_context()?;
        asm.append_ldc_string(item_element)?;
        asm.append_call(is_at)?;
        let done = asm.append_if(OrdComparison::EQ)?;
        asm.append_load_local(items)?;
        asm.load_context()?;
        asm.append_call(unmarshal)?;
        asm.append_call(add)?;
        asm.append_pop()?;
        asm.append_goto_target(top)?;

        asm.target_next(done);
        asm.load_context()?;
        asm.append_ldc_string(&member.element)?;
        asm.append_call(end)?;
        asm.load_object()?;
        asm.append_load_local(items)?;
        asm.append_put_field(field)
    }

    /// Generate `<prefix><binding>_newinstance`, unless the target can't be instantiated
    fn factory(&self) -> Result<Option<&'s MemberItem>, Error> {
        if self.target.is_abstract() || self.target.is_interface() {
            log::debug!("No factory for abstract {}", self.target.name());
            return Ok(None);
        }
        let constructor = self
            .target
            .declared_method(UnqualifiedName::INIT.as_str(), "()V")
            .ok_or_else(|| missing_member(self.target, "<init>()V"))?;
        if !self
            .session
            .registry()
            .is_accessible_through(constructor, self.host, self.target)?
        {
            return Err(ConfigError::Inaccessible {
                class: self.host.name().as_str().to_owned(),
                member: constructor.to_string(),
            }
            .into());
        }

        let descriptor = method_descriptor(vec![], Some(FieldType::object(self.target.name().clone())));
        let mut asm = self.session.method_assembler(
            self.host,
            self.method_name("newinstance")?,
            &descriptor,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            AssemblerConfig::default(),
        )?;
        asm.append_new(self.target.name())?;
        asm.append_dup()?;
        asm.append_call(constructor)?;
        asm.append_return()?;

        self.session.get_unique_method(asm, false).map(Some)
    }
}

/// `Utility` method converting text to a primitive (eg. `parseInt`)
fn parse_method_name(base: BaseType) -> String {
    let keyword = base.keyword();
    let mut name = String::from("parse");
    let mut chars = keyword.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name
}
