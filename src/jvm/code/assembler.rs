use super::{
    describe_stack, fits, merge, ArrayKind, BranchInstruction, BranchTarget, BranchWrapper,
    EqComparison, Instruction, InstructionEmitter, IntegralKind, InvokeType, LoadableConstant,
    NumericKind, OrdComparison, StackType, TargetState, ValueKind,
};
use crate::jvm::class_file::{Attribute, Code, ConstantsPool, Exceptions, Serialize};
use crate::jvm::{
    BaseType, BinaryName, ClassModel, ClassRegistry, Error, FieldType, InternalError,
    InternalErrorKind, MemberItem, MethodAccessFlags, MethodDescriptor, Name, RefType,
    UnqualifiedName,
};
use crate::util::Width;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Optional features of an assembler
///
/// Methods differ in what they have at hand: marshallers have an object being worked on and a
/// context, factories have neither. Asking for a slot which wasn't configured is an internal error.
#[derive(Clone, Debug, Default)]
pub struct AssemblerConfig {
    /// Add checked exceptions declared by called methods to this method's `throws` list
    pub accumulate_exceptions: bool,

    /// Local slot holding the object being worked on
    pub object_slot: Option<u16>,

    /// Local slot holding the marshalling or unmarshalling context
    pub context_slot: Option<u16>,
}

#[derive(Clone, Debug)]
enum CodeItem {
    Plain(Instruction),
    Branch(BranchInstruction<usize>),
    Label(usize),
}

/// What an instruction wants to find on the stack
enum Expect {
    Value(FieldType<BinaryName>),
    Reference,
    Array(ArrayKind),
    Category1,
    Category2,
}

/// Builds the body of one method, tracking the types on the operand stack as it goes
///
/// Every append first checks that the stack holds what the instruction consumes, then records
/// the instruction, then updates the stack. After a return, throw, or `goto` the stack is
/// undefined until a branch target makes the code reachable again.
///
/// ### Forward branches
///
/// Conditional branches and `goto` hand back a `BranchWrapper`. Passing that to `target_next`
/// makes the next appended instruction the branch target. Paths meeting there don't need
/// identical stacks: the target gets the shallowest of the incoming depths and deeper paths have
/// their excess entries popped (inline for the fall-through path, in small bridge blocks for the
/// branching paths).
///
/// ### Backward branches
///
/// Loops use `define_target` and `append_goto_target`. There, the stacks must match exactly.
pub struct MethodAssembler<'r> {
    registry: &'r ClassRegistry,
    class: &'r ClassModel,
    name: UnqualifiedName,
    descriptor: String,
    method_type: MethodDescriptor<BinaryName>,
    access_flags: MethodAccessFlags,
    config: AssemblerConfig,

    code: Vec<CodeItem>,

    /// Operand stack (`None` when the current position is unreachable)
    stack: Option<Vec<StackType>>,
    locals: BTreeMap<u16, FieldType<BinaryName>>,
    next_local: u16,
    max_stack: u16,

    /// Labels of branches handed out and not yet resolved
    outstanding: BTreeSet<usize>,

    /// Branches to resolve at the next instruction
    armed: Vec<BranchWrapper>,
    targets: Vec<TargetState>,
    next_label: usize,
    exceptions: Vec<BinaryName>,
}

impl<'r> MethodAssembler<'r> {
    pub fn new(
        registry: &'r ClassRegistry,
        class: &'r ClassModel,
        name: UnqualifiedName,
        descriptor: &str,
        access_flags: MethodAccessFlags,
        config: AssemblerConfig,
    ) -> Result<MethodAssembler<'r>, Error> {
        let method_type = registry
            .signatures()
            .method(descriptor)
            .map_err(|err| Error::internal(InternalErrorKind::BadDescriptor(err.to_string())))?
            .clone();

        let mut locals = BTreeMap::new();
        let mut next_local: u16 = 0;
        if !access_flags.contains(MethodAccessFlags::STATIC) {
            locals.insert(0, FieldType::object(class.name().clone()));
            next_local = 1;
        }
        for parameter in &method_type.parameters {
            locals.insert(next_local, parameter.clone());
            next_local += parameter.width() as u16;
        }

        Ok(MethodAssembler {
            registry,
            class,
            name,
            descriptor: descriptor.to_owned(),
            method_type,
            access_flags,
            config,
            code: vec![],
            stack: Some(vec![]),
            locals,
            next_local,
            max_stack: 0,
            outstanding: BTreeSet::new(),
            armed: vec![],
            targets: vec![],
            next_label: 0,
            exceptions: vec![],
        })
    }

    pub fn class(&self) -> &'r ClassModel {
        self.class
    }

    pub fn registry(&self) -> &'r ClassRegistry {
        self.registry
    }

    pub fn name(&self) -> &UnqualifiedName {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Current operand stack, if the current position is reachable
    pub fn stack(&self) -> Option<&[StackType]> {
        self.stack.as_deref()
    }

    fn tracking(&self) -> bool {
        self.registry.settings().track_branches
    }

    fn error(&self, kind: InternalErrorKind, instruction: Option<String>) -> Error {
        Error::Internal(InternalError {
            class: Some(self.class.name().as_str().to_owned()),
            method: Some(format!("{}{}", self.name, self.descriptor)),
            instruction,
            kind,
        })
    }

    fn fresh_label(&mut self) -> usize {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Declare a new local variable, returning its slot
    pub fn add_local(&mut self, field_type: FieldType<BinaryName>) -> u16 {
        let slot = self.next_local;
        self.next_local += field_type.width() as u16;
        self.locals.insert(slot, field_type);
        slot
    }

    fn local_type(&self, slot: u16) -> Result<&FieldType<BinaryName>, Error> {
        self.locals
            .get(&slot)
            .ok_or_else(|| self.error(InternalErrorKind::MissingLocal(slot), None))
    }

    /// Get ready to append an instruction: resolve armed branches and check reachability
    fn prepare(&mut self, instruction: &dyn Fn() -> String) -> Result<(), Error> {
        if !self.armed.is_empty() {
            self.reconcile()?;
        }
        if self.stack.is_none() {
            return Err(self.error(InternalErrorKind::UnreachableCode, Some(instruction())));
        }
        Ok(())
    }

    /// Resolve the armed branches at the current position
    fn reconcile(&mut self) -> Result<(), Error> {
        let armed = std::mem::take(&mut self.armed);
        let fall_through = self.stack.take();

        let mut paths: Vec<&[StackType]> = armed.iter().map(|b| b.stack.as_slice()).collect();
        if let Some(stack) = &fall_through {
            paths.push(stack);
        }
        let depth = paths.iter().map(|stack| stack.len()).min().unwrap_or(0);

        // Merge entries at matching depths
        let mut merged: Vec<StackType> = paths[0][..depth].to_vec();
        for path in &paths[1..] {
            for (entry, other) in merged.iter_mut().zip(path.iter()) {
                match merge(self.registry, entry, other)? {
                    Some(general) => *entry = general,
                    None => {
                        let kind = InternalErrorKind::IncompatibleMerge {
                            left: entry.describe(),
                            right: other.describe(),
                        };
                        return Err(self.error(kind, None));
                    }
                }
            }
        }

        let target = self.fresh_label();
        if let Some(stack) = &fall_through {
            for entry in stack[depth..].iter().rev() {
                self.code.push(CodeItem::Plain(InstructionEmitter::pop_for(entry)));
            }
        }

        let (direct, bridged): (Vec<&BranchWrapper>, Vec<&BranchWrapper>) =
            armed.iter().partition(|branch| branch.stack.len() == depth);
        if !bridged.is_empty() && fall_through.is_some() {
            self.code.push(CodeItem::Branch(BranchInstruction::Goto(target)));
        }
        for (idx, branch) in bridged.iter().enumerate() {
            self.code.push(CodeItem::Label(branch.label));
            for entry in branch.stack[depth..].iter().rev() {
                self.code.push(CodeItem::Plain(InstructionEmitter::pop_for(entry)));
            }
            if idx + 1 < bridged.len() {
                self.code.push(CodeItem::Branch(BranchInstruction::Goto(target)));
            }
        }
        for branch in &direct {
            self.code.push(CodeItem::Label(branch.label));
        }
        self.code.push(CodeItem::Label(target));

        if self.tracking() {
            log::debug!(
                "{}.{}: {} branch(es) ({} bridged) meet at {}{}",
                self.class.name(),
                self.name,
                armed.len(),
                bridged.len(),
                describe_stack(&merged),
                if fall_through.is_some() { " with fall-through" } else { "" },
            );
        }
        for branch in &armed {
            self.outstanding.remove(&branch.label);
        }
        self.stack = Some(merged);
        Ok(())
    }

    /// Make the next appended instruction the target of a forward branch
    pub fn target_next(&mut self, branch: BranchWrapper) {
        if self.tracking() {
            log::debug!(
                "{}.{}: branch {} targets next instruction",
                self.class.name(),
                self.name,
                branch.label
            );
        }
        self.armed.push(branch);
    }

    /// Pop an entry off the stack, checking it is what the instruction expects
    fn pop_expect(&mut self, expect: Expect, instruction: &dyn Fn() -> String) -> Result<StackType, Error> {
        let actual = match self.stack.as_mut().and_then(Vec::pop) {
            Some(actual) => actual,
            None => return Err(self.error(InternalErrorKind::StackUnderflow, Some(instruction()))),
        };
        let (ok, expected) = match &expect {
            Expect::Value(field_type) => (
                fits(self.registry, &actual, field_type)?,
                StackType::from_field_type(field_type).describe(),
            ),
            Expect::Reference => (actual.is_reference(), String::from("reference")),
            Expect::Array(kind) => {
                let ok = match &actual {
                    StackType::Null => true,
                    StackType::Reference(array) => match array.element_type() {
                        Some(element) => ArrayKind::of(&element) == *kind,
                        None => false,
                    },
                    _ => false,
                };
                (ok, format!("{:?} array", kind))
            }
            Expect::Category1 => (actual.width() == 1, String::from("category 1 value")),
            Expect::Category2 => (actual.width() == 2, String::from("category 2 value")),
        };
        if ok {
            Ok(actual)
        } else {
            let kind = InternalErrorKind::TypeMismatch {
                expected,
                found: actual.describe(),
            };
            Err(self.error(kind, Some(instruction())))
        }
    }

    fn push(&mut self, entry: StackType) {
        if let Some(stack) = self.stack.as_mut() {
            stack.push(entry);
            let depth: usize = stack.iter().map(Width::width).sum();
            self.max_stack = self.max_stack.max(depth as u16);
        }
    }

    fn field_type_of(&self, descriptor: &str) -> Result<FieldType<BinaryName>, Error> {
        self.registry
            .signatures()
            .field(descriptor)
            .cloned()
            .map_err(|err| Error::internal(InternalErrorKind::BadDescriptor(err.to_string())))
    }

    /// Append any non-branching instruction
    pub fn append_op(&mut self, instruction: Instruction) -> Result<(), Error> {
        let describe = || format!("{:?}", instruction);
        self.prepare(&describe)?;
        self.apply(&instruction, &describe)?;
        self.code.push(CodeItem::Plain(instruction.clone()));
        Ok(())
    }

    /// Check and apply the stack effect of an instruction
    fn apply(&mut self, instruction: &Instruction, describe: &dyn Fn() -> String) -> Result<(), Error> {
        use Instruction::*;

        match instruction {
            Nop => (),
            AConstNull => self.push(StackType::Null),
            IConst(_) => self.push(StackType::Int),
            LConst(_) => self.push(StackType::Long),
            FConst(_) => self.push(StackType::Float),
            DConst(_) => self.push(StackType::Double),
            Ldc(LoadableConstant::String(_)) => self.push(StackType::object(BinaryName::STRING)),
            Ldc(LoadableConstant::Class(_)) => {
                self.push(StackType::object(BinaryName::name("java/lang/Class")))
            }
            Load(kind, slot) => {
                let local = self.local_type(*slot)?.clone();
                if ValueKind::of(&local) != *kind {
                    let kind = InternalErrorKind::TypeMismatch {
                        expected: format!("{:?} local", kind),
                        found: StackType::from_field_type(&local).describe(),
                    };
                    return Err(self.error(kind, Some(describe())));
                }
                self.push(StackType::from_field_type(&local));
            }
            Store(_, slot) => {
                let local = self.local_type(*slot)?.clone();
                self.pop_expect(Expect::Value(local), describe)?;
            }
            IInc(slot, _) => {
                let local = self.local_type(*slot)?;
                if ValueKind::of(local) != ValueKind::Int {
                    let kind = InternalErrorKind::TypeMismatch {
                        expected: String::from("int local"),
                        found: StackType::from_field_type(local).describe(),
                    };
                    return Err(self.error(kind, Some(describe())));
                }
            }
            ArrayLoad(kind) => {
                self.pop_expect(Expect::Value(FieldType::int()), describe)?;
                let array = self.pop_expect(Expect::Array(*kind), describe)?;
                let element = match array {
                    StackType::Reference(array) => array.element_type(),
                    _ => None,
                };
                match element {
                    Some(element) => self.push(StackType::from_field_type(&element)),
                    None => self.push(array_kind_default(*kind)),
                }
            }
            ArrayStore(kind) => {
                let value = match kind {
                    ArrayKind::Reference => Expect::Reference,
                    other => Expect::Value(FieldType::Base(array_kind_base(*other))),
                };
                self.pop_expect(value, describe)?;
                self.pop_expect(Expect::Value(FieldType::int()), describe)?;
                self.pop_expect(Expect::Array(*kind), describe)?;
            }
            Pop => {
                self.pop_expect(Expect::Category1, describe)?;
            }
            Pop2 => {
                let top_width = self
                    .stack
                    .as_ref()
                    .and_then(|stack| stack.last())
                    .map_or(1, Width::width);
                if top_width == 2 {
                    self.pop_expect(Expect::Category2, describe)?;
                } else {
                    self.pop_expect(Expect::Category1, describe)?;
                    self.pop_expect(Expect::Category1, describe)?;
                }
            }
            Dup => {
                let top = self.pop_expect(Expect::Category1, describe)?;
                self.push(top.clone());
                self.push(top);
            }
            DupX1 => {
                let top = self.pop_expect(Expect::Category1, describe)?;
                let under = self.pop_expect(Expect::Category1, describe)?;
                self.push(top.clone());
                self.push(under);
                self.push(top);
            }
            Swap => {
                let top = self.pop_expect(Expect::Category1, describe)?;
                let under = self.pop_expect(Expect::Category1, describe)?;
                self.push(top);
                self.push(under);
            }
            Arithmetic(kind, _) => {
                let operand = numeric_type(*kind);
                self.pop_expect(Expect::Value(operand.clone()), describe)?;
                self.pop_expect(Expect::Value(operand.clone()), describe)?;
                self.push(StackType::from_field_type(&operand));
            }
            Neg(kind) => {
                let operand = numeric_type(*kind);
                self.pop_expect(Expect::Value(operand.clone()), describe)?;
                self.push(StackType::from_field_type(&operand));
            }
            Shift(kind, _) => {
                let operand = integral_type(*kind);
                self.pop_expect(Expect::Value(FieldType::int()), describe)?;
                self.pop_expect(Expect::Value(operand.clone()), describe)?;
                self.push(StackType::from_field_type(&operand));
            }
            Bitwise(kind, _) => {
                let operand = integral_type(*kind);
                self.pop_expect(Expect::Value(operand.clone()), describe)?;
                self.pop_expect(Expect::Value(operand.clone()), describe)?;
                self.push(StackType::from_field_type(&operand));
            }
            Convert(conversion) => {
                let (from, to) = conversion.signature();
                self.pop_expect(Expect::Value(FieldType::Base(from)), describe)?;
                self.push(StackType::from_field_type(&FieldType::Base(to)));
            }
            LCmp | FCmp(_) | DCmp(_) => {
                let operand = match instruction {
                    LCmp => FieldType::long(),
                    FCmp(_) => FieldType::Base(BaseType::Float),
                    _ => FieldType::Base(BaseType::Double),
                };
                self.pop_expect(Expect::Value(operand.clone()), describe)?;
                self.pop_expect(Expect::Value(operand), describe)?;
                self.push(StackType::Int);
            }
            GetStatic(field) => {
                let field_type = self.field_type_of(&field.descriptor)?;
                self.push(StackType::from_field_type(&field_type));
            }
            PutStatic(field) => {
                let field_type = self.field_type_of(&field.descriptor)?;
                self.pop_expect(Expect::Value(field_type), describe)?;
            }
            GetField(field) => {
                let field_type = self.field_type_of(&field.descriptor)?;
                let owner = FieldType::object(field.class.clone());
                self.pop_expect(Expect::Value(owner), describe)?;
                self.push(StackType::from_field_type(&field_type));
            }
            PutField(field) => {
                let field_type = self.field_type_of(&field.descriptor)?;
                let owner = FieldType::object(field.class.clone());
                self.pop_expect(Expect::Value(field_type), describe)?;
                self.pop_expect(Expect::Value(owner), describe)?;
            }
            Invoke(invoke_type, method) => {
                let method_type = self
                    .registry
                    .signatures()
                    .method(&method.descriptor)
                    .map_err(|err| {
                        Error::internal(InternalErrorKind::BadDescriptor(err.to_string()))
                    })?;
                for parameter in method_type.parameters.iter().rev() {
                    self.pop_expect(Expect::Value(parameter.clone()), describe)?;
                }
                if *invoke_type != InvokeType::Static {
                    let owner = FieldType::object(method.class.clone());
                    self.pop_expect(Expect::Value(owner), describe)?;
                }
                if let Some(return_type) = &method_type.return_type {
                    self.push(StackType::from_field_type(return_type));
                }
            }
            New(class) => self.push(StackType::object(class.clone())),
            NewArray(base_type) => {
                self.pop_expect(Expect::Value(FieldType::int()), describe)?;
                let array = RefType::array(FieldType::Base(*base_type));
                self.push(StackType::Reference(array));
            }
            ANewArray(element) => {
                self.pop_expect(Expect::Value(FieldType::int()), describe)?;
                let array = RefType::array(FieldType::Ref(element.clone()));
                self.push(StackType::Reference(array));
            }
            ArrayLength => {
                let array = self.pop_expect(Expect::Reference, describe)?;
                let is_array = match &array {
                    StackType::Null => true,
                    StackType::Reference(ref_type) => ref_type.element_type().is_some(),
                    _ => false,
                };
                if !is_array {
                    let kind = InternalErrorKind::TypeMismatch {
                        expected: String::from("array"),
                        found: array.describe(),
                    };
                    return Err(self.error(kind, Some(describe())));
                }
                self.push(StackType::Int);
            }
            CheckCast(class) => {
                self.pop_expect(Expect::Reference, describe)?;
                self.push(StackType::Reference(class.clone()));
            }
            InstanceOf(_) => {
                self.pop_expect(Expect::Reference, describe)?;
                self.push(StackType::Int);
            }
        }
        Ok(())
    }

    /// Load a local variable (its type was fixed when it was declared)
    pub fn append_load_local(&mut self, slot: u16) -> Result<(), Error> {
        let instruction = InstructionEmitter::load(self.local_type(slot)?, slot);
        self.append_op(instruction)
    }

    pub fn append_store_local(&mut self, slot: u16) -> Result<(), Error> {
        let instruction = InstructionEmitter::store(self.local_type(slot)?, slot);
        self.append_op(instruction)
    }

    /// Load the object being worked on
    pub fn load_object(&mut self) -> Result<(), Error> {
        match self.config.object_slot {
            Some(slot) => self.append_load_local(slot),
            None => Err(self.error(InternalErrorKind::MissingCapability("object"), None)),
        }
    }

    /// Load the marshalling or unmarshalling context
    pub fn load_context(&mut self) -> Result<(), Error> {
        match self.config.context_slot {
            Some(slot) => self.append_load_local(slot),
            None => Err(self.error(InternalErrorKind::MissingCapability("context"), None)),
        }
    }

    pub fn append_get_field(&mut self, field: &MemberItem) -> Result<(), Error> {
        self.append_op(InstructionEmitter::field_access(field, false))
    }

    pub fn append_put_field(&mut self, field: &MemberItem) -> Result<(), Error> {
        self.append_op(InstructionEmitter::field_access(field, true))
    }

    /// Call a method, picking the `invoke*` flavour from the method and its owner
    pub fn append_call(&mut self, method: &MemberItem) -> Result<(), Error> {
        let owner = self.registry.require_class(method.class_name().as_str())?;
        self.append_op(InstructionEmitter::invoke(method, owner.is_interface()))?;
        if self.config.accumulate_exceptions {
            for exception in method.exceptions() {
                self.declare_exception(exception.clone());
            }
        }
        Ok(())
    }

    /// Add a checked exception to the method's `throws` list
    pub fn declare_exception(&mut self, exception: BinaryName) {
        if !self.exceptions.contains(&exception) {
            self.exceptions.push(exception);
        }
    }

    pub fn append_push_int(&mut self, value: i32) -> Result<(), Error> {
        self.append_op(InstructionEmitter::push_int(value))
    }

    pub fn append_push_long(&mut self, value: i64) -> Result<(), Error> {
        self.append_op(Instruction::LConst(value))
    }

    pub fn append_ldc_string(&mut self, value: &str) -> Result<(), Error> {
        self.append_op(Instruction::Ldc(LoadableConstant::String(value.to_owned())))
    }

    pub fn append_aconst_null(&mut self) -> Result<(), Error> {
        self.append_op(Instruction::AConstNull)
    }

    pub fn append_new(&mut self, class: &BinaryName) -> Result<(), Error> {
        self.append_op(Instruction::New(class.clone()))
    }

    pub fn append_checkcast(&mut self, class: RefType<BinaryName>) -> Result<(), Error> {
        self.append_op(Instruction::CheckCast(class))
    }

    pub fn append_instanceof(&mut self, class: RefType<BinaryName>) -> Result<(), Error> {
        self.append_op(Instruction::InstanceOf(class))
    }

    /// Discard the top of the stack, whatever its size
    pub fn append_pop(&mut self) -> Result<(), Error> {
        let instruction = match self.stack.as_ref().and_then(|stack| stack.last()) {
            Some(top) => InstructionEmitter::pop_for(top),
            None => Instruction::Pop,
        };
        self.append_op(instruction)
    }

    pub fn append_dup(&mut self) -> Result<(), Error> {
        self.append_op(Instruction::Dup)
    }

    pub fn append_swap(&mut self) -> Result<(), Error> {
        self.append_op(Instruction::Swap)
    }

    fn append_branch(
        &mut self,
        branch: BranchInstruction<()>,
        operands: Vec<Expect>,
    ) -> Result<BranchWrapper, Error> {
        let describe = || format!("{:?}", branch);
        self.prepare(&describe)?;
        for expect in operands {
            self.pop_expect(expect, &describe)?;
        }

        let label = self.fresh_label();
        let stack = self.stack.clone().unwrap_or_default();
        if !branch.falls_through() {
            self.stack = None;
        }
        self.code
            .push(CodeItem::Branch(branch.map_target(|_| label)));
        self.outstanding.insert(label);

        if self.tracking() {
            log::debug!(
                "{}.{}: {:?} as branch {} with stack {}",
                self.class.name(),
                self.name,
                branch,
                label,
                describe_stack(&stack)
            );
        }
        Ok(BranchWrapper { label, stack })
    }

    /// Branch if the `int` on the stack compares to zero
    pub fn append_if(&mut self, comparison: OrdComparison) -> Result<BranchWrapper, Error> {
        let operands = vec![Expect::Value(FieldType::int())];
        self.append_branch(BranchInstruction::If(comparison, ()), operands)
    }

    pub fn append_if_icmp(&mut self, comparison: OrdComparison) -> Result<BranchWrapper, Error> {
        let operands = vec![
            Expect::Value(FieldType::int()),
            Expect::Value(FieldType::int()),
        ];
        self.append_branch(BranchInstruction::IfICmp(comparison, ()), operands)
    }

    pub fn append_if_acmp(&mut self, comparison: EqComparison) -> Result<BranchWrapper, Error> {
        let operands = vec![Expect::Reference, Expect::Reference];
        self.append_branch(BranchInstruction::IfACmp(comparison, ()), operands)
    }

    /// Branch if the reference on the stack is (`EQ`) or isn't (`NE`) `null`
    pub fn append_ifnull(&mut self, comparison: EqComparison) -> Result<BranchWrapper, Error> {
        self.append_branch(BranchInstruction::IfNull(comparison, ()), vec![Expect::Reference])
    }

    /// Unconditional forward jump
    pub fn append_goto(&mut self) -> Result<BranchWrapper, Error> {
        self.append_branch(BranchInstruction::Goto(()), vec![])
    }

    /// Return from the method, with a value if the method has a return type
    pub fn append_return(&mut self) -> Result<(), Error> {
        let return_type = self.method_type.return_type.clone();
        let instruction = InstructionEmitter::return_for(return_type.as_ref());
        let describe = || format!("{:?}", instruction);
        self.prepare(&describe)?;
        if let Some(return_type) = return_type {
            self.pop_expect(Expect::Value(return_type), &describe)?;
        }
        self.code
            .push(CodeItem::Branch(instruction.map_target(|_| 0)));
        self.stack = None;
        Ok(())
    }

    pub fn append_throw(&mut self) -> Result<(), Error> {
        let describe = || String::from("AThrow");
        self.prepare(&describe)?;
        self.pop_expect(Expect::Value(FieldType::object(BinaryName::THROWABLE)), &describe)?;
        self.code.push(CodeItem::Branch(BranchInstruction::AThrow));
        self.stack = None;
        Ok(())
    }

    /// Declare a target for backward branches, to be placed with `place_target`
    pub fn new_target(&mut self) -> BranchTarget {
        self.targets.push(TargetState::Pending);
        BranchTarget {
            id: self.targets.len() - 1,
        }
    }

    /// Place a declared target at the current position
    pub fn place_target(&mut self, target: BranchTarget) -> Result<(), Error> {
        let describe = || format!("target {}", target.id);
        self.prepare(&describe)?;
        let stack = self.stack.clone().unwrap_or_default();
        let label = self.fresh_label();
        self.code.push(CodeItem::Label(label));
        if self.tracking() {
            log::debug!(
                "{}.{}: loop target {} placed with stack {}",
                self.class.name(),
                self.name,
                target.id,
                describe_stack(&stack)
            );
        }
        match self.targets.get_mut(target.id) {
            Some(state @ TargetState::Pending) => {
                *state = TargetState::Placed { label, stack };
                Ok(())
            }
            _ => Err(self.error(InternalErrorKind::UnresolvedBranch, Some(describe()))),
        }
    }

    /// Declare and place a target for backward branches at the current position
    pub fn define_target(&mut self) -> Result<BranchTarget, Error> {
        let target = self.new_target();
        self.place_target(target)?;
        Ok(target)
    }

    /// Jump back to a target, which must see exactly the same stack
    pub fn append_goto_target(&mut self, target: BranchTarget) -> Result<(), Error> {
        let describe = || format!("goto target {}", target.id);
        self.prepare(&describe)?;
        let (label, expected) = match self.targets.get(target.id) {
            Some(TargetState::Placed { label, stack }) => (*label, stack),
            _ => return Err(self.error(InternalErrorKind::UnresolvedBranch, Some(describe()))),
        };
        let found = self.stack.as_deref().unwrap_or_default();
        if found != expected.as_slice() {
            let kind = InternalErrorKind::StackShapeMismatch {
                expected: describe_stack(expected),
                found: describe_stack(found),
            };
            return Err(self.error(kind, Some(describe())));
        }
        self.code
            .push(CodeItem::Branch(BranchInstruction::Goto(label)));
        self.stack = None;
        Ok(())
    }

    /// Finish the method, encoding it against a scratch copy of the class constant pool
    pub fn complete(self) -> Result<CompletedMethod<'r>, Error> {
        if !self.armed.is_empty() || !self.outstanding.is_empty() {
            return Err(self.error(InternalErrorKind::UnresolvedBranch, None));
        }
        if self
            .targets
            .iter()
            .any(|target| matches!(target, TargetState::Pending))
        {
            return Err(self.error(InternalErrorKind::UnresolvedBranch, None));
        }
        if self.stack.is_some() {
            return Err(self.error(InternalErrorKind::FallsOffEnd, None));
        }

        let base_len = self.class.constants().len();
        let mut pool = self.class.constants().clone();
        let code = self.encode(&mut pool)?;
        let key = MethodKey::new(&self.descriptor, self.access_flags.bits(), &code, &self.exceptions);

        Ok(CompletedMethod {
            registry: self.registry,
            class: self.class,
            name: self.name,
            descriptor: self.descriptor,
            access_flags: self.access_flags,
            items: self.code,
            max_stack: self.max_stack,
            max_locals: self.next_local,
            exceptions: self.exceptions,
            key,
            code,
            pool,
            base_len,
        })
    }

    fn encode(&self, pool: &mut ConstantsPool) -> Result<Code, Error> {
        let method = format!("{}{}", self.name, self.descriptor);
        encode_items(&self.code, self.max_stack, self.next_local, pool)
            .map_err(|err| err.in_method(self.class.name().as_str(), &method))
    }
}

/// Two-pass encoding: lay out every instruction, then fill in branch offsets
fn encode_items(
    items: &[CodeItem],
    max_stack: u16,
    max_locals: u16,
    pool: &mut ConstantsPool,
) -> Result<Code, Error> {
    let mut encoded: Vec<Vec<u8>> = vec![];
    let mut labels: HashMap<usize, usize> = HashMap::new();
    let mut offset = 0;
    for item in items {
        match item {
            CodeItem::Plain(instruction) => {
                let mut bytes = vec![];
                instruction.encode(pool, &mut bytes)?;
                offset += bytes.len();
                encoded.push(bytes);
            }
            CodeItem::Branch(branch) => offset += branch.encoded_len(),
            CodeItem::Label(label) => {
                labels.insert(*label, offset);
            }
        }
    }
    if offset > u16::MAX as usize {
        let msg = format!("{} bytes of code", offset);
        return Err(Error::internal(InternalErrorKind::CodeOverflow(msg)));
    }

    let mut code_array = Vec::with_capacity(offset);
    let mut encoded = encoded.into_iter();
    for item in items {
        match item {
            CodeItem::Plain(_) => {
                if let Some(bytes) = encoded.next() {
                    code_array.extend(bytes);
                }
            }
            CodeItem::Branch(branch) => {
                let here = code_array.len() as i64;
                let jump = match branch.target() {
                    None => 0,
                    Some(label) => {
                        let target = labels
                            .get(label)
                            .ok_or_else(|| Error::internal(InternalErrorKind::UnresolvedBranch))?;
                        let delta = *target as i64 - here;
                        i16::try_from(delta).map_err(|_| {
                            let msg = format!("branch offset {} does not fit", delta);
                            Error::internal(InternalErrorKind::CodeOverflow(msg))
                        })?
                    }
                };
                branch.map_target(|_| jump).encode(&mut code_array);
            }
            CodeItem::Label(_) => (),
        }
    }

    Ok(Code {
        max_stack,
        max_locals,
        code_array,
        exception_table: vec![],
        attributes: vec![],
    })
}

fn numeric_type(kind: NumericKind) -> FieldType<BinaryName> {
    FieldType::Base(match kind {
        NumericKind::Int => BaseType::Int,
        NumericKind::Long => BaseType::Long,
        NumericKind::Float => BaseType::Float,
        NumericKind::Double => BaseType::Double,
    })
}

fn integral_type(kind: IntegralKind) -> FieldType<BinaryName> {
    match kind {
        IntegralKind::Int => FieldType::int(),
        IntegralKind::Long => FieldType::long(),
    }
}

fn array_kind_base(kind: ArrayKind) -> BaseType {
    match kind {
        ArrayKind::Long => BaseType::Long,
        ArrayKind::Float => BaseType::Float,
        ArrayKind::Double => BaseType::Double,
        _ => BaseType::Int,
    }
}

/// Element pushed by an array load when the array type isn't known (ie. it is `null`)
fn array_kind_default(kind: ArrayKind) -> StackType {
    match kind {
        ArrayKind::Reference => StackType::object(BinaryName::OBJECT),
        other => StackType::from_field_type(&FieldType::Base(array_kind_base(other))),
    }
}

/// Everything that identifies a method body, except for its name
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodKey {
    descriptor: String,
    access_flags: u16,
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    exception_table: Vec<u8>,
    exceptions: Vec<String>,
}

impl MethodKey {
    fn new(descriptor: &str, access_flags: u16, code: &Code, exceptions: &[BinaryName]) -> MethodKey {
        MethodKey {
            descriptor: descriptor.to_owned(),
            access_flags,
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            code: code.code_array.clone(),
            exception_table: code.exception_table.to_bytes().unwrap_or_default(),
            exceptions: exceptions.iter().map(|e| e.as_str().to_owned()).collect(),
        }
    }

    /// Key of a method already in a class (`None` for methods without code)
    pub fn of_member(class: &ClassModel, method: &MemberItem) -> Option<MethodKey> {
        let code = class.code_of(method)?;
        Some(MethodKey::new(
            method.descriptor(),
            method.access_flags(),
            &code,
            method.exceptions(),
        ))
    }
}

/// Method whose code is final, ready to be added to its class (or shared with an identical one)
pub struct CompletedMethod<'r> {
    registry: &'r ClassRegistry,
    class: &'r ClassModel,
    name: UnqualifiedName,
    descriptor: String,
    access_flags: MethodAccessFlags,
    items: Vec<CodeItem>,
    max_stack: u16,
    max_locals: u16,
    exceptions: Vec<BinaryName>,
    key: MethodKey,
    code: Code,

    /// Class constant pool, plus whatever the code needed added
    pool: ConstantsPool,

    /// Length of the class constant pool when the code was encoded
    base_len: u16,
}

impl<'r> CompletedMethod<'r> {
    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    pub fn class(&self) -> &'r ClassModel {
        self.class
    }

    pub fn name(&self) -> &UnqualifiedName {
        &self.name
    }

    pub fn set_name(&mut self, name: UnqualifiedName) {
        self.name = name;
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn access_flags(&self) -> MethodAccessFlags {
        self.access_flags
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Add the method to its class
    ///
    /// If the class constant pool hasn't changed since the code was encoded, the scratch pool
    /// simply replaces it. Otherwise the code is encoded again against the current pool.
    pub fn add_to_class(self) -> Result<&'r MemberItem, Error> {
        let class = self.class;
        if class.declared_method(self.name.as_str(), &self.descriptor).is_some() {
            return Err(crate::jvm::ConfigError::DuplicateMethod {
                class: class.name().as_str().to_owned(),
                method: format!("{}{}", self.name, self.descriptor),
            }
            .into());
        }
        self.registry.mark_modified(class)?;

        let code = if class.constants().len() == self.base_len {
            *class.constants_mut() = self.pool;
            self.code
        } else {
            let mut constants = class.constants_mut();
            encode_items(&self.items, self.max_stack, self.max_locals, &mut constants)?
        };

        let mut attributes: Vec<Attribute> = vec![];
        {
            let mut constants = class.constants_mut();
            attributes.push(constants.get_attribute(&code)?);
            if !self.exceptions.is_empty() {
                let mut indices = vec![];
                for exception in &self.exceptions {
                    indices.push(constants.get_class(exception.as_str())?);
                }
                attributes.push(constants.get_attribute(&Exceptions(indices))?);
            }
        }

        self.registry.add_method(
            class,
            self.name,
            &self.descriptor,
            self.access_flags,
            self.exceptions,
            attributes,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::ClassAccessFlags;
    use crate::settings::Settings;
    use std::path::PathBuf;

    fn registry() -> ClassRegistry {
        ClassRegistry::new(Settings::new(vec![]).unwrap())
    }

    fn scratch_class(registry: &ClassRegistry) -> &ClassModel {
        let model = ClassModel::synthetic(
            BinaryName::from_string(String::from("com/example/Scratch")).unwrap(),
            BinaryName::OBJECT,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            Version::JAVA5,
            PathBuf::from("out"),
        )
        .unwrap();
        registry.add_class(model).unwrap()
    }

    fn assembler<'r>(
        registry: &'r ClassRegistry,
        class: &'r ClassModel,
        descriptor: &str,
    ) -> MethodAssembler<'r> {
        MethodAssembler::new(
            registry,
            class,
            UnqualifiedName::from_string(String::from("bind_test")).unwrap(),
            descriptor,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            AssemblerConfig::default(),
        )
        .unwrap()
    }

    fn internal_kind(err: Error) -> InternalErrorKind {
        match err {
            Error::Internal(err) => err.kind,
            other => panic!("expected internal error, got {}", other),
        }
    }

    #[test]
    fn simple_return() {
        let registry = registry();
        let class = scratch_class(&registry);
        let mut asm = assembler(&registry, class, "()I");
        asm.append_push_int(1).unwrap();
        asm.append_return().unwrap();
        let method = asm.complete().unwrap();
        assert_eq!(method.code().code_array, vec![0x04, 0xac]);
        assert_eq!(method.code().max_stack, 1);
        assert_eq!(method.code().max_locals, 0);
    }

    #[test]
    fn stack_checks() {
        let registry = registry();
        let class = scratch_class(&registry);

        let mut asm = assembler(&registry, class, "()I");
        let err = asm.append_return().unwrap_err();
        assert!(matches!(internal_kind(err), InternalErrorKind::StackUnderflow));

        let mut asm = assembler(&registry, class, "()V");
        asm.append_push_int(0).unwrap();
        let err = asm.append_throw().unwrap_err();
        assert!(matches!(internal_kind(err), InternalErrorKind::TypeMismatch { .. }));

        let mut asm = assembler(&registry, class, "()V");
        asm.append_return().unwrap();
        let err = asm.append_push_int(0).unwrap_err();
        assert!(matches!(internal_kind(err), InternalErrorKind::UnreachableCode));

        let mut asm = assembler(&registry, class, "()V");
        let err = asm.load_object().unwrap_err();
        assert!(matches!(internal_kind(err), InternalErrorKind::MissingCapability("object")));
    }

    #[test]
    fn completion_checks() {
        let registry = registry();
        let class = scratch_class(&registry);

        let mut asm = assembler(&registry, class, "()V");
        asm.append_push_int(0).unwrap();
        asm.append_pop().unwrap();
        let err = asm.complete().err().unwrap();
        assert!(matches!(internal_kind(err), InternalErrorKind::FallsOffEnd));

        let mut asm = assembler(&registry, class, "(Ljava/lang/String;)V");
        asm.append_load_local(0).unwrap();
        let _dropped = asm.append_ifnull(EqComparison::EQ).unwrap();
        asm.append_return().unwrap();
        let err = asm.complete().err().unwrap();
        assert!(matches!(internal_kind(err), InternalErrorKind::UnresolvedBranch));
    }

    #[test]
    fn deeper_branch_gets_bridge() {
        let registry = registry();
        let class = scratch_class(&registry);
        let mut asm = assembler(&registry, class, "(Ljava/lang/String;)V");
        asm.append_load_local(0).unwrap();
        asm.append_dup().unwrap();
        let skip = asm.append_ifnull(EqComparison::EQ).unwrap();
        assert_eq!(skip.stack().len(), 1);
        asm.append_pop().unwrap();
        asm.target_next(skip);
        asm.append_return().unwrap();

        let method = asm.complete().unwrap();
        assert_eq!(
            method.code().code_array,
            vec![
                0x2a, // aload_0
                0x59, // dup
                0xc6, 0x00, 0x07, // ifnull bridge
                0x57, // pop
                0xa7, 0x00, 0x04, // goto target
                0x57, // bridge: pop
                0xb1, // target: return
            ]
        );
        assert_eq!(method.code().max_stack, 2);
    }

    #[test]
    fn merge_keeps_general_type() {
        let registry = registry();
        let class = scratch_class(&registry);
        let mut asm = assembler(&registry, class, "(Ljava/lang/String;)Ljava/lang/Object;");
        asm.append_load_local(0).unwrap();
        asm.append_dup().unwrap();
        let branch = asm.append_ifnull(EqComparison::NE).unwrap();
        asm.append_pop().unwrap();
        asm.append_aconst_null().unwrap();
        asm.target_next(branch);
        asm.append_return().unwrap();
        assert!(asm.complete().is_ok());

        let mut asm = assembler(&registry, class, "(Ljava/lang/String;)V");
        asm.append_push_int(0).unwrap();
        asm.append_load_local(0).unwrap();
        let branch = asm.append_ifnull(EqComparison::EQ).unwrap();
        asm.append_pop().unwrap();
        asm.append_load_local(0).unwrap();
        asm.target_next(branch);
        let err = asm.append_pop().unwrap_err();
        assert!(matches!(internal_kind(err), InternalErrorKind::IncompatibleMerge { .. }));
    }

    #[test]
    fn backward_branch_needs_same_stack() {
        let registry = registry();
        let class = scratch_class(&registry);
        let mut asm = assembler(&registry, class, "()V");
        let top = asm.define_target().unwrap();
        asm.append_push_int(3).unwrap();
        let err = asm.append_goto_target(top).unwrap_err();
        assert!(matches!(internal_kind(err), InternalErrorKind::StackShapeMismatch { .. }));

        let mut asm = assembler(&registry, class, "()V");
        let _never_placed = asm.new_target();
        asm.append_return().unwrap();
        let err = asm.complete().err().unwrap();
        assert!(matches!(internal_kind(err), InternalErrorKind::UnresolvedBranch));
    }

    #[test]
    fn identical_code_shares_key() {
        let registry = registry();
        let class = scratch_class(&registry);
        let build = |name: &str| {
            let mut asm = MethodAssembler::new(
                &registry,
                class,
                UnqualifiedName::from_string(name.to_owned()).unwrap(),
                "()Ljava/lang/String;",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                AssemblerConfig::default(),
            )
            .unwrap();
            asm.append_ldc_string("hello").unwrap();
            asm.append_return().unwrap();
            asm.complete().unwrap()
        };

        let first = build("bind_a");
        let second = build("bind_b");
        assert_eq!(first.key(), second.key());

        let before = class.constants().len();
        let added = first.add_to_class().unwrap();
        assert_eq!(added.name().as_str(), "bind_a");
        assert!(class.constants().len() > before);
        assert!(class.declared_method("bind_a", "()Ljava/lang/String;").is_some());
        assert_eq!(MethodKey::of_member(class, added).as_ref(), Some(second.key()));
    }
}
