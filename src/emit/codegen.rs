//! IL generation from bound operation trees.
//!
//! [`IlAssembler`] encodes instructions, tracks the evaluation stack depth and resolves
//! branch labels. [`CodeGenerator`] walks an operation tree and drives the assembler.
//! Tokens are not known while generating: every token operand is written as zero and
//! recorded as a [`TokenRef`] fixup that the metadata writer resolves once all rows
//! exist.

use std::{collections::HashMap, sync::Arc};

use crate::{
    compilation::SymbolLookup,
    diagnostics::{Diagnostic, ErrorCode, Location},
    operations::{
        BinaryOperatorKind, BranchKind, ConstantValue, ConversionKind, IncrementKind,
        InstanceReferenceKind, Operation, OperationKind, OperationNode, UnaryOperatorKind,
    },
    symbols::{FieldSymbol, LocalSymbol, MethodKind, MethodSymbol, SpecialType, TypeSymbol},
    syntax::{SyntaxNode, SyntaxTree, SyntaxTreeList, TextSpan},
    Error, Result,
};

/// Single-byte and two-byte opcodes used by the generator. ECMA-335 III.
mod op {
    pub const LDARG_0: u8 = 0x02;
    pub const LDLOC_0: u8 = 0x06;
    pub const STLOC_0: u8 = 0x0A;
    pub const LDARG_S: u8 = 0x0E;
    pub const STARG_S: u8 = 0x10;
    pub const LDLOC_S: u8 = 0x11;
    pub const STLOC_S: u8 = 0x13;
    pub const LDNULL: u8 = 0x14;
    pub const LDC_I4_M1: u8 = 0x15;
    pub const LDC_I4_0: u8 = 0x16;
    pub const LDC_I4_S: u8 = 0x1F;
    pub const LDC_I4: u8 = 0x20;
    pub const DUP: u8 = 0x25;
    pub const POP: u8 = 0x26;
    pub const CALL: u8 = 0x28;
    pub const RET: u8 = 0x2A;
    pub const BR: u8 = 0x38;
    pub const BRFALSE: u8 = 0x39;
    pub const BRTRUE: u8 = 0x3A;
    pub const ADD: u8 = 0x58;
    pub const SUB: u8 = 0x59;
    pub const MUL: u8 = 0x5A;
    pub const DIV: u8 = 0x5B;
    pub const REM: u8 = 0x5D;
    pub const AND: u8 = 0x5F;
    pub const OR: u8 = 0x60;
    pub const XOR: u8 = 0x61;
    pub const SHL: u8 = 0x62;
    pub const SHR: u8 = 0x63;
    pub const NEG: u8 = 0x65;
    pub const NOT: u8 = 0x66;
    pub const CALLVIRT: u8 = 0x6F;
    pub const LDSTR: u8 = 0x72;
    pub const NEWOBJ: u8 = 0x73;
    pub const CASTCLASS: u8 = 0x74;
    pub const THROW: u8 = 0x7A;
    pub const LDFLD: u8 = 0x7B;
    pub const STFLD: u8 = 0x7D;
    pub const LDSFLD: u8 = 0x7E;
    pub const STSFLD: u8 = 0x80;
    pub const BOX: u8 = 0x8C;
    pub const UNBOX_ANY: u8 = 0xA5;

    pub const PREFIX: u8 = 0xFE;
    pub const CEQ: u8 = 0x01;
    pub const CGT: u8 = 0x02;
    pub const CLT: u8 = 0x04;
    pub const LDARG: u8 = 0x09;
    pub const STARG: u8 = 0x0B;
    pub const LDLOC: u8 = 0x0C;
    pub const STLOC: u8 = 0x0E;
    pub const RETHROW: u8 = 0x1A;
}

/// A metadata entity an instruction operand refers to.
#[derive(Debug, Clone)]
pub(crate) enum TokenRef {
    /// A type, for `box`, `castclass` and `unbox.any`.
    Type(TypeSymbol),
    /// A method, for `call`, `callvirt` and `newobj`.
    Method(Arc<MethodSymbol>),
    /// A field, for field loads and stores.
    Field(Arc<FieldSymbol>),
    /// A user string, for `ldstr`.
    String(String),
}

/// IL offset mapped to the source span that produced it.
#[derive(Debug, Clone)]
pub(crate) struct SequencePoint {
    pub(crate) offset: u32,
    pub(crate) tree: SyntaxTree,
    pub(crate) span: TextSpan,
}

/// Generated code of one method, before tokens are resolved.
#[derive(Debug, Clone)]
pub(crate) struct MethodBody {
    pub(crate) il: Vec<u8>,
    pub(crate) max_stack: u16,
    pub(crate) locals: Vec<TypeSymbol>,
    pub(crate) fixups: Vec<(usize, TokenRef)>,
    pub(crate) sequence_points: Vec<SequencePoint>,
}

impl MethodBody {
    /// `ldnull; throw`, the body of every method in a metadata-only image.
    pub(crate) fn throw_null() -> Self {
        MethodBody {
            il: vec![op::LDNULL, op::THROW],
            max_stack: 1,
            locals: Vec::new(),
            fixups: Vec::new(),
            sequence_points: Vec::new(),
        }
    }

    /// A parameterless constructor that only chains to `base_constructor`.
    pub(crate) fn default_constructor(base_constructor: Option<&Arc<MethodSymbol>>) -> Self {
        let mut asm = IlAssembler::new();
        if let Some(base) = base_constructor {
            asm.emit(op::LDARG_0, 1, 0);
            asm.emit_token(op::CALL, TokenRef::Method(Arc::clone(base)), 0, 1);
        }
        asm.emit(op::RET, 0, 0);
        let (il, max_stack, fixups) = asm.into_parts();
        MethodBody {
            il,
            max_stack,
            locals: Vec::new(),
            fixups,
            sequence_points: Vec::new(),
        }
    }
}

/// Encodes a method body header. ECMA-335 II.25.4.
///
/// The tiny form is used when the code is shorter than 64 bytes, needs at most 8
/// stack slots, declares no locals and has no exception sections.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the code does not fit a fat header.
pub(crate) fn encode_method_body_header(
    code_size: usize,
    max_stack: u16,
    local_sig_token: u32,
    has_exceptions: bool,
) -> Result<Vec<u8>> {
    if code_size < 64 && max_stack <= 8 && local_sig_token == 0 && !has_exceptions {
        #[allow(clippy::cast_possible_truncation)]
        return Ok(vec![((code_size as u8) << 2) | 0x02]);
    }

    let code_size =
        u32::try_from(code_size).map_err(|_| malformed_error!("method body exceeds 4 GiB"))?;
    let mut flags: u16 = 0x3003;
    if local_sig_token != 0 {
        flags |= 0x10;
    }
    if has_exceptions {
        flags |= 0x08;
    }

    let mut header = Vec::with_capacity(12);
    header.extend_from_slice(&flags.to_le_bytes());
    header.extend_from_slice(&max_stack.to_le_bytes());
    header.extend_from_slice(&code_size.to_le_bytes());
    header.extend_from_slice(&local_sig_token.to_le_bytes());
    Ok(header)
}

/// A forward or backward branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Label(usize);

/// Instruction encoder with stack depth tracking.
#[derive(Debug, Default)]
pub(crate) struct IlAssembler {
    code: Vec<u8>,
    stack: i32,
    max_stack: i32,
    labels: Vec<Option<usize>>,
    label_depths: Vec<Option<i32>>,
    branches: Vec<(usize, Label)>,
    fixups: Vec<(usize, TokenRef)>,
    falls_through: bool,
}

impl IlAssembler {
    pub(crate) fn new() -> Self {
        IlAssembler {
            falls_through: true,
            ..Self::default()
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn falls_through(&self) -> bool {
        self.falls_through
    }

    fn adjust(&mut self, pushes: i32, pops: i32) {
        self.stack = (self.stack - pops).max(0) + pushes;
        self.max_stack = self.max_stack.max(self.stack);
    }

    pub(crate) fn emit(&mut self, opcode: u8, pushes: i32, pops: i32) {
        self.code.push(opcode);
        self.adjust(pushes, pops);
        self.falls_through = true;
        if matches!(opcode, op::RET | op::THROW) {
            self.stack = 0;
            self.falls_through = false;
        }
    }

    pub(crate) fn emit_prefixed(&mut self, opcode: u8, pushes: i32, pops: i32) {
        self.code.push(op::PREFIX);
        self.code.push(opcode);
        self.adjust(pushes, pops);
        self.falls_through = opcode != op::RETHROW;
        if !self.falls_through {
            self.stack = 0;
        }
    }

    fn emit_u8_operand(&mut self, opcode: u8, operand: u8, pushes: i32, pops: i32) {
        self.emit(opcode, pushes, pops);
        self.code.push(operand);
    }

    fn emit_prefixed_u16_operand(&mut self, opcode: u8, operand: u16, pushes: i32, pops: i32) {
        self.emit_prefixed(opcode, pushes, pops);
        self.code.extend_from_slice(&operand.to_le_bytes());
    }

    pub(crate) fn emit_token(&mut self, opcode: u8, token: TokenRef, pushes: i32, pops: i32) {
        self.emit(opcode, pushes, pops);
        self.fixups.push((self.code.len(), token));
        self.code.extend_from_slice(&[0; 4]);
    }

    pub(crate) fn emit_i4(&mut self, value: i32) {
        match value {
            -1 => self.emit(op::LDC_I4_M1, 1, 0),
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            0..=8 => self.emit(op::LDC_I4_0 + value as u8, 1, 0),
            #[allow(clippy::cast_possible_truncation)]
            -128..=127 => self.emit_u8_operand(op::LDC_I4_S, value as i8 as u8, 1, 0),
            _ => {
                self.emit(op::LDC_I4, 1, 0);
                self.code.extend_from_slice(&value.to_le_bytes());
            }
        }
    }

    pub(crate) fn emit_ldarg(&mut self, index: u16) {
        match index {
            #[allow(clippy::cast_possible_truncation)]
            0..=3 => self.emit(op::LDARG_0 + index as u8, 1, 0),
            #[allow(clippy::cast_possible_truncation)]
            4..=255 => self.emit_u8_operand(op::LDARG_S, index as u8, 1, 0),
            _ => self.emit_prefixed_u16_operand(op::LDARG, index, 1, 0),
        }
    }

    pub(crate) fn emit_starg(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(short) => self.emit_u8_operand(op::STARG_S, short, 0, 1),
            Err(_) => self.emit_prefixed_u16_operand(op::STARG, index, 0, 1),
        }
    }

    pub(crate) fn emit_ldloc(&mut self, index: u16) {
        match index {
            #[allow(clippy::cast_possible_truncation)]
            0..=3 => self.emit(op::LDLOC_0 + index as u8, 1, 0),
            #[allow(clippy::cast_possible_truncation)]
            4..=255 => self.emit_u8_operand(op::LDLOC_S, index as u8, 1, 0),
            _ => self.emit_prefixed_u16_operand(op::LDLOC, index, 1, 0),
        }
    }

    pub(crate) fn emit_stloc(&mut self, index: u16) {
        match index {
            #[allow(clippy::cast_possible_truncation)]
            0..=3 => self.emit(op::STLOC_0 + index as u8, 0, 1),
            #[allow(clippy::cast_possible_truncation)]
            4..=255 => self.emit_u8_operand(op::STLOC_S, index as u8, 0, 1),
            _ => self.emit_prefixed_u16_operand(op::STLOC, index, 0, 1),
        }
    }

    pub(crate) fn define_label(&mut self) -> Label {
        self.labels.push(None);
        self.label_depths.push(None);
        Label(self.labels.len() - 1)
    }

    pub(crate) fn mark_label(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
        if !self.falls_through {
            self.stack = self.label_depths[label.0].unwrap_or(0);
        }
        self.falls_through = true;
    }

    /// Emits a long-form branch. Only `br`, `brtrue` and `brfalse` are used.
    pub(crate) fn emit_branch(&mut self, opcode: u8, label: Label) {
        let pops = i32::from(opcode != op::BR);
        self.emit(opcode, 0, pops);
        self.branches.push((self.code.len(), label));
        self.code.extend_from_slice(&[0; 4]);
        self.label_depths[label.0] = Some(self.stack);
        if opcode == op::BR {
            self.falls_through = false;
        }
    }

    fn into_parts(self) -> (Vec<u8>, u16, Vec<(usize, TokenRef)>) {
        let max_stack = u16::try_from(self.max_stack).unwrap_or(u16::MAX);
        (self.code, max_stack, self.fixups)
    }

    /// Resolves branches and returns `(code, max_stack, token fixups)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if a branch targets a label that was never
    /// marked.
    pub(crate) fn finish(mut self) -> Result<(Vec<u8>, u16, Vec<(usize, TokenRef)>)> {
        for (operand, label) in std::mem::take(&mut self.branches) {
            let Some(target) = self.labels[label.0] else {
                return Err(Error::InvalidOperation(format!(
                    "branch at IL_{:04x} targets an unmarked label",
                    operand - 1
                )));
            };
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let delta = target as i32 - (operand as i32 + 4);
            self.code[operand..operand + 4].copy_from_slice(&delta.to_le_bytes());
        }
        Ok(self.into_parts())
    }
}

/// Core library members the generator calls without the source naming them.
#[derive(Debug, Clone, Default)]
pub(crate) struct WellKnownMembers {
    pub(crate) object_constructor: Option<Arc<MethodSymbol>>,
    pub(crate) object_to_string: Option<Arc<MethodSymbol>>,
    pub(crate) string_concat: Option<Arc<MethodSymbol>>,
}

impl WellKnownMembers {
    pub(crate) fn resolve(lookup: &SymbolLookup) -> Self {
        let object = lookup.special_type(SpecialType::Object);
        let string = lookup.special_type(SpecialType::String);
        let find = |ty: &TypeSymbol, predicate: &dyn Fn(&MethodSymbol) -> bool| {
            ty.as_named()
                .and_then(|named| named.methods().find(|m| predicate(m)).cloned())
        };
        WellKnownMembers {
            object_constructor: find(&object, &|m| {
                m.method_kind() == MethodKind::Constructor && m.parameters().is_empty()
            }),
            object_to_string: find(&object, &|m| {
                m.name() == "ToString" && m.parameters().is_empty() && !m.is_static()
            }),
            string_concat: find(&string, &|m| {
                m.name() == "Concat"
                    && m.is_static()
                    && m.parameters().len() == 2
                    && m.parameters()
                        .iter()
                        .all(|p| p.parameter_type().special_type() == SpecialType::String)
            }),
        }
    }
}

/// Inputs shared by every method of one emit.
pub(crate) struct CodeGenContext<'a> {
    pub(crate) well_known: WellKnownMembers,
    /// Synthesized anonymous type constructors by template metadata name.
    pub(crate) anonymous_constructors: HashMap<String, Arc<MethodSymbol>>,
    pub(crate) trees: &'a SyntaxTreeList,
}

/// Where an assignment stores its value.
enum Place {
    Local(u16),
    Parameter(u16),
    InstanceField(Arc<FieldSymbol>),
    StaticField(Arc<FieldSymbol>),
    None,
}

/// Operation nesting at which generation stops with [`Error::RecursionLimit`].
pub(crate) const MAX_EMIT_DEPTH: usize = 256;

/// Generates the body of one method.
pub(crate) struct CodeGenerator<'a> {
    context: &'a CodeGenContext<'a>,
    method: &'a Arc<MethodSymbol>,
    asm: IlAssembler,
    locals: Vec<TypeSymbol>,
    local_slots: HashMap<usize, u16>,
    loops: Vec<(Label, Label)>,
    sequence_points: Vec<SequencePoint>,
    diagnostics: Vec<Diagnostic>,
    tree: Option<SyntaxTree>,
    depth: usize,
    max_depth: usize,
}

impl<'a> CodeGenerator<'a> {
    /// Generates `body` for `method`, returning the code and any diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for operation kinds the generator does not
    /// support and [`Error::RecursionLimit`] for bodies nested deeper than
    /// [`MAX_EMIT_DEPTH`].
    pub(crate) fn generate(
        context: &'a CodeGenContext<'a>,
        method: &'a Arc<MethodSymbol>,
        body: &Operation,
    ) -> Result<(MethodBody, Vec<Diagnostic>)> {
        Self::generate_with_max_depth(context, method, body, MAX_EMIT_DEPTH)
    }

    fn generate_with_max_depth(
        context: &'a CodeGenContext<'a>,
        method: &'a Arc<MethodSymbol>,
        body: &Operation,
        max_depth: usize,
    ) -> Result<(MethodBody, Vec<Diagnostic>)> {
        let mut generator = CodeGenerator {
            context,
            method,
            asm: IlAssembler::new(),
            locals: Vec::new(),
            local_slots: HashMap::new(),
            loops: Vec::new(),
            sequence_points: Vec::new(),
            diagnostics: Vec::new(),
            tree: method.declaring_syntax().map(|s| s.tree.clone()),
            depth: 0,
            max_depth,
        };

        generator.emit_statement(body)?;
        if generator.asm.falls_through() {
            generator.emit_default_return();
        }

        let CodeGenerator {
            asm,
            locals,
            sequence_points,
            diagnostics,
            ..
        } = generator;
        let (il, max_stack, fixups) = asm.finish()?;
        Ok((
            MethodBody {
                il,
                max_stack,
                locals,
                fixups,
                sequence_points,
            },
            diagnostics,
        ))
    }

    fn emit_default_return(&mut self) {
        let return_type = self.method.return_type();
        if !self.method.returns_void() {
            match return_type.special_type() {
                SpecialType::Int32 | SpecialType::Boolean => self.asm.emit_i4(0),
                _ => self.asm.emit(op::LDNULL, 1, 0),
            }
        }
        self.asm.emit(op::RET, 0, 1);
    }

    // Locations

    fn tree_of(&mut self, node: &SyntaxNode) -> Option<SyntaxTree> {
        if let Some(tree) = self.tree.as_ref().filter(|t| contains_node(t.root(), node)) {
            return Some(tree.clone());
        }
        let found = self
            .context
            .trees
            .iter()
            .find(|t| contains_node(t.root(), node))
            .cloned()?;
        self.tree = Some(found.clone());
        Some(found)
    }

    fn location(&mut self, operation: &Operation) -> Location {
        match operation.syntax() {
            Some(node) => match self.tree_of(node) {
                Some(tree) => Location::source(&tree, node.span()),
                None => Location::None,
            },
            None => Location::None,
        }
    }

    fn mark_sequence_point(&mut self, statement: &Operation) {
        let Some(node) = statement.syntax().cloned() else {
            return;
        };
        let Some(tree) = self.tree_of(&node) else {
            return;
        };
        #[allow(clippy::cast_possible_truncation)]
        let offset = self.asm.offset() as u32;
        let point = SequencePoint {
            offset,
            tree,
            span: node.span(),
        };
        match self.sequence_points.last_mut() {
            Some(last) if last.offset == offset => *last = point,
            _ => self.sequence_points.push(point),
        }
    }

    fn missing_member(&mut self, operation: &Operation, type_name: &str, member: &str) {
        let location = self.location(operation);
        self.diagnostics.push(
            ErrorCode::MissingPredefinedMember.diagnostic(location, &[&type_name, &member]),
        );
    }

    // Locals and arguments

    fn declare_local(&mut self, local: &Arc<LocalSymbol>) -> u16 {
        let key = Arc::as_ptr(local) as usize;
        if let Some(slot) = self.local_slots.get(&key) {
            return *slot;
        }
        let slot = self.allocate_temp(local.local_type().clone());
        self.local_slots.insert(key, slot);
        slot
    }

    fn allocate_temp(&mut self, ty: TypeSymbol) -> u16 {
        self.locals.push(ty);
        u16::try_from(self.locals.len() - 1).unwrap_or(u16::MAX)
    }

    fn parameter_index(&self, ordinal: usize) -> u16 {
        let index = if self.method.is_static() { ordinal } else { ordinal + 1 };
        u16::try_from(index).unwrap_or(u16::MAX)
    }

    // Statements

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn emit_statement(&mut self, statement: &Operation) -> Result<()> {
        self.enter()?;
        let result = self.emit_statement_inner(statement);
        self.depth -= 1;
        result
    }

    fn emit_statement_inner(&mut self, statement: &Operation) -> Result<()> {
        if !matches!(
            statement.kind(),
            OperationKind::Block | OperationKind::Empty | OperationKind::VariableDeclarationStatement
        ) {
            self.mark_sequence_point(statement);
        }

        match statement.node() {
            OperationNode::Block { statements, locals } => {
                for local in locals {
                    self.declare_local(local);
                }
                for statement in statements {
                    self.emit_statement(statement)?;
                }
            }
            OperationNode::Empty => {}
            OperationNode::ExpressionStatement { expression } => {
                self.emit_expression(expression, false)?;
            }
            OperationNode::VariableDeclarationStatement { declarations } => {
                for declaration in declarations {
                    self.emit_statement(declaration)?;
                }
            }
            OperationNode::VariableDeclaration {
                variable,
                initializer,
            } => {
                let slot = self.declare_local(variable);
                if let Some(initializer) = initializer {
                    self.emit_expression(initializer, true)?;
                    self.asm.emit_stloc(slot);
                }
            }
            OperationNode::FieldInitializer { fields, value } => {
                self.emit_field_initializer(fields, value)?;
            }
            OperationNode::If {
                condition,
                if_true,
                if_false,
            } => {
                let else_label = self.asm.define_label();
                self.emit_expression(condition, true)?;
                self.asm.emit_branch(op::BRFALSE, else_label);
                self.emit_statement(if_true)?;
                match if_false {
                    Some(if_false) => {
                        let end = self.asm.define_label();
                        if self.asm.falls_through() {
                            self.asm.emit_branch(op::BR, end);
                        }
                        self.asm.mark_label(else_label);
                        self.emit_statement(if_false)?;
                        self.asm.mark_label(end);
                    }
                    None => self.asm.mark_label(else_label),
                }
            }
            OperationNode::WhileUntilLoop {
                is_top_test,
                is_while,
                condition,
                body,
            } => {
                let top = self.asm.define_label();
                let test = self.asm.define_label();
                let exit = self.asm.define_label();
                if *is_top_test {
                    self.asm.emit_branch(op::BR, test);
                }
                self.asm.mark_label(top);
                self.loops.push((test, exit));
                self.emit_statement(body)?;
                self.loops.pop();
                self.asm.mark_label(test);
                self.emit_expression(condition, true)?;
                let opcode = if *is_while { op::BRTRUE } else { op::BRFALSE };
                self.asm.emit_branch(opcode, top);
                self.asm.mark_label(exit);
            }
            OperationNode::Branch { kind, .. } => {
                let target = self.loops.last().map(|(next, exit)| match kind {
                    BranchKind::Continue => Some(*next),
                    BranchKind::Break => Some(*exit),
                    BranchKind::GoTo => None,
                });
                match target.flatten() {
                    Some(label) => self.asm.emit_branch(op::BR, label),
                    None => return Err(unsupported(statement)),
                }
            }
            OperationNode::Return { value } => {
                if let Some(value) = value {
                    self.emit_expression(value, true)?;
                    self.asm.emit(op::RET, 0, 1);
                } else {
                    self.asm.emit(op::RET, 0, 0);
                }
            }
            OperationNode::Throw { exception } => match exception {
                Some(exception) => {
                    self.emit_expression(exception, true)?;
                    self.asm.emit(op::THROW, 0, 1);
                }
                None => self.asm.emit_prefixed(op::RETHROW, 0, 0),
            },
            OperationNode::Invalid { children } => {
                for child in children {
                    self.emit_expression(child, false)?;
                }
            }
            _ if statement.kind().is_statement() => return Err(unsupported(statement)),
            _ => self.emit_expression(statement, false)?,
        }
        Ok(())
    }

    fn emit_field_initializer(&mut self, fields: &[Arc<FieldSymbol>], value: &Operation) -> Result<()> {
        match fields {
            [] => self.emit_expression(value, false),
            [field] => {
                self.emit_field_store_from(field, |g| g.emit_expression(value, true))
            }
            [first, ..] => {
                self.emit_expression(value, true)?;
                let ty = value
                    .result_type()
                    .cloned()
                    .unwrap_or_else(|| first.field_type().clone());
                let temp = self.allocate_temp(ty);
                self.asm.emit_stloc(temp);
                for field in fields {
                    self.emit_field_store_from(field, |g| {
                        g.asm.emit_ldloc(temp);
                        Ok(())
                    })?;
                }
                Ok(())
            }
        }
    }

    fn emit_field_store_from(
        &mut self,
        field: &Arc<FieldSymbol>,
        load: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if field.is_static() {
            load(self)?;
            self.asm
                .emit_token(op::STSFLD, TokenRef::Field(Arc::clone(field)), 0, 1);
        } else {
            self.asm.emit_ldarg(0);
            load(self)?;
            self.asm
                .emit_token(op::STFLD, TokenRef::Field(Arc::clone(field)), 0, 2);
        }
        Ok(())
    }

    // Expressions

    fn emit_expression(&mut self, expression: &Operation, used: bool) -> Result<()> {
        self.enter()?;
        let result = self.emit_expression_inner(expression, used);
        self.depth -= 1;
        result
    }

    fn emit_expression_inner(&mut self, expression: &Operation, used: bool) -> Result<()> {
        if let Some(constant) = expression.constant_value() {
            if used {
                self.emit_constant(constant);
            }
            return Ok(());
        }

        match expression.node() {
            OperationNode::Parenthesized { operand } => self.emit_expression(operand, used)?,
            OperationNode::Conversion {
                operand,
                conversion,
                ..
            } => {
                self.emit_expression(operand, true)?;
                self.emit_conversion(*conversion, operand, expression);
                self.discard_unless(used);
            }
            OperationNode::LocalReference { local } => {
                if used {
                    let slot = self.declare_local(local);
                    self.asm.emit_ldloc(slot);
                }
            }
            OperationNode::ParameterReference { parameter } => {
                if used {
                    let index = self.parameter_index(parameter.ordinal());
                    self.asm.emit_ldarg(index);
                }
            }
            OperationNode::InstanceReference { .. } => {
                if used {
                    self.asm.emit_ldarg(0);
                }
            }
            OperationNode::FieldReference { field, instance } => {
                match instance.as_deref().filter(|_| !field.is_static()) {
                    Some(instance) => {
                        self.emit_expression(instance, true)?;
                        self.asm
                            .emit_token(op::LDFLD, TokenRef::Field(Arc::clone(field)), 1, 1);
                    }
                    None => {
                        if let Some(instance) = instance {
                            self.emit_expression(instance, false)?;
                        }
                        self.asm
                            .emit_token(op::LDSFLD, TokenRef::Field(Arc::clone(field)), 1, 0);
                    }
                }
                self.discard_unless(used);
            }
            OperationNode::Invocation {
                method,
                instance,
                arguments,
                is_virtual,
            } => {
                self.emit_invocation(method, instance.as_deref(), arguments, *is_virtual)?;
                if !method.returns_void() {
                    self.discard_unless(used);
                } else if used {
                    self.asm.emit(op::LDNULL, 1, 0);
                }
            }
            OperationNode::Argument { value, .. } => self.emit_expression(value, used)?,
            OperationNode::ObjectCreation {
                constructor,
                arguments,
                initializers,
            } => {
                let Some(constructor) = constructor else {
                    return self.emit_invalid(expression, used);
                };
                for argument in arguments {
                    self.emit_expression(argument, true)?;
                }
                let pops = i32::try_from(arguments.len()).unwrap_or(i32::MAX);
                self.asm.emit_token(
                    op::NEWOBJ,
                    TokenRef::Method(Arc::clone(constructor)),
                    1,
                    pops,
                );
                self.emit_member_initializers(initializers)?;
                self.discard_unless(used);
            }
            OperationNode::AnonymousObjectCreation { initializers } => {
                let template = expression
                    .result_type()
                    .and_then(TypeSymbol::as_named)
                    .map(|t| t.full_metadata_name());
                let constructor = template
                    .as_ref()
                    .and_then(|name| self.context.anonymous_constructors.get(name))
                    .cloned();
                let Some(constructor) = constructor else {
                    let name = template.unwrap_or_default();
                    self.missing_member(expression, &name, ".ctor");
                    return self.emit_invalid(expression, used);
                };
                self.asm
                    .emit_token(op::NEWOBJ, TokenRef::Method(constructor), 1, 0);
                self.emit_member_initializers(initializers)?;
                self.discard_unless(used);
            }
            OperationNode::BinaryOperator {
                operator,
                left,
                right,
                ..
            } => {
                self.emit_binary(expression, *operator, left, right)?;
                self.discard_unless(used);
            }
            OperationNode::UnaryOperator {
                operator, operand, ..
            } => {
                self.emit_expression(operand, true)?;
                match operator {
                    UnaryOperatorKind::Plus => {}
                    UnaryOperatorKind::Minus => self.asm.emit(op::NEG, 1, 1),
                    UnaryOperatorKind::BitwiseNegation => self.asm.emit(op::NOT, 1, 1),
                    UnaryOperatorKind::Not => {
                        self.asm.emit_i4(0);
                        self.asm.emit_prefixed(op::CEQ, 1, 2);
                    }
                }
                self.discard_unless(used);
            }
            OperationNode::ConditionalChoice {
                condition,
                if_true,
                if_false,
            } => {
                let else_label = self.asm.define_label();
                let end = self.asm.define_label();
                self.emit_expression(condition, true)?;
                self.asm.emit_branch(op::BRFALSE, else_label);
                self.emit_expression(if_true, true)?;
                self.asm.emit_branch(op::BR, end);
                self.asm.mark_label(else_label);
                self.emit_expression(if_false, true)?;
                self.asm.mark_label(end);
                self.discard_unless(used);
            }
            OperationNode::Assignment { target, value } => {
                let place = self.prepare_place(target)?;
                self.emit_expression(value, true)?;
                self.store_place(&place, used);
            }
            OperationNode::CompoundAssignment {
                operator,
                target,
                value,
            } => {
                let place = self.prepare_place(target)?;
                self.load_place(&place);
                if self.is_string(expression) && *operator == BinaryOperatorKind::Add {
                    self.emit_to_string(value, expression)?;
                    self.emit_concat(expression);
                } else {
                    self.emit_expression(value, true)?;
                    self.emit_arithmetic(*operator);
                }
                self.store_place(&place, used);
            }
            OperationNode::Increment { kind, target } => {
                let place = self.prepare_place(target)?;
                self.load_place(&place);
                let postfix = matches!(
                    kind,
                    IncrementKind::PostfixIncrement | IncrementKind::PostfixDecrement
                );
                let value_type = expression.result_type().or(target.result_type()).cloned();
                let saved = match value_type.filter(|_| postfix && used) {
                    Some(ty) => {
                        let temp = self.allocate_temp(ty);
                        self.asm.emit(op::DUP, 2, 1);
                        self.asm.emit_stloc(temp);
                        Some(temp)
                    }
                    None => None,
                };
                self.asm.emit_i4(1);
                let opcode = if kind.is_increment() { op::ADD } else { op::SUB };
                self.asm.emit(opcode, 1, 2);
                match saved {
                    Some(temp) => {
                        self.store_place(&place, false);
                        self.asm.emit_ldloc(temp);
                    }
                    None => self.store_place(&place, used),
                }
            }
            OperationNode::Invalid { .. } => self.emit_invalid(expression, used)?,
            OperationNode::MethodBinding { instance, .. } => {
                if let Some(instance) = instance {
                    self.emit_expression(instance, false)?;
                }
                self.emit_invalid(expression, used)?;
            }
            _ => return Err(unsupported(expression)),
        }
        Ok(())
    }

    fn discard_unless(&mut self, used: bool) {
        if !used {
            self.asm.emit(op::POP, 0, 1);
        }
    }

    fn emit_invalid(&mut self, expression: &Operation, used: bool) -> Result<()> {
        if let OperationNode::Invalid { children } = expression.node() {
            for child in children {
                self.emit_expression(child, false)?;
            }
        }
        if used {
            self.asm.emit(op::LDNULL, 1, 0);
        }
        Ok(())
    }

    fn emit_constant(&mut self, constant: &ConstantValue) {
        match constant {
            ConstantValue::Null => self.asm.emit(op::LDNULL, 1, 0),
            ConstantValue::Boolean(value) => self.asm.emit_i4(i32::from(*value)),
            ConstantValue::Int32(value) => self.asm.emit_i4(*value),
            ConstantValue::String(value) => {
                self.asm
                    .emit_token(op::LDSTR, TokenRef::String(value.clone()), 1, 0);
            }
        }
    }

    fn emit_conversion(&mut self, conversion: ConversionKind, operand: &Operation, target: &Operation) {
        match conversion {
            ConversionKind::Identity
            | ConversionKind::ImplicitReference
            | ConversionKind::Numeric
            | ConversionKind::Invalid => {}
            ConversionKind::Boxing => {
                if let Some(ty) = operand.result_type() {
                    self.asm.emit_token(op::BOX, TokenRef::Type(ty.clone()), 1, 1);
                }
            }
            ConversionKind::ExplicitReference => {
                if let Some(ty) = target.result_type() {
                    self.asm
                        .emit_token(op::CASTCLASS, TokenRef::Type(ty.clone()), 1, 1);
                }
            }
            ConversionKind::Unboxing => {
                if let Some(ty) = target.result_type() {
                    self.asm
                        .emit_token(op::UNBOX_ANY, TokenRef::Type(ty.clone()), 1, 1);
                }
            }
        }
    }

    fn emit_invocation(
        &mut self,
        method: &Arc<MethodSymbol>,
        instance: Option<&Operation>,
        arguments: &[Operation],
        is_virtual: bool,
    ) -> Result<()> {
        let mut pops = i32::try_from(arguments.len()).unwrap_or(i32::MAX);
        let mut opcode = op::CALL;
        if let Some(instance) = instance {
            self.emit_expression(instance, true)?;
            if method.is_static() {
                self.asm.emit(op::POP, 0, 1);
            } else {
                pops += 1;
                let is_base = matches!(
                    instance.node(),
                    OperationNode::InstanceReference {
                        kind: InstanceReferenceKind::Base
                    }
                );
                if let Some(ty) = instance
                    .result_type()
                    .filter(|t| !t.is_reference_type() && !t.is_error())
                {
                    self.asm.emit_token(op::BOX, TokenRef::Type(ty.clone()), 1, 1);
                }
                if is_virtual || !is_base {
                    opcode = op::CALLVIRT;
                }
            }
        }
        for argument in arguments {
            self.emit_expression(argument, true)?;
        }
        let pushes = i32::from(!method.returns_void());
        self.asm
            .emit_token(opcode, TokenRef::Method(Arc::clone(method)), pushes, pops);
        Ok(())
    }

    fn emit_member_initializers(&mut self, initializers: &[Operation]) -> Result<()> {
        for initializer in initializers {
            let OperationNode::Assignment { target, value } = initializer.node() else {
                self.emit_expression(initializer, false)?;
                continue;
            };
            let OperationNode::FieldReference { field, .. } = target.node() else {
                self.emit_expression(value, false)?;
                continue;
            };
            self.asm.emit(op::DUP, 2, 1);
            self.emit_expression(value, true)?;
            self.asm
                .emit_token(op::STFLD, TokenRef::Field(Arc::clone(field)), 0, 2);
        }
        Ok(())
    }

    fn is_string(&self, operation: &Operation) -> bool {
        operation
            .result_type()
            .is_some_and(|t| t.special_type() == SpecialType::String)
    }

    fn emit_binary(
        &mut self,
        expression: &Operation,
        operator: BinaryOperatorKind,
        left: &Operation,
        right: &Operation,
    ) -> Result<()> {
        match operator {
            BinaryOperatorKind::ConditionalAnd | BinaryOperatorKind::ConditionalOr => {
                let short = self.asm.define_label();
                let end = self.asm.define_label();
                let (branch, short_value) = if operator == BinaryOperatorKind::ConditionalAnd {
                    (op::BRFALSE, 0)
                } else {
                    (op::BRTRUE, 1)
                };
                self.emit_expression(left, true)?;
                self.asm.emit_branch(branch, short);
                self.emit_expression(right, true)?;
                self.asm.emit_branch(op::BR, end);
                self.asm.mark_label(short);
                self.asm.emit_i4(short_value);
                self.asm.mark_label(end);
            }
            BinaryOperatorKind::Add if self.is_string(expression) => {
                self.emit_to_string(left, expression)?;
                self.emit_to_string(right, expression)?;
                self.emit_concat(expression);
            }
            BinaryOperatorKind::Equals
            | BinaryOperatorKind::NotEquals
            | BinaryOperatorKind::LessThan
            | BinaryOperatorKind::LessThanOrEqual
            | BinaryOperatorKind::GreaterThan
            | BinaryOperatorKind::GreaterThanOrEqual => {
                self.emit_expression(left, true)?;
                self.emit_expression(right, true)?;
                let (compare, negate) = match operator {
                    BinaryOperatorKind::Equals => (op::CEQ, false),
                    BinaryOperatorKind::NotEquals => (op::CEQ, true),
                    BinaryOperatorKind::LessThan => (op::CLT, false),
                    BinaryOperatorKind::GreaterThanOrEqual => (op::CLT, true),
                    BinaryOperatorKind::GreaterThan => (op::CGT, false),
                    _ => (op::CGT, true),
                };
                self.asm.emit_prefixed(compare, 1, 2);
                if negate {
                    self.asm.emit_i4(0);
                    self.asm.emit_prefixed(op::CEQ, 1, 2);
                }
            }
            _ => {
                self.emit_expression(left, true)?;
                self.emit_expression(right, true)?;
                self.emit_arithmetic(operator);
            }
        }
        Ok(())
    }

    fn emit_arithmetic(&mut self, operator: BinaryOperatorKind) {
        let opcode = match operator {
            BinaryOperatorKind::Subtract => op::SUB,
            BinaryOperatorKind::Multiply => op::MUL,
            BinaryOperatorKind::Divide => op::DIV,
            BinaryOperatorKind::Remainder => op::REM,
            BinaryOperatorKind::And => op::AND,
            BinaryOperatorKind::Or => op::OR,
            BinaryOperatorKind::ExclusiveOr => op::XOR,
            BinaryOperatorKind::LeftShift => op::SHL,
            BinaryOperatorKind::RightShift => op::SHR,
            _ => op::ADD,
        };
        self.asm.emit(opcode, 1, 2);
    }

    /// Pushes `operand` as a string: value types are boxed, other non-strings are
    /// converted through `Object.ToString`.
    fn emit_to_string(&mut self, operand: &Operation, context: &Operation) -> Result<()> {
        self.emit_expression(operand, true)?;
        let Some(ty) = operand.result_type().cloned() else {
            return Ok(());
        };
        if ty.special_type() == SpecialType::String {
            return Ok(());
        }
        if !ty.is_reference_type() && !ty.is_error() {
            self.asm.emit_token(op::BOX, TokenRef::Type(ty), 1, 1);
        }
        match self.context.well_known.object_to_string.clone() {
            Some(to_string) => {
                self.asm
                    .emit_token(op::CALLVIRT, TokenRef::Method(to_string), 1, 1);
            }
            None => self.missing_member(context, "System.Object", "ToString"),
        }
        Ok(())
    }

    fn emit_concat(&mut self, context: &Operation) {
        match self.context.well_known.string_concat.clone() {
            Some(concat) => self.asm.emit_token(op::CALL, TokenRef::Method(concat), 1, 2),
            None => {
                self.missing_member(context, "System.String", "Concat");
                self.asm.emit(op::POP, 0, 1);
                self.asm.emit(op::POP, 0, 1);
                self.asm.emit(op::LDNULL, 1, 0);
            }
        }
    }

    // Assignable locations

    fn prepare_place(&mut self, target: &Operation) -> Result<Place> {
        Ok(match target.node() {
            OperationNode::LocalReference { local } => Place::Local(self.declare_local(local)),
            OperationNode::ParameterReference { parameter } => {
                Place::Parameter(self.parameter_index(parameter.ordinal()))
            }
            OperationNode::FieldReference { field, instance } if !field.is_static() => {
                match instance {
                    Some(instance) => self.emit_expression(instance, true)?,
                    None => self.asm.emit_ldarg(0),
                }
                Place::InstanceField(Arc::clone(field))
            }
            OperationNode::FieldReference { field, instance } => {
                if let Some(instance) = instance {
                    self.emit_expression(instance, false)?;
                }
                Place::StaticField(Arc::clone(field))
            }
            _ => {
                self.emit_expression(target, false)?;
                Place::None
            }
        })
    }

    fn load_place(&mut self, place: &Place) {
        match place {
            Place::Local(slot) => self.asm.emit_ldloc(*slot),
            Place::Parameter(index) => self.asm.emit_ldarg(*index),
            Place::InstanceField(field) => {
                self.asm.emit(op::DUP, 2, 1);
                self.asm
                    .emit_token(op::LDFLD, TokenRef::Field(Arc::clone(field)), 1, 1);
            }
            Place::StaticField(field) => {
                self.asm
                    .emit_token(op::LDSFLD, TokenRef::Field(Arc::clone(field)), 1, 0);
            }
            Place::None => self.asm.emit(op::LDNULL, 1, 0),
        }
    }

    /// Stores the value on top of the stack; leaves a copy when `used`.
    fn store_place(&mut self, place: &Place, used: bool) {
        match place {
            Place::Local(slot) => {
                if used {
                    self.asm.emit(op::DUP, 2, 1);
                }
                self.asm.emit_stloc(*slot);
            }
            Place::Parameter(index) => {
                if used {
                    self.asm.emit(op::DUP, 2, 1);
                }
                self.asm.emit_starg(*index);
            }
            Place::InstanceField(field) => {
                let saved = used.then(|| {
                    let temp = self.allocate_temp(field.field_type().clone());
                    self.asm.emit(op::DUP, 2, 1);
                    self.asm.emit_stloc(temp);
                    temp
                });
                self.asm
                    .emit_token(op::STFLD, TokenRef::Field(Arc::clone(field)), 0, 2);
                if let Some(temp) = saved {
                    self.asm.emit_ldloc(temp);
                }
            }
            Place::StaticField(field) => {
                if used {
                    self.asm.emit(op::DUP, 2, 1);
                }
                self.asm
                    .emit_token(op::STSFLD, TokenRef::Field(Arc::clone(field)), 0, 1);
            }
            Place::None => {
                if !used {
                    self.asm.emit(op::POP, 0, 1);
                }
            }
        }
    }
}

/// `true` if `node` is `root` or one of its descendants.
fn contains_node(root: &SyntaxNode, node: &SyntaxNode) -> bool {
    if root == node {
        return true;
    }
    root.children()
        .iter()
        .filter(|child| child.span().contains_span(node.span()))
        .any(|child| contains_node(child, node))
}

fn unsupported(operation: &Operation) -> Error {
    Error::InvalidOperation(format!(
        "no code generation for {:?} operations",
        operation.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lang::MiniLanguage,
        options::{CompilationOptions, OutputKind},
        references::{AssemblyMetadata, MetadataReference},
        utils::CancellationToken,
        Compilation,
    };

    fn compile(source: &str) -> Compilation {
        MiniLanguage::create_compilation(
            Some("Gen"),
            [MiniLanguage::parse(source, "gen.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
        )
        .unwrap()
    }

    fn generate(compilation: &Compilation, type_name: &str, method: &str) -> MethodBody {
        let declaration = compilation.declaration().unwrap();
        let ty = compilation.get_type_by_metadata_name(type_name).unwrap().unwrap();
        let method = ty.methods().find(|m| m.name() == method).unwrap().clone();
        let body = compilation
            .get_method_body(&method, &CancellationToken::none())
            .unwrap()
            .unwrap();
        let context = CodeGenContext {
            well_known: WellKnownMembers::resolve(&declaration.lookup),
            anonymous_constructors: HashMap::new(),
            trees: compilation.syntax_trees(),
        };
        let (generated, diagnostics) =
            CodeGenerator::generate(&context, &method, &body.operation).unwrap();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        generated
    }

    #[test]
    fn test_tiny_and_fat_headers() {
        assert_eq!(encode_method_body_header(10, 2, 0, false).unwrap(), vec![0x2A]);

        let fat = encode_method_body_header(10, 2, 0x1100_0001, false).unwrap();
        assert_eq!(fat.len(), 12);
        assert_eq!(u16::from_le_bytes([fat[0], fat[1]]), 0x3013);
        assert_eq!(u16::from_le_bytes([fat[2], fat[3]]), 2);
        assert_eq!(u32::from_le_bytes([fat[4], fat[5], fat[6], fat[7]]), 10);

        assert_eq!(encode_method_body_header(64, 1, 0, false).unwrap().len(), 12);
        assert_eq!(encode_method_body_header(4, 9, 0, false).unwrap().len(), 12);
    }

    #[test]
    fn test_branches_resolve_relative_to_next_instruction() {
        let mut asm = IlAssembler::new();
        let end = asm.define_label();
        asm.emit_i4(1);
        asm.emit_branch(op::BRTRUE, end);
        asm.emit_i4(200);
        asm.emit(op::POP, 0, 1);
        asm.mark_label(end);
        asm.emit(op::RET, 0, 0);
        let (code, max_stack, _) = asm.finish().unwrap();
        assert_eq!(&code[1..6], &[op::BRTRUE, 3, 0, 0, 0]);
        assert_eq!(max_stack, 1);
    }

    #[test]
    fn test_unmarked_label_is_an_error() {
        let mut asm = IlAssembler::new();
        let nowhere = asm.define_label();
        asm.emit_branch(op::BR, nowhere);
        assert!(matches!(asm.finish(), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_parameters_and_arithmetic() {
        let compilation = compile("class C { int Add(int a, int b) { return a + b; } }");
        let body = generate(&compilation, "C", "Add");
        assert_eq!(body.il, vec![0x03, 0x04, op::ADD, op::RET]);
        assert_eq!(body.max_stack, 2);
        assert!(body.locals.is_empty());
        assert_eq!(body.sequence_points.len(), 1);
    }

    #[test]
    fn test_string_concat_boxes_value_operands() {
        let compilation = compile("class C { string Show(int x) { return \"v\" + x; } }");
        let body = generate(&compilation, "C", "Show");
        let opcodes: Vec<u8> = [0usize, 5, 6, 11, 16, 21].iter().map(|i| body.il[*i]).collect();
        assert_eq!(
            opcodes,
            [op::LDSTR, 0x03, op::BOX, op::CALLVIRT, op::CALL, op::RET]
        );
        let kinds: Vec<&str> = body
            .fixups
            .iter()
            .map(|(_, token)| match token {
                TokenRef::String(_) => "string",
                TokenRef::Type(_) => "type",
                TokenRef::Method(m) => m.name(),
                TokenRef::Field(_) => "field",
            })
            .collect();
        assert_eq!(kinds, ["string", "type", "ToString", "Concat"]);
    }

    #[test]
    fn test_locals_and_loops() {
        let compilation = compile(
            "class C { int Sum(int n) { int total = 0; while (n > 0) { total = total + n; n = n - 1; if (total > 100) break; } return total; } }",
        );
        let body = generate(&compilation, "C", "Sum");
        assert_eq!(body.locals.len(), 1);
        assert_eq!(body.il.last(), Some(&op::RET));
        assert!(body.sequence_points.len() >= 4);
        assert!(body.sequence_points.windows(2).all(|w| w[0].offset < w[1].offset));
    }

    #[test]
    fn test_void_method_gets_trailing_return() {
        let compilation = compile("class C { int count; void Bump() { count++; } }");
        let body = generate(&compilation, "C", "Bump");
        assert_eq!(body.il.first(), Some(&0x02));
        assert_eq!(body.il.last(), Some(&op::RET));
        assert!(body.fixups.iter().all(|(_, t)| matches!(t, TokenRef::Field(_))));
    }

    #[test]
    fn test_constructor_chains_to_base() {
        let compilation = compile("class C { int a = 5; }");
        let body = generate(&compilation, "C", ".ctor");
        assert_eq!(&body.il[..2], &[0x02, op::CALL]);
        assert!(matches!(&body.fixups[0].1, TokenRef::Method(m) if m.name() == ".ctor"));
        assert!(matches!(&body.fixups[1].1, TokenRef::Field(f) if f.name() == "a"));
    }

    #[test]
    fn test_nesting_beyond_limit_is_an_error() {
        let compilation = compile("class C { void M() { } }");
        let declaration = compilation.declaration().unwrap();
        let ty = compilation.get_type_by_metadata_name("C").unwrap().unwrap();
        let method = ty.methods().find(|m| m.name() == "M").unwrap().clone();
        let context = CodeGenContext {
            well_known: WellKnownMembers::resolve(&declaration.lookup),
            anonymous_constructors: HashMap::new(),
            trees: compilation.syntax_trees(),
        };

        let nested = |levels: usize| {
            let mut body = Operation::block(Vec::new(), Vec::new());
            for _ in 0..levels {
                body = Operation::block(vec![body], Vec::new());
            }
            body
        };

        assert!(CodeGenerator::generate_with_max_depth(&context, &method, &nested(6), 8).is_ok());
        let err = CodeGenerator::generate_with_max_depth(&context, &method, &nested(12), 8).unwrap_err();
        assert!(matches!(err, Error::RecursionLimit(8)));
    }

    #[test]
    fn test_metadata_only_and_default_bodies() {
        assert_eq!(MethodBody::throw_null().il, vec![op::LDNULL, op::THROW]);
        let body = MethodBody::default_constructor(None);
        assert_eq!(body.il, vec![op::RET]);
    }
}
