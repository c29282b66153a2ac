//! Per-block symbolic interpreter (§4.1): walks one basic block's
//! instructions, maintaining a symbolic `locals` map and `stack`, and
//! emits a `BlockDataGraph`.

use ahash::AHashMap;
use tracing::warn;

use super::descriptor::{parse_descriptor, parse_field_descriptor};
use super::opcodes::{self, mnemonic};
use crate::errors::{EngineError, Result};
use crate::features::graph_builder::domain::{
    DataNode, FlyweightKind, GetFieldRecord, GetStaticRecord, Invocation, MethodDataGraph, NodeId,
    Operation, PutFieldRecord, PutStaticRecord,
};
use crate::features::graph_builder::domain::BlockDataGraph;
use crate::features::graph_builder::ports::{
    BasicBlockInfo, ClassResolver, FieldRef, Instruction, LdcConstant, MethodBody, MethodRef,
};
use crate::shared::VerificationType;

struct Interp<'a> {
    resolver: &'a dyn ClassResolver,
    body: &'a MethodBody<'a>,
    locals: AHashMap<u32, NodeId>,
    stack: Vec<NodeId>,
    graph: &'a mut MethodDataGraph,
    out: BlockDataGraph,
}

pub fn interpret_block(
    resolver: &dyn ClassResolver,
    body: &MethodBody,
    block: &BasicBlockInfo,
    entry_locals: AHashMap<u32, NodeId>,
    entry_stack: Vec<NodeId>,
    graph: &mut MethodDataGraph,
) -> Result<BlockDataGraph> {
    let mut out = BlockDataGraph::new(block.id);
    out.entry_locals = entry_locals.clone();
    out.entry_stack = entry_stack.clone();

    let mut interp = Interp { resolver, body, locals: entry_locals, stack: entry_stack, graph, out };

    let instructions = body.code.instructions();
    let start = instructions
        .iter()
        .position(|i| i.offset == block.start_offset)
        .ok_or_else(|| EngineError::bad_bytecode(body.method.to_string(), "block start offset not found"))?;

    let mut idx = start;
    while idx < instructions.len() && instructions[idx].offset < block.end_offset {
        let instr = &instructions[idx];
        let next_offset = instructions.get(idx + 1).map(|i| i.offset).unwrap_or(block.end_offset);
        interp.assert_stack_size(instr.offset);
        interp.step(instr, next_offset)?;
        idx += 1;
    }

    interp.out.exit_locals = interp.locals;
    interp.out.exit_stack = interp.stack;
    Ok(interp.out)
}

impl<'a> Interp<'a> {
    fn assert_stack_size(&self, offset: u32) {
        if let Some(frame) = self.body.verifier.frame_at(offset) {
            let symbolic: usize = self.stack.iter().map(|id| self.graph.type_of(*id).category() as usize).sum();
            debug_assert_eq!(
                symbolic,
                frame.stack.len(),
                "stack-size disagreement with verifier at offset {offset} in {}",
                self.body.method
            );
        }
    }

    fn push(&mut self, node: NodeId) {
        self.stack.push(node);
    }

    fn pop(&mut self) -> Result<NodeId> {
        self.stack.pop().ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "pop from empty stack"))
    }

    fn alloc_push(&mut self, node: DataNode) {
        let id = self.graph.alloc(node);
        if let NodeId::Arena(i) = id {
            self.out.produced.push(i);
        }
        self.push(id);
    }

    fn result_type_from_next_frame(&self, next_offset: u32) -> Result<VerificationType> {
        let frame = self.body.verifier.frame_at(next_offset).ok_or_else(|| {
            EngineError::bad_bytecode(self.body.method.to_string(), format!("no verifier frame at offset {next_offset}"))
        })?;
        let top = frame.stack.last().cloned().unwrap_or(VerificationType::Top);
        if top == VerificationType::Top && frame.stack.len() >= 2 {
            Ok(frame.stack[frame.stack.len() - 2].clone())
        } else {
            Ok(top)
        }
    }

    fn step(&mut self, instr: &Instruction, next_offset: u32) -> Result<()> {
        let op = instr.opcode;
        match op {
            opcodes::NOP => {}

            opcodes::ACONST_NULL => self.push(NodeId::Flyweight(FlyweightKind::Null)),

            opcodes::ICONST_M1 => self.alloc_push(DataNode::new("int -1", VerificationType::IntLike, Operation::Constant, vec![])),
            opcodes::ICONST_0..=opcodes::ICONST_5 => {
                self.push(NodeId::Flyweight(FlyweightKind::IntConst(op - opcodes::ICONST_0)))
            }
            opcodes::LCONST_0 => self.push(NodeId::Flyweight(FlyweightKind::LongConst0)),
            opcodes::LCONST_1 => self.push(NodeId::Flyweight(FlyweightKind::LongConst1)),
            opcodes::FCONST_0..=opcodes::FCONST_2 => {
                self.alloc_push(DataNode::new(format!("float {}", op - opcodes::FCONST_0), VerificationType::Float, Operation::Constant, vec![]))
            }
            opcodes::DCONST_0 | opcodes::DCONST_1 => {
                self.alloc_push(DataNode::new(format!("double {}", op - opcodes::DCONST_0), VerificationType::Double, Operation::Constant, vec![]))
            }
            opcodes::BIPUSH => {
                let v = instr.u8bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "BIPUSH missing operand"))?;
                self.alloc_push(DataNode::new(format!("bipush {v}"), VerificationType::IntLike, Operation::Constant, vec![]));
            }
            opcodes::SIPUSH => {
                let v = instr.u16bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "SIPUSH missing operand"))?;
                self.alloc_push(DataNode::new(format!("sipush {v}"), VerificationType::IntLike, Operation::Constant, vec![]));
            }
            opcodes::LDC => {
                let idx = instr.u8bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "LDC missing operand"))? as u16;
                self.push_ldc(idx)?;
            }
            opcodes::LDC_W => {
                let idx = instr.u16bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "LDC_W missing operand"))?;
                self.push_ldc(idx)?;
            }
            opcodes::LDC2_W => {
                // §9 fix: the constant-pool index comes from this instruction's
                // own operand bytes, not from the instruction's offset.
                let idx = instr.u16bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "LDC2_W missing operand"))?;
                self.push_ldc(idx)?;
            }

            opcodes::ILOAD..=opcodes::ALOAD => {
                let slot = instr.u8bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "xLOAD missing operand"))? as u32;
                self.load_slot(slot)?;
            }
            opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
                let slot = (op - load_n_base(op)) as u32;
                self.load_slot(slot)?;
            }

            opcodes::IALOAD..=opcodes::SALOAD => {
                let index = self.pop()?;
                let arrayref = self.pop()?;
                let ty = match array_element_type(op) {
                    Some(ty) => ty,
                    None => self.result_type_from_next_frame(next_offset)?,
                };
                self.alloc_push(DataNode::new(mnemonic(op), ty, Operation::Bytecode(array_mnemonic(op)), vec![arrayref, index]));
            }

            opcodes::ISTORE..=opcodes::ASTORE => {
                let slot = instr.u8bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "xSTORE missing operand"))? as u32;
                self.store_slot(slot)?;
            }
            opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
                let slot = (op - store_n_base(op)) as u32;
                self.store_slot(slot)?;
            }

            opcodes::IASTORE..=opcodes::SASTORE => {
                let _value = self.pop()?;
                let _index = self.pop()?;
                let _arrayref = self.pop()?;
            }

            opcodes::POP => {
                self.pop()?;
            }
            opcodes::POP2 => {
                // §9(ii): pop one category-2 value, or two category-1 values.
                let top = self.pop()?;
                if self.graph.type_of(top).category() == 1 {
                    self.pop()?;
                }
            }
            opcodes::DUP => {
                let top = *self.stack.last().ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "DUP on empty stack"))?;
                self.push(top);
            }

            opcodes::IADD..=opcodes::LXOR => {
                let arity = arithmetic_arity(op);
                let mut inputs = Vec::with_capacity(arity);
                for _ in 0..arity {
                    inputs.push(self.pop()?);
                }
                inputs.reverse();
                let ty = self.result_type_from_next_frame(next_offset)?;
                self.alloc_push(DataNode::new(mnemonic(op), ty, Operation::Bytecode(arithmetic_mnemonic(op)), inputs));
            }

            opcodes::IINC => {
                let slot = instr.u8bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "IINC missing slot"))? as u32;
                let current = *self.locals.get(&slot).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "IINC on unassigned slot"))?;
                let id = self.graph.alloc(DataNode::new("iinc", VerificationType::IntLike, Operation::Bytecode("IINC"), vec![current]));
                if let NodeId::Arena(i) = id {
                    self.out.produced.push(i);
                }
                self.locals.insert(slot, id);
            }

            opcodes::I2L | opcodes::I2F | opcodes::I2D | opcodes::L2I | opcodes::L2F | opcodes::L2D
            | opcodes::F2I | opcodes::F2L | opcodes::F2D | opcodes::D2I | opcodes::D2L | opcodes::D2F
            | opcodes::I2B | opcodes::I2C | opcodes::I2S => {
                let input = self.pop()?;
                let ty = self.result_type_from_next_frame(next_offset)?;
                self.alloc_push(DataNode::new(mnemonic(op), ty, Operation::Bytecode(conversion_mnemonic(op)), vec![input]));
            }

            opcodes::LCMP..=opcodes::DCMPG => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.alloc_push(DataNode::new(mnemonic(op), VerificationType::IntLike, Operation::Bytecode("xCMPx"), vec![a, b]));
            }

            opcodes::IFEQ..=opcodes::IFLE => {
                self.pop()?;
            }
            opcodes::IF_ICMPEQ..=opcodes::IF_ACMPNE => {
                self.pop()?;
                self.pop()?;
            }
            opcodes::GOTO => {}
            opcodes::IFNULL | opcodes::IFNONNULL => {
                self.pop()?;
            }

            opcodes::GETSTATIC => {
                let field = self.resolver.fieldref_at(&self.body.method, instr.offset)?;
                let ty = parse_field_descriptor(&field.descriptor)?;
                let id = self.graph.alloc(DataNode::new(field_label(&field), ty, Operation::GetStatic(field.clone()), vec![]));
                if let NodeId::Arena(i) = id {
                    self.out.produced.push(i);
                }
                self.out.get_statics.push(GetStaticRecord { field, result: id });
                self.push(id);
            }
            opcodes::GETFIELD => {
                let field = self.resolver.fieldref_at(&self.body.method, instr.offset)?;
                let receiver = self.pop()?;
                let ty = parse_field_descriptor(&field.descriptor)?;
                let id = self.graph.alloc(DataNode::new(field_label(&field), ty, Operation::GetField(field.clone()), vec![receiver]));
                if let NodeId::Arena(i) = id {
                    self.out.produced.push(i);
                }
                self.out.get_fields.push(GetFieldRecord { field, receiver, result: id });
                self.push(id);
            }
            opcodes::PUTSTATIC => {
                let field = self.resolver.fieldref_at(&self.body.method, instr.offset)?;
                let value = self.pop()?;
                self.out.put_statics.push(PutStaticRecord { field, value });
            }
            opcodes::PUTFIELD => {
                let field = self.resolver.fieldref_at(&self.body.method, instr.offset)?;
                let value = self.pop()?;
                let receiver = self.pop()?;
                self.out.put_fields.push(PutFieldRecord { field, receiver, value });
            }

            opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKEINTERFACE | opcodes::INVOKESTATIC => {
                let (target, _declared_static) = self.resolver.methodref_at(&self.body.method, instr.offset)?;
                let is_static = op == opcodes::INVOKESTATIC;
                let (param_types, return_type) = parse_descriptor(&target.descriptor)?;
                let mut parameters = Vec::with_capacity(param_types.len() + 1);
                for _ in 0..param_types.len() {
                    parameters.push(self.pop()?);
                }
                parameters.reverse();
                if !is_static {
                    parameters.insert(0, self.pop()?);
                }
                let result = if let Some(ty) = return_type {
                    let id = self.graph.alloc(DataNode::new("invoke result", ty, Operation::InvocationResult(target.clone()), vec![]));
                    if let NodeId::Arena(i) = id {
                        self.out.produced.push(i);
                    }
                    self.push(id);
                    Some(id)
                } else {
                    None
                };
                self.out.invocations.push(Invocation { target, parameters, result, is_static, is_dynamic: false });
            }
            opcodes::INVOKEDYNAMIC => {
                let (name, descriptor) = self.resolver.invokedynamic_at(&self.body.method, instr.offset)?;
                let (param_types, return_type) = parse_descriptor(&descriptor)?;
                let mut parameters = Vec::with_capacity(param_types.len());
                for _ in 0..param_types.len() {
                    parameters.push(self.pop()?);
                }
                parameters.reverse();
                let target = crate::features::graph_builder::ports::MethodRef {
                    class: "<dynamic>".to_string(),
                    name,
                    descriptor,
                };
                let result = if let Some(ty) = return_type {
                    let id = self.graph.alloc(DataNode::new("invokedynamic result", ty, Operation::InvocationResult(target.clone()), vec![]));
                    if let NodeId::Arena(i) = id {
                        self.out.produced.push(i);
                    }
                    self.push(id);
                    Some(id)
                } else {
                    None
                };
                self.out.invocations.push(Invocation { target, parameters, result, is_static: true, is_dynamic: true });
            }

            opcodes::NEW => {
                let idx = instr.u16bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "NEW missing operand"))?;
                let class = self.resolve_class_constant(idx)?;
                self.alloc_push(DataNode::new(format!("new {class}"), VerificationType::Uninitialized, Operation::Bytecode("NEW"), vec![]));
            }
            opcodes::NEWARRAY => {
                let atype = instr.u8bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "NEWARRAY missing operand"))?;
                let length = self.pop()?;
                let elem = primitive_array_type(atype)?;
                self.alloc_push(DataNode::new("newarray", VerificationType::Reference(format!("[{elem}")), Operation::Bytecode("NEWARRAY"), vec![length]));
            }
            opcodes::ANEWARRAY => {
                let idx = instr.u16bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "ANEWARRAY missing operand"))?;
                let class = self.resolve_class_constant(idx)?;
                let length = self.pop()?;
                self.alloc_push(DataNode::new("anewarray", VerificationType::Reference(format!("[L{class};")), Operation::Bytecode("ANEWARRAY"), vec![length]));
            }
            opcodes::ARRAYLENGTH => {
                let arrayref = self.pop()?;
                self.alloc_push(DataNode::new("arraylength", VerificationType::IntLike, Operation::Bytecode("ARRAYLENGTH"), vec![arrayref]));
            }
            opcodes::CHECKCAST => {
                let idx = instr.u16bit_at(0).ok_or_else(|| EngineError::bad_bytecode(self.body.method.to_string(), "CHECKCAST missing operand"))?;
                let class = self.resolve_class_constant(idx)?;
                let input = self.pop()?;
                self.alloc_push(DataNode::new("checkcast", VerificationType::Reference(class), Operation::Bytecode("CHECKCAST"), vec![input]));
            }
            opcodes::INSTANCEOF => {
                let input = self.pop()?;
                self.alloc_push(DataNode::new("instanceof", VerificationType::IntLike, Operation::Bytecode("INSTANCEOF"), vec![input]));
            }
            opcodes::ATHROW => {
                let thrown = self.pop()?;
                self.stack.clear();
                self.stack.push(thrown);
            }

            opcodes::IRETURN | opcodes::LRETURN | opcodes::FRETURN | opcodes::DRETURN | opcodes::ARETURN => {
                let value = self.pop()?;
                self.out.return_node = Some(value);
            }
            opcodes::RETURN => {
                self.out.returns_void = true;
            }

            _ => {
                warn!(method = %self.body.method, opcode = op, "unsupported opcode encountered during symbolic interpretation");
                return Err(EngineError::unsupported_opcode(self.body.method.to_string(), op, mnemonic(op), instr.offset));
            }
        }
        Ok(())
    }

    fn load_slot(&mut self, slot: u32) -> Result<()> {
        let id = *self.locals.get(&slot).ok_or_else(|| {
            EngineError::bad_bytecode(self.body.method.to_string(), format!("load from unassigned local slot {slot}"))
        })?;
        self.push(id);
        Ok(())
    }

    fn store_slot(&mut self, slot: u32) -> Result<()> {
        let value = self.pop()?;
        if self.graph.type_of(value).category() == 2 {
            self.locals.remove(&(slot + 1));
        }
        self.locals.insert(slot, value);
        Ok(())
    }

    fn push_ldc(&mut self, pool_index: u16) -> Result<()> {
        let constant = self.resolver.ldc_constant(&self.body.method, pool_index)?;
        let (label, ty) = match &constant {
            LdcConstant::Integer(v) => (format!("int {v}"), VerificationType::IntLike),
            LdcConstant::Float(v) => (format!("float {v}"), VerificationType::Float),
            LdcConstant::Long(v) => (format!("long {v}"), VerificationType::Long),
            LdcConstant::Double(v) => (format!("double {v}"), VerificationType::Double),
            LdcConstant::String(s) => (format!("string {s:?}"), VerificationType::Reference("java/lang/String".to_string())),
            LdcConstant::Class(c) => (format!("class {c}"), VerificationType::Reference("java/lang/Class".to_string())),
        };
        self.alloc_push(DataNode::new(label, ty, Operation::Constant, vec![]));
        Ok(())
    }

    fn resolve_class_constant(&self, pool_index: u16) -> Result<String> {
        match self.resolver.ldc_constant(&self.body.method, pool_index)? {
            LdcConstant::Class(c) => Ok(c),
            other => Err(EngineError::bad_bytecode(
                self.body.method.to_string(),
                format!("expected CONSTANT_Class at pool index {pool_index}, found {other:?}"),
            )),
        }
    }
}

fn field_label(field: &crate::features::graph_builder::ports::FieldRef) -> String {
    format!("{}.{}", field.class, field.name)
}

fn load_n_base(op: u8) -> u8 {
    match op {
        opcodes::ILOAD_0..=opcodes::ILOAD_3 => opcodes::ILOAD_0,
        opcodes::LLOAD_0..=opcodes::LLOAD_3 => opcodes::LLOAD_0,
        opcodes::FLOAD_0..=opcodes::FLOAD_3 => opcodes::FLOAD_0,
        opcodes::DLOAD_0..=opcodes::DLOAD_3 => opcodes::DLOAD_0,
        _ => opcodes::ALOAD_0,
    }
}

fn store_n_base(op: u8) -> u8 {
    match op {
        opcodes::ISTORE_0..=opcodes::ISTORE_3 => opcodes::ISTORE_0,
        opcodes::LSTORE_0..=opcodes::LSTORE_3 => opcodes::LSTORE_0,
        opcodes::FSTORE_0..=opcodes::FSTORE_3 => opcodes::FSTORE_0,
        opcodes::DSTORE_0..=opcodes::DSTORE_3 => opcodes::DSTORE_0,
        _ => opcodes::ASTORE_0,
    }
}

fn array_element_type(op: u8) -> Option<VerificationType> {
    match op {
        opcodes::IALOAD => Some(VerificationType::IntLike),
        opcodes::LALOAD => Some(VerificationType::Long),
        opcodes::FALOAD => Some(VerificationType::Float),
        opcodes::DALOAD => Some(VerificationType::Double),
        opcodes::BALOAD | opcodes::CALOAD | opcodes::SALOAD => Some(VerificationType::IntLike),
        _ => None, // AALOAD: type comes from the verifier frame, element class unknown here.
    }
}

fn array_mnemonic(op: u8) -> &'static str {
    match op {
        opcodes::IALOAD => "IALOAD",
        opcodes::LALOAD => "LALOAD",
        opcodes::FALOAD => "FALOAD",
        opcodes::DALOAD => "DALOAD",
        opcodes::AALOAD => "AALOAD",
        opcodes::BALOAD => "BALOAD",
        opcodes::CALOAD => "CALOAD",
        opcodes::SALOAD => "SALOAD",
        _ => "xALOAD",
    }
}

fn arithmetic_arity(op: u8) -> usize {
    // Unary ops: the negation family is the only unary member of the
    // IADD..=LXOR range; everything else in that range is binary.
    const NEG_OPS: [u8; 4] = [0x74, 0x75, 0x76, 0x77]; // INEG, LNEG, FNEG, DNEG
    if NEG_OPS.contains(&op) {
        1
    } else {
        2
    }
}

fn arithmetic_mnemonic(op: u8) -> &'static str {
    mnemonic(op)
}

fn conversion_mnemonic(op: u8) -> &'static str {
    mnemonic(op)
}

fn primitive_array_type(atype: u8) -> Result<&'static str> {
    Ok(match atype {
        4 => "Z",
        5 => "C",
        6 => "F",
        7 => "D",
        8 => "B",
        9 => "S",
        10 => "I",
        11 => "J",
        other => return Err(EngineError::bad_bytecode("<NEWARRAY>", format!("unknown atype {other}"))),
    })
}
