//! Trait boundaries to the class-pool/reflection collaborator (§6). The
//! core never depends on a concrete class-file reader; tests drive these
//! traits with hand-built fakes.

use crate::errors::Result;
use crate::shared::VerificationType;

/// A fully-qualified method or constructor reference. Used as a map key
/// across the whole engine (`TaskKey` in `painting_session` is keyed by
/// one of these), so it must be cheap to clone and hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

/// Decoded LDC/LDC_W/LDC2_W constant-pool entry (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum LdcConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
}

/// One decoded instruction: offset, raw opcode, and its operand bytes
/// exactly as they appear in the code array (big-endian multi-byte
/// operands, unresolved).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: u8,
    pub operands: Vec<u8>,
}

impl Instruction {
    pub fn u16bit_at(&self, byte_offset: usize) -> Option<u16> {
        let hi = *self.operands.get(byte_offset)? as u16;
        let lo = *self.operands.get(byte_offset + 1)? as u16;
        Some((hi << 8) | lo)
    }

    pub fn u8bit_at(&self, byte_offset: usize) -> Option<u8> {
        self.operands.get(byte_offset).copied()
    }
}

pub trait CodeIterator {
    fn instructions(&self) -> &[Instruction];
}

/// Per-offset snapshot of the verifier's stack-map frame: ground truth the
/// interpreter asserts against (§4.1 assertions), expressed bottom-to-top
/// so `stack.last()` is the top-of-stack verification type.
#[derive(Debug, Clone, Default)]
pub struct VerificationFrame {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl VerificationFrame {
    pub fn local(&self, slot: usize) -> Option<&VerificationType> {
        self.locals.get(slot)
    }

    /// `topIndex` in §4.1's stack-size assertion: the index of the last
    /// occupied verifier stack slot, or `None` for an empty stack.
    pub fn top_index(&self) -> Option<usize> {
        self.stack.len().checked_sub(1)
    }
}

pub trait Verifier {
    fn frame_at(&self, offset: u32) -> Option<&VerificationFrame>;
}

#[derive(Debug, Clone)]
pub struct BasicBlockInfo {
    pub id: u32,
    pub start_offset: u32,
    pub end_offset: u32,
    pub predecessors: Vec<u32>,
    pub successors: Vec<u32>,
}

pub trait ControlFlowAnalyzer {
    fn blocks(&self) -> &[BasicBlockInfo];
    fn entry_block(&self) -> u32;
}

/// Everything the interpreter needs about one method body before it can
/// start symbolic execution: its own identity, whether it has a receiver
/// slot, formal parameter/return types, and the three collaborators that
/// decode its bytecode.
pub struct MethodBody<'a> {
    pub method: MethodRef,
    pub is_static: bool,
    pub param_types: Vec<VerificationType>,
    pub return_type: Option<VerificationType>,
    pub code: &'a dyn CodeIterator,
    pub verifier: &'a dyn Verifier,
    pub cfg: &'a dyn ControlFlowAnalyzer,
}

/// The class-pool/reflection collaborator (§6). `None`-returning lookups
/// for field/method resolution surface to callers as
/// `EngineError::ClassNotFound` / `MethodNotFound`, which are non-fatal
/// analysis gaps (§7): the offending call site is elided, not fatal.
pub trait ClassResolver {
    fn load_class(&self, name: &str) -> Result<()>;

    fn get_field(&self, class: &str, name: &str, descriptor: &str) -> Result<FieldRef>;

    fn get_method(&self, class: &str, name: &str, descriptor: &str) -> Result<MethodRef>;

    fn get_constructor(&self, class: &str, descriptor: &str) -> Result<MethodRef>;

    fn ldc_constant(&self, method: &MethodRef, pool_index: u16) -> Result<LdcConstant>;

    /// Resolve a fieldref constant-pool entry referenced by the operands
    /// of the instruction at `offset`.
    fn fieldref_at(&self, method: &MethodRef, offset: u32) -> Result<FieldRef>;

    /// Resolve a methodref/interface-methodref constant-pool entry
    /// referenced by the operands of the instruction at `offset`. The
    /// returned bool is whether the target is declared static.
    fn methodref_at(&self, method: &MethodRef, offset: u32) -> Result<(MethodRef, bool)>;

    fn invokedynamic_at(&self, method: &MethodRef, offset: u32) -> Result<(String, String)>;

    fn method_body<'a>(&'a self, method: &MethodRef) -> Result<Option<MethodBody<'a>>>;
}
