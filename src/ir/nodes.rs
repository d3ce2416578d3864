//! The consumed IR data model.
//!
//! This is the shape of the input the generator lowers: a module of
//! functions, linear-memory globals and type metadata, with each function
//! holding a flat instruction arena and a list of basic blocks that index
//! into it. The front end that produces this IR is out of scope; the
//! generator only reads it.
//!
//! Conventions that the lowering relies on:
//! - The last instruction of every block is its terminator.
//! - Phi instructions appear at the head of their block, before any
//!   non-phi instruction.
//! - All module data is constructed before emission starts and is never
//!   mutated afterwards.

pub type FuncId = usize;
pub type BlockId = usize;
pub type InstId = usize;
pub type GlobalId = usize;

/// Source IR types. Integers carry their declared bit width (1..=32);
/// wider integers are not part of this core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Int(u32),
    Float,
    Double,
    Ptr(Box<IrType>),
    Array(Box<IrType>, u64),
    Struct(Vec<IrType>),
    Func(Box<FuncSig>),
    /// Opaque host-side type. Only ever observed behind a pointer.
    Client,
    Void,
}

impl IrType {
    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn int_width(&self) -> Option<u32> {
        match self {
            IrType::Int(w) => Some(*w),
            _ => None,
        }
    }

    /// The pointee of a pointer type, if this is one.
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncSig {
    pub params: Vec<IrType>,
    pub ret: Option<IrType>,
    pub variadic: bool,
}

impl FuncSig {
    pub fn new(params: Vec<IrType>, ret: Option<IrType>) -> FuncSig {
        FuncSig {
            params,
            ret,
            variadic: false,
        }
    }

    pub fn variadic(params: Vec<IrType>, ret: Option<IrType>) -> FuncSig {
        FuncSig {
            params,
            ret,
            variadic: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Constant {
    /// Integer constant of the given declared width. The value is stored
    /// sign-agnostically; emission decides between the signed and the
    /// zero-extended rendering based on the width.
    Int { bits: u32, value: i64 },
    Float(f32),
    Double(f64),
    /// Address of a linear-memory global, resolved through the layout helper.
    Global(GlobalId),
    /// A function used as a value; resolves to a function-table index.
    FunctionRef(FuncId),
    NullPtr,
    Undef,
    Expr(Box<ConstExpr>),
    /// Byte-array initializer (i8 array contents). Data segments only.
    Str(Vec<u8>),
    /// Aggregate initializers. Data segments only.
    Array(Vec<Constant>),
    Struct(Vec<Constant>),
}

/// Constant expressions that are lowered recursively at their use site.
#[derive(Debug, Clone)]
pub enum ConstExpr {
    Gep {
        base: Constant,
        base_ty: IrType,
        indices: Vec<Constant>,
    },
    BitCast(Constant),
    IntToPtr(Constant),
    PtrToInt(Constant),
    ICmp {
        pred: IntPredicate,
        lhs: Constant,
        rhs: Constant,
    },
    /// Anything else. Carries the opcode name for the diagnostic.
    Other(String),
}

#[derive(Debug, Clone)]
pub enum Value {
    Constant(Constant),
    Inst(InstId),
    Arg(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Sgt,
    Sge,
    Slt,
    Sle,
    Ugt,
    Uge,
    Ult,
    Ule,
}

impl IntPredicate {
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntPredicate::Sgt | IntPredicate::Sge | IntPredicate::Slt | IntPredicate::Sle
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            IntPredicate::Ugt | IntPredicate::Uge | IntPredicate::Ult | IntPredicate::Ule
        )
    }
}

/// Ordered and unordered predicates both exist in the source IR; the target
/// cannot distinguish them and the lowering collapses each pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ueq,
    Ugt,
    Uge,
    Ult,
    Ule,
    Une,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    AShr,
    LShr,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    ZExt,
    SExt,
    Trunc,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
    FpTrunc,
    FpExt,
    BitCast,
    PtrToInt,
    IntToPtr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intrinsic {
    Trap,
    VaStart,
    VaEnd,
    InvariantStart,
    LifetimeStart,
    LifetimeEnd,
    DbgDeclare,
    DbgValue,
    Ctlz,
    FltRounds,
    Downcast,
    DowncastCurrent,
    CastUser,
    /// Unrecognized intrinsic; emission aborts on these.
    Other(String),
}

#[derive(Debug, Clone)]
pub enum Callee {
    Direct(FuncId),
    Indirect(Value),
}

#[derive(Debug, Clone)]
pub enum InstKind {
    Alloca {
        alloc_ty: IrType,
    },
    Binary {
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: IntPredicate,
        lhs: Value,
        rhs: Value,
    },
    FCmp {
        pred: FloatPredicate,
        lhs: Value,
        rhs: Value,
    },
    Load {
        ptr: Value,
    },
    Store {
        ptr: Value,
        value: Value,
    },
    Gep {
        base: Value,
        indices: Vec<Value>,
    },
    Call {
        callee: Callee,
        args: Vec<Value>,
        sig: FuncSig,
    },
    Intrinsic {
        intr: Intrinsic,
        args: Vec<Value>,
    },
    Select {
        cond: Value,
        if_true: Value,
        if_false: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
    },
    VaArg {
        list: Value,
    },
    Phi {
        incoming: Vec<(BlockId, Value)>,
    },
    Ret {
        value: Option<Value>,
    },
    Br {
        dest: BlockId,
    },
    CondBr {
        cond: Value,
        if_true: BlockId,
        if_false: BlockId,
    },
    Switch {
        cond: Value,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    Unreachable,
}

/// A source location carried through for `;; file:line` markers.
#[derive(Debug, Clone)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub ty: IrType,
    pub kind: InstKind,
    pub debug_loc: Option<SourceLoc>,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Ret { .. }
                | InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Switch { .. }
                | InstKind::Unreachable
        )
    }

    pub fn may_have_side_effects(&self) -> bool {
        match &self.kind {
            InstKind::Store { .. } | InstKind::Call { .. } | InstKind::VaArg { .. } => true,
            InstKind::Intrinsic { intr, .. } => !matches!(
                intr,
                Intrinsic::Ctlz
                    | Intrinsic::FltRounds
                    | Intrinsic::Downcast
                    | Intrinsic::DowncastCurrent
                    | Intrinsic::CastUser
                    | Intrinsic::LifetimeStart
                    | Intrinsic::LifetimeEnd
                    | Intrinsic::DbgDeclare
                    | Intrinsic::DbgValue
            ),
            _ => false,
        }
    }

    /// All value operands, in evaluation order.
    pub fn operands(&self) -> Vec<&Value> {
        match &self.kind {
            InstKind::Alloca { .. } | InstKind::Unreachable | InstKind::Br { .. } => Vec::new(),
            InstKind::Binary { lhs, rhs, .. }
            | InstKind::ICmp { lhs, rhs, .. }
            | InstKind::FCmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { ptr, value } => vec![ptr, value],
            InstKind::Gep { base, indices } => {
                let mut ops = vec![base];
                ops.extend(indices.iter());
                ops
            }
            InstKind::Call { callee, args, .. } => {
                let mut ops: Vec<&Value> = args.iter().collect();
                if let Callee::Indirect(v) = callee {
                    ops.push(v);
                }
                ops
            }
            InstKind::Intrinsic { args, .. } => args.iter().collect(),
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => vec![if_true, if_false, cond],
            InstKind::Cast { value, .. } => vec![value],
            InstKind::VaArg { list } => vec![list],
            InstKind::Phi { incoming } => incoming.iter().map(|(_, v)| v).collect(),
            InstKind::Ret { value } => value.iter().collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Switch { cond, .. } => vec![cond],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub sig: FuncSig,
    pub blocks: Vec<BasicBlock>,
    /// Flat instruction arena; blocks index into it.
    pub insts: Vec<Instruction>,
    /// Number of uses of each instruction's result, indexed by `InstId`.
    pub use_counts: Vec<u32>,
}

impl Function {
    pub fn arg_count(&self) -> u32 {
        self.sig.params.len() as u32
    }

    /// A function without a body is a declaration (import or unknown).
    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id]
    }

    pub fn has_uses(&self, id: InstId) -> bool {
        self.use_counts.get(id).copied().unwrap_or(0) > 0
    }

    pub fn terminator(&self, block: BlockId) -> Option<&Instruction> {
        self.blocks[block]
            .insts
            .last()
            .map(|&id| &self.insts[id])
    }

    /// The phi instructions at the head of `block`, with their ids.
    pub fn phis(&self, block: BlockId) -> impl Iterator<Item = (InstId, &Instruction)> + '_ {
        self.blocks[block]
            .insts
            .iter()
            .map(|&id| (id, &self.insts[id]))
            .take_while(|(_, inst)| matches!(inst.kind, InstKind::Phi { .. }))
    }

    /// Recompute `use_counts` from scratch. Builders call this once after
    /// all instructions are in place.
    pub fn recount_uses(&mut self) {
        let mut counts = vec![0u32; self.insts.len()];
        for inst in &self.insts {
            for op in inst.operands() {
                if let Value::Inst(id) = op {
                    counts[*id] += 1;
                }
            }
        }
        self.use_counts = counts;
    }
}

#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: IrType,
    pub init: Option<Constant>,
    /// Whether the global lives in the linear-memory section and gets a
    /// statically assigned address.
    pub linear: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVariable>,
    /// The designated bootstrap entry point, if the input carries one.
    pub bootstrap: Option<FuncId>,
}

impl Module {
    /// The type of a value in the context of `func`.
    pub fn value_type(&self, func: &Function, v: &Value) -> IrType {
        match v {
            Value::Constant(c) => self.constant_type(c),
            Value::Inst(id) => func.insts[*id].ty.clone(),
            Value::Arg(i) => func.sig.params[*i as usize].clone(),
        }
    }

    pub fn constant_type(&self, c: &Constant) -> IrType {
        match c {
            Constant::Int { bits, .. } => IrType::Int(*bits),
            Constant::Float(_) => IrType::Float,
            Constant::Double(_) => IrType::Double,
            Constant::Global(g) => IrType::Ptr(Box::new(self.globals[*g].ty.clone())),
            Constant::FunctionRef(f) => IrType::Ptr(Box::new(IrType::Func(Box::new(
                self.functions[*f].sig.clone(),
            )))),
            Constant::NullPtr => IrType::Ptr(Box::new(IrType::Int(8))),
            Constant::Undef => IrType::Int(32),
            Constant::Expr(e) => match &**e {
                ConstExpr::Gep { base, .. } => self.constant_type(base),
                ConstExpr::BitCast(inner) | ConstExpr::IntToPtr(inner) => {
                    self.constant_type(inner)
                }
                ConstExpr::PtrToInt(_) => IrType::Int(32),
                ConstExpr::ICmp { .. } => IrType::Int(1),
                ConstExpr::Other(_) => IrType::Int(32),
            },
            Constant::Str(bytes) => {
                IrType::Array(Box::new(IrType::Int(8)), bytes.len() as u64)
            }
            Constant::Array(elems) => {
                let elem_ty = elems
                    .first()
                    .map(|e| self.constant_type(e))
                    .unwrap_or(IrType::Int(8));
                IrType::Array(Box::new(elem_ty), elems.len() as u64)
            }
            Constant::Struct(fields) => {
                IrType::Struct(fields.iter().map(|f| self.constant_type(f)).collect())
            }
        }
    }
}

/// The global dependency registry: which functions are imported, which are
/// addressable through function tables (and at which offset), and which run
/// as constructors before the entry point.
#[derive(Debug, Clone, Default)]
pub struct GlobalDeps {
    pub imports: Vec<FuncId>,
    pub tables: Vec<FunctionTable>,
    pub function_addresses: rustc_hash::FxHashMap<FuncId, u32>,
    pub constructors: Vec<FuncId>,
}

#[derive(Debug, Clone)]
pub struct FunctionTable {
    pub name: String,
    pub sig: FuncSig,
    pub functions: Vec<FuncId>,
}

impl GlobalDeps {
    pub fn table_for_sig(&self, sig: &FuncSig) -> Option<&FunctionTable> {
        self.tables.iter().find(|t| &t.sig == sig)
    }

    pub fn table_for_function(&self, f: FuncId) -> Option<&FunctionTable> {
        self.tables.iter().find(|t| t.functions.contains(&f))
    }
}
